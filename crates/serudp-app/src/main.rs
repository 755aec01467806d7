use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serudp_core::config::{DEFAULT_BAUD_RATE, DEFAULT_DEST_IP, DEFAULT_DEST_PORT, DEFAULT_PORT_NAME};
use serudp_core::{ForwarderConfig, SerialConfig};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Relay newline-delimited serial text to a UDP endpoint.
#[derive(Parser, Debug)]
#[command(name = "serudp", version, about)]
struct Cli {
    /// Serial device path
    #[arg(short, long, env = "SERUDP_PORT", default_value = DEFAULT_PORT_NAME)]
    port: String,

    /// Serial baud rate
    #[arg(short, long, env = "SERUDP_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Destination IPv4 address
    #[arg(long, env = "SERUDP_DEST_IP", default_value_t = DEFAULT_DEST_IP)]
    dest_ip: Ipv4Addr,

    /// Destination UDP port
    #[arg(long, env = "SERUDP_DEST_PORT", default_value_t = DEFAULT_DEST_PORT)]
    dest_port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> ForwarderConfig {
        ForwarderConfig {
            serial: SerialConfig {
                port_name: self.port.clone(),
                baud_rate: self.baud,
                ..Default::default()
            },
            destination: SocketAddrV4::new(self.dest_ip, self.dest_port),
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = cli.config();
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(
        "Listening on serial {} at {} baud...",
        cfg.serial.port_name, cfg.serial.baud_rate
    );
    let forwarder = serudp_core::open(&cfg).context("startup failed")?;
    info!("Forwarding to UDP {}", cfg.destination);

    forwarder.run(&running).context("relay stopped")?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("[EXIT] Interrupted by user.");
        running.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")
}
