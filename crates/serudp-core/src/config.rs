use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use crate::encoding::LineDecoder;

pub const DEFAULT_PORT_NAME: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_DEST_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 189);
pub const DEFAULT_DEST_PORT: u16 = 12345;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: serialport::DataBits,
    pub parity: serialport::Parity,
    pub stop_bits: serialport::StopBits,
    pub flow_control: serialport::FlowControl,
    /// Upper bound on a single blocking read.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT_NAME.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: serialport::DataBits::Eight,
            parity: serialport::Parity::None,
            stop_bits: serialport::StopBits::One,
            flow_control: serialport::FlowControl::None,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// What the loop does when a datagram cannot be handed to the network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPolicy {
    /// Stop forwarding and report the error.
    #[default]
    Fatal,
    /// Log the failure, count it, and keep reading.
    Continue,
}

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub serial: SerialConfig,
    pub destination: SocketAddrV4,
    pub decoder: LineDecoder,
    pub send_policy: SendPolicy,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            destination: SocketAddrV4::new(DEFAULT_DEST_IP, DEFAULT_DEST_PORT),
            decoder: LineDecoder::default(),
            send_policy: SendPolicy::default(),
        }
    }
}
