use std::net::SocketAddrV4;

/// Errors raised by the serial side of the relay.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    /// The device could not be opened (bad path, busy, permissions).
    #[error("failed to open serial port {port}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// A read failed for a reason other than the read timeout.
    #[error("serial read failed")]
    Read(#[from] std::io::Error),

    /// A received line is not valid UTF-8.
    #[error(
        "invalid UTF-8 in serial line at byte {valid_up_to} ({} bytes received)",
        .bytes.len()
    )]
    Decode { valid_up_to: usize, bytes: Vec<u8> },

    /// More bytes arrived without a delimiter than one datagram can carry.
    #[error("serial line exceeds {max} bytes without a newline ({len} buffered)")]
    LineTooLong { len: usize, max: usize },

    /// The device stopped producing data (unplugged or closed).
    #[error("serial device disconnected")]
    Disconnected,
}

/// Errors raised by the datagram side of the relay.
#[derive(Debug, thiserror::Error)]
pub enum UdpError {
    #[error("failed to bind UDP socket")]
    Bind(#[source] std::io::Error),

    #[error("failed to send datagram to {dest}")]
    Send {
        dest: SocketAddrV4,
        #[source]
        source: std::io::Error,
    },

    #[error("short datagram write ({sent} of {expected} bytes)")]
    ShortWrite { sent: usize, expected: usize },

    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Any fatal condition that stops the forwarding loop.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error(transparent)]
    Serial(#[from] SerialError),

    #[error(transparent)]
    Udp(#[from] UdpError),
}

pub type Result<T> = std::result::Result<T, ForwardError>;
