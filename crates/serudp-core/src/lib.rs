//! Core functionalities: serial line reading, UDP sending, the relay loop.

pub mod config;
pub mod encoding;
pub mod error;
pub mod forwarder;
pub mod serial;
pub mod udp;

pub use config::{ForwarderConfig, SendPolicy, SerialConfig};
pub use encoding::LineDecoder;
pub use error::{ForwardError, SerialError, UdpError};
pub use forwarder::{open, ForwardStats, Forwarder};
pub use serial::{LineSource, SerialReader};
pub use udp::{DatagramSink, UdpSender};
