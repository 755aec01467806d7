use log::debug;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use crate::error::UdpError;

/// Largest UDP payload an IPv4 datagram can carry.
pub const UDP_MAX_PAYLOAD: usize = 65_507;

/// Fire-and-forget datagram output.
pub trait DatagramSink {
    /// Hands `payload` to the network stack as a single datagram.
    fn send(&mut self, payload: &[u8]) -> Result<(), UdpError>;
}

/// Sends every datagram from one ephemeral socket to one fixed destination.
pub struct UdpSender {
    sock: UdpSocket,
    dest: SocketAddrV4,
}

impl UdpSender {
    pub fn new(dest: SocketAddrV4) -> Result<Self, UdpError> {
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(UdpError::Bind)?;
        if let Ok(local) = sock.local_addr() {
            debug!("bound UDP socket {local} for {dest}");
        }
        Ok(Self { sock, dest })
    }

    pub fn destination(&self) -> SocketAddrV4 {
        self.dest
    }
}

impl DatagramSink for UdpSender {
    fn send(&mut self, payload: &[u8]) -> Result<(), UdpError> {
        if payload.len() > UDP_MAX_PAYLOAD {
            return Err(UdpError::PayloadTooLarge {
                size: payload.len(),
                max: UDP_MAX_PAYLOAD,
            });
        }

        let sent = self
            .sock
            .send_to(payload, self.dest)
            .map_err(|source| UdpError::Send {
                dest: self.dest,
                source,
            })?;

        if sent != payload.len() {
            return Err(UdpError::ShortWrite {
                sent,
                expected: payload.len(),
            });
        }
        Ok(())
    }
}

impl Drop for UdpSender {
    fn drop(&mut self) {
        debug!("closing UDP socket for {}", self.dest);
    }
}
