//! Line-framed reading from a serial device.

use log::debug;
use serialport::SerialPort;
use std::io::{self, Read};

use crate::config::SerialConfig;
use crate::encoding::LineDecoder;
use crate::error::SerialError;
use crate::udp::UDP_MAX_PAYLOAD;

const READ_CHUNK: usize = 256;

/// A blocking producer of text lines.
pub trait LineSource {
    /// Returns the next stripped line, `Ok(None)` when the read window
    /// elapsed without a complete line.
    fn read_line(&mut self) -> Result<Option<String>, SerialError>;
}

/// Frames a byte stream on `\n` and decodes each frame.
///
/// Bytes that arrive without a delimiter before a timeout are held back and
/// completed by a later read. A partial line longer than any datagram can
/// carry is an error.
pub struct SerialReader<R> {
    port: R,
    name: String,
    decoder: LineDecoder,
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no `\n`.
    scanned: usize,
    eof: bool,
}

impl SerialReader<Box<dyn SerialPort>> {
    pub fn open(cfg: &SerialConfig, decoder: LineDecoder) -> Result<Self, SerialError> {
        let port = serialport::new(&cfg.port_name, cfg.baud_rate)
            .data_bits(cfg.data_bits)
            .parity(cfg.parity)
            .stop_bits(cfg.stop_bits)
            .flow_control(cfg.flow_control)
            .timeout(cfg.timeout)
            .open()
            .map_err(|source| SerialError::Open {
                port: cfg.port_name.clone(),
                source,
            })?;

        debug!("opened serial port {} at {} baud", cfg.port_name, cfg.baud_rate);
        Ok(Self::new(port, cfg.port_name.clone(), decoder))
    }
}

impl<R: Read> SerialReader<R> {
    pub fn new(port: R, name: impl Into<String>, decoder: LineDecoder) -> Self {
        Self {
            port,
            name: name.into(),
            decoder,
            pending: Vec::new(),
            scanned: 0,
            eof: false,
        }
    }

    fn take_frame(&mut self) -> Option<Vec<u8>> {
        match self.pending[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(i) => {
                let frame = self.pending.drain(..=self.scanned + i).collect();
                self.scanned = 0;
                Some(frame)
            }
            None => {
                self.scanned = self.pending.len();
                None
            }
        }
    }
}

impl<R: Read> LineSource for SerialReader<R> {
    fn read_line(&mut self) -> Result<Option<String>, SerialError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.take_frame() {
                return self.decoder.decode(&frame).map(Some);
            }

            if self.pending.len() > UDP_MAX_PAYLOAD {
                let len = self.pending.len();
                self.pending.clear();
                self.scanned = 0;
                return Err(SerialError::LineTooLong {
                    len,
                    max: UDP_MAX_PAYLOAD,
                });
            }

            if self.eof {
                if self.pending.is_empty() {
                    return Err(SerialError::Disconnected);
                }
                let rest = std::mem::take(&mut self.pending);
                self.scanned = 0;
                return self.decoder.decode(&rest).map(Some);
            }

            match self.port.read(&mut chunk) {
                Ok(0) => self.eof = true,
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) => return Err(SerialError::Read(e)),
            }
        }
    }
}

impl<R> Drop for SerialReader<R> {
    fn drop(&mut self) {
        debug!("closing serial port {}", self.name);
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
