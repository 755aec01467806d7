use encoding_rs::{Encoding, UTF_8};

use crate::error::SerialError;

/// How raw serial bytes become a line of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineDecoder {
    /// Reject anything that is not UTF-8.
    #[default]
    Strict,
    /// Replace malformed sequences with U+FFFD.
    Lossy,
}

impl LineDecoder {
    /// Decodes one raw line and strips surrounding whitespace, delimiter
    /// included. A leading byte order mark is kept as text.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, SerialError> {
        let text = match self {
            Self::Strict => UTF_8
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(|| SerialError::Decode {
                    valid_up_to: Encoding::utf8_valid_up_to(bytes),
                    bytes: bytes.to_vec(),
                })?,
            Self::Lossy => UTF_8.decode_without_bom_handling(bytes).0,
        };
        Ok(text.trim().to_string())
    }
}
