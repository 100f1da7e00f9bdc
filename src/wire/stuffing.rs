//! HDLC-style byte stuffing.
//!
//! Escapes FLAG and ESC in the frame body so that the only FLAG bytes on
//! the wire are the two frame delimiters. An escaped byte is emitted as
//! `ESC` followed by the byte XORed with `0x20`:
//!
//! - `0x7E` (FLAG) → `0x7D 0x5E`
//! - `0x7D` (ESC)  → `0x7D 0x5D`

use thiserror::Error;

use crate::core::constants::{ESC, ESC_XOR, FLAG};

/// Errors from decoding a stuffed byte sequence.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StuffingError {
    /// An ESC at the end of the buffer with nothing to escape.
    #[error("escape sequence truncated at end of input")]
    TruncatedEscape,

    /// An ESC followed by a byte that is not a valid escape code.
    #[error("invalid escape byte 0x{0:02x}")]
    InvalidEscape(u8),

    /// A bare FLAG inside the frame body.
    #[error("unescaped flag byte in frame body")]
    UnexpectedFlag,
}

/// Escape FLAG and ESC bytes.
///
/// The output never contains a bare FLAG and is at most `2 * data.len()`
/// bytes long.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        match byte {
            FLAG | ESC => {
                out.push(ESC);
                out.push(byte ^ ESC_XOR);
            }
            _ => out.push(byte),
        }
    }
    out
}

/// Reverse [`escape`].
///
/// Decoding is strict: a bare FLAG, a trailing ESC, or an escape byte
/// other than `0x5D`/`0x5E` fails. Round-trip law:
/// `unescape(&escape(x)) == Ok(x)` for every byte sequence `x`.
pub fn unescape(data: &[u8]) -> Result<Vec<u8>, StuffingError> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&byte) = iter.next() {
        match byte {
            ESC => {
                let &escaped = iter.next().ok_or(StuffingError::TruncatedEscape)?;
                // Only the two canonical escape codes are accepted.
                if escaped != (FLAG ^ ESC_XOR) && escaped != (ESC ^ ESC_XOR) {
                    return Err(StuffingError::InvalidEscape(escaped));
                }
                out.push(escaped ^ ESC_XOR);
            }
            FLAG => return Err(StuffingError::UnexpectedFlag),
            _ => out.push(byte),
        }
    }
    Ok(out)
}
