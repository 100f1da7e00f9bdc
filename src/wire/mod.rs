//! Wire format: byte stuffing, CRC-16-CCITT, and the frame codec.
//!
//! A frame is laid out on the wire as:
//!
//! ```text
//! +------+--------------------------------------------+------+
//! | FLAG | stuffed( CONTROL ‖ SEQ ‖ PAYLOAD ‖ CRC16 ) | FLAG |
//! | 0x7E | variable                                   | 0x7E |
//! +------+--------------------------------------------+------+
//! ```
//!
//! The CRC covers `CONTROL ‖ SEQ ‖ PAYLOAD` and is appended big-endian.
//! Stuffing is applied over the inner bytes including the CRC, so the only
//! FLAG bytes on the wire are the two delimiters.

mod crc;
mod frame;
mod stuffing;

pub use crc::{CrcCheck, append_crc, checksum, split_verify, verify};
pub use frame::{Frame, FrameError, FrameErrorKind, FrameType};
pub use stuffing::{StuffingError, escape, unescape};
