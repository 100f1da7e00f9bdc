//! Frame encoding and decoding.
//!
//! Inner layout before stuffing:
//!
//! ```text
//! +---------+--------+------------------+------------------+
//! | CONTROL | SEQ    | PAYLOAD          | CRC-16           |
//! | 1 byte  | 1 byte | 0..=1024 bytes   | 2 bytes (BE)     |
//! +---------+--------+------------------+------------------+
//! ```
//!
//! Only the low nibble of SEQ carries the sequence number; the high
//! nibble must be zero on send and is ignored on receive. The CRC covers
//! `CONTROL ‖ SEQ ‖ PAYLOAD`.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::core::constants::{
    CONNECT_ACK_PAYLOAD, CONNECT_PAYLOAD, CRC_SIZE, CTRL_ACK, CTRL_CONNECT, CTRL_CONNECT_ACK,
    CTRL_DATA, CTRL_DISCONNECT, CTRL_DISCONNECT_ACK, CTRL_HEARTBEAT, CTRL_NAK,
    DISCONNECT_PAYLOAD, FLAG, HEADER_SIZE, MAX_DATA, MAX_SEQ, MIN_WIRE_SIZE,
};
use crate::wire::{crc, stuffing};
use crate::wire::stuffing::StuffingError;

/// Frame type identifiers (the CONTROL byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Network-layer payload.
    Data = CTRL_DATA,
    /// Positive acknowledgement (cumulative).
    Ack = CTRL_ACK,
    /// Negative acknowledgement.
    Nak = CTRL_NAK,
    /// Connection request.
    Connect = CTRL_CONNECT,
    /// Connection accept.
    ConnectAck = CTRL_CONNECT_ACK,
    /// Disconnect request.
    Disconnect = CTRL_DISCONNECT,
    /// Disconnect confirmation.
    DisconnectAck = CTRL_DISCONNECT_ACK,
    /// Liveness probe.
    Heartbeat = CTRL_HEARTBEAT,
}

impl FrameType {
    /// Parse a frame type from its control byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CTRL_DATA => Some(Self::Data),
            CTRL_ACK => Some(Self::Ack),
            CTRL_NAK => Some(Self::Nak),
            CTRL_CONNECT => Some(Self::Connect),
            CTRL_CONNECT_ACK => Some(Self::ConnectAck),
            CTRL_DISCONNECT => Some(Self::Disconnect),
            CTRL_DISCONNECT_ACK => Some(Self::DisconnectAck),
            CTRL_HEARTBEAT => Some(Self::Heartbeat),
            _ => None,
        }
    }

    /// The control byte for this frame type.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Check if this frame type drives the connection state machine.
    pub fn is_connection_control(self) -> bool {
        matches!(
            self,
            Self::Connect
                | Self::ConnectAck
                | Self::Disconnect
                | Self::DisconnectAck
                | Self::Heartbeat
        )
    }
}

/// What failed while parsing (or building) a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameErrorKind {
    /// Raw input shorter than the smallest possible frame.
    TooShort,
    /// Missing one or both flag delimiters.
    MissingFlags,
    /// Invalid byte stuffing in the frame body.
    Stuffing,
    /// Unstuffed body too short for header and CRC trailer.
    PayloadTooShort,
    /// CRC verification failed.
    Crc,
    /// Control byte outside the known set.
    UnknownType,
    /// Payload above the per-frame maximum (build-side).
    PayloadTooLarge,
}

/// Errors from frame encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Raw input shorter than the smallest possible frame.
    #[error("frame too short: {actual} bytes, need at least {expected}")]
    TooShort {
        /// Minimum bytes required.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Missing one or both flag delimiters.
    #[error("missing flag delimiters")]
    MissingFlags,

    /// Invalid byte stuffing in the frame body.
    #[error("byte stuffing: {0}")]
    Stuffing(#[from] StuffingError),

    /// Unstuffed body too short for header and CRC trailer.
    #[error("frame body too short: {actual} bytes, need at least {expected}")]
    PayloadTooShort {
        /// Minimum bytes required.
        expected: usize,
        /// Actual bytes after unstuffing.
        actual: usize,
    },

    /// CRC verification failed. Reported distinctly so the caller can
    /// count integrity failures separately from structural garbage.
    #[error("crc mismatch: received 0x{received:04x}, calculated 0x{calculated:04x}")]
    CrcMismatch {
        /// Checksum carried in the frame.
        received: u16,
        /// Checksum computed over the frame body.
        calculated: u16,
    },

    /// Control byte outside the known set.
    #[error("unknown frame type 0x{0:02x}")]
    UnknownType(u8),

    /// Payload above the per-frame maximum. Build-side programming error.
    #[error("payload too large: {size} bytes exceeds {max}")]
    PayloadTooLarge {
        /// Bytes the caller supplied.
        size: usize,
        /// Per-frame payload limit.
        max: usize,
    },
}

impl FrameError {
    /// The coarse classification of this error.
    pub fn kind(&self) -> FrameErrorKind {
        match self {
            Self::TooShort { .. } => FrameErrorKind::TooShort,
            Self::MissingFlags => FrameErrorKind::MissingFlags,
            Self::Stuffing(_) => FrameErrorKind::Stuffing,
            Self::PayloadTooShort { .. } => FrameErrorKind::PayloadTooShort,
            Self::CrcMismatch { .. } => FrameErrorKind::Crc,
            Self::UnknownType(_) => FrameErrorKind::UnknownType,
            Self::PayloadTooLarge { .. } => FrameErrorKind::PayloadTooLarge,
        }
    }

    /// Check if this error should be dropped without any telemetry beyond
    /// a counter. Structural garbage carries no trustworthy sequence
    /// number, so there is nothing useful to report.
    pub fn is_silent_drop(&self) -> bool {
        matches!(
            self,
            Self::TooShort { .. }
                | Self::MissingFlags
                | Self::Stuffing(_)
                | Self::PayloadTooShort { .. }
        )
    }
}

/// A parsed (or to-be-encoded) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type.
    pub frame_type: FrameType,
    /// Sequence number (0..=15).
    pub seq: u8,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame, validating the payload size. The sequence number
    /// is reduced to its low nibble.
    pub fn new(frame_type: FrameType, seq: u8, payload: Vec<u8>) -> Result<Self, FrameError> {
        if payload.len() > MAX_DATA {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_DATA,
            });
        }
        Ok(Self {
            frame_type,
            seq: seq & MAX_SEQ,
            payload,
        })
    }

    fn control(frame_type: FrameType, seq: u8, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= MAX_DATA);
        Self {
            frame_type,
            seq: seq & MAX_SEQ,
            payload,
        }
    }

    /// A data frame.
    pub fn data(seq: u8, payload: Vec<u8>) -> Result<Self, FrameError> {
        Self::new(FrameType::Data, seq, payload)
    }

    /// A cumulative acknowledgement for `seq`.
    pub fn ack(seq: u8) -> Self {
        Self::control(FrameType::Ack, seq, Vec::new())
    }

    /// A negative acknowledgement asking for `seq`.
    pub fn nak(seq: u8) -> Self {
        Self::control(FrameType::Nak, seq, Vec::new())
    }

    /// A connection request announcing the local initial sequence number.
    pub fn connect(local_seq: u8) -> Self {
        Self::control(FrameType::Connect, local_seq, CONNECT_PAYLOAD.to_vec())
    }

    /// A connection accept announcing the local initial sequence number.
    pub fn connect_ack(local_seq: u8) -> Self {
        Self::control(FrameType::ConnectAck, local_seq, CONNECT_ACK_PAYLOAD.to_vec())
    }

    /// A disconnect request.
    pub fn disconnect() -> Self {
        Self::control(FrameType::Disconnect, 0, DISCONNECT_PAYLOAD.to_vec())
    }

    /// A disconnect confirmation.
    pub fn disconnect_ack() -> Self {
        Self::control(FrameType::DisconnectAck, 0, Vec::new())
    }

    /// A heartbeat probe. The payload carries the wall clock in
    /// milliseconds as decimal text; receivers never parse it.
    pub fn heartbeat() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self::control(FrameType::Heartbeat, 0, millis.to_string().into_bytes())
    }

    /// Encode onto the wire: CRC over the inner bytes, stuffing over
    /// inner bytes and CRC, flags around everything.
    pub fn encode(&self) -> Vec<u8> {
        let mut inner = Vec::with_capacity(HEADER_SIZE + self.payload.len() + CRC_SIZE);
        inner.push(self.frame_type.as_byte());
        inner.push(self.seq);
        inner.extend_from_slice(&self.payload);
        crc::append_crc(&mut inner);

        let body = stuffing::escape(&inner);
        let mut wire = Vec::with_capacity(body.len() + 2);
        wire.push(FLAG);
        wire.extend_from_slice(&body);
        wire.push(FLAG);
        wire
    }

    /// Decode a frame from the wire.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() < MIN_WIRE_SIZE {
            return Err(FrameError::TooShort {
                expected: MIN_WIRE_SIZE,
                actual: raw.len(),
            });
        }
        if raw[0] != FLAG || raw[raw.len() - 1] != FLAG {
            return Err(FrameError::MissingFlags);
        }

        let inner = stuffing::unescape(&raw[1..raw.len() - 1])?;
        if inner.len() < HEADER_SIZE + CRC_SIZE {
            return Err(FrameError::PayloadTooShort {
                expected: HEADER_SIZE + CRC_SIZE,
                actual: inner.len(),
            });
        }

        // CRC before the control byte: a corrupted type byte must surface
        // as an integrity failure, not an unknown type.
        let check = crc::split_verify(&inner).ok_or(FrameError::PayloadTooShort {
            expected: HEADER_SIZE + CRC_SIZE,
            actual: inner.len(),
        })?;
        if !check.valid {
            return Err(FrameError::CrcMismatch {
                received: check.received,
                calculated: check.calculated,
            });
        }

        let frame_type =
            FrameType::from_byte(check.data[0]).ok_or(FrameError::UnknownType(check.data[0]))?;
        let seq = check.data[1] & MAX_SEQ;
        let payload = check.data[HEADER_SIZE..].to_vec();

        Ok(Self {
            frame_type,
            seq,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_roundtrip() {
        for t in [
            FrameType::Data,
            FrameType::Ack,
            FrameType::Nak,
            FrameType::Connect,
            FrameType::ConnectAck,
            FrameType::Disconnect,
            FrameType::DisconnectAck,
            FrameType::Heartbeat,
        ] {
            assert_eq!(FrameType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(FrameType::from_byte(0x00), None);
        assert_eq!(FrameType::from_byte(0x09), None);
        assert_eq!(FrameType::from_byte(0xFF), None);
    }

    #[test]
    fn test_connection_control_classification() {
        assert!(FrameType::Connect.is_connection_control());
        assert!(FrameType::Heartbeat.is_connection_control());
        assert!(!FrameType::Data.is_connection_control());
        assert!(!FrameType::Ack.is_connection_control());
        assert!(!FrameType::Nak.is_connection_control());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let frame = Frame::data(5, b"Hola".to_vec()).unwrap();
        let wire = frame.encode();

        assert_eq!(wire[0], FLAG);
        assert_eq!(wire[wire.len() - 1], FLAG);

        let decoded = Frame::decode(&wire).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_roundtrip_flag_heavy_payload() {
        // Payload made entirely of bytes that need stuffing.
        let payload = vec![FLAG, 0x7D, FLAG, 0x7D, FLAG];
        let frame = Frame::data(3, payload.clone()).unwrap();
        let wire = frame.encode();

        // No bare FLAG between the delimiters.
        assert!(!wire[1..wire.len() - 1].contains(&FLAG));

        let decoded = Frame::decode(&wire).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.seq, 3);
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let frame = Frame::ack(15);
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.frame_type, FrameType::Ack);
        assert_eq!(decoded.seq, 15);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_roundtrip_max_payload() {
        let frame = Frame::data(0, vec![0x7E; MAX_DATA]).unwrap();
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.payload.len(), MAX_DATA);
    }

    #[test]
    fn test_payload_too_large() {
        let result = Frame::data(0, vec![0u8; MAX_DATA + 1]);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size, max }) if size == MAX_DATA + 1 && max == MAX_DATA
        ));
    }

    #[test]
    fn test_seq_low_nibble() {
        let frame = Frame::new(FrameType::Data, 0x1F, vec![]).unwrap();
        assert_eq!(frame.seq, 0x0F);
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            Frame::decode(&[FLAG, 0x01, FLAG]),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn test_decode_missing_flags() {
        let mut wire = Frame::ack(0).encode();
        wire[0] = 0x00;
        assert_eq!(Frame::decode(&wire), Err(FrameError::MissingFlags));

        let mut wire = Frame::ack(0).encode();
        let last = wire.len() - 1;
        wire[last] = 0x00;
        assert_eq!(Frame::decode(&wire), Err(FrameError::MissingFlags));
    }

    #[test]
    fn test_decode_bad_stuffing() {
        // ESC followed by a non-escape byte inside the body.
        let wire = vec![FLAG, 0x7D, 0x01, 0x02, 0x03, 0x04, FLAG];
        assert!(matches!(
            Frame::decode(&wire),
            Err(FrameError::Stuffing(StuffingError::InvalidEscape(0x01)))
        ));
    }

    #[test]
    fn test_decode_body_too_short() {
        // Six raw bytes but the body unstuffs to fewer than four.
        let wire = vec![FLAG, 0x01, 0x02, 0x7D, 0x5E, FLAG];
        assert!(matches!(
            Frame::decode(&wire),
            Err(FrameError::PayloadTooShort { .. })
        ));
    }

    #[test]
    fn test_decode_crc_mismatch() {
        let mut wire = Frame::data(1, b"payload".to_vec()).unwrap().encode();
        // Flip a payload byte; offsets 1.. are inside the stuffed body.
        wire[4] ^= 0x01;
        assert!(matches!(Frame::decode(&wire), Err(FrameError::CrcMismatch { .. })));
    }

    #[test]
    fn test_decode_unknown_type() {
        // Build a frame with an out-of-range control byte and a valid CRC.
        let mut inner = vec![0x0Au8, 0x00];
        crate::wire::crc::append_crc(&mut inner);
        let mut wire = vec![FLAG];
        wire.extend(crate::wire::stuffing::escape(&inner));
        wire.push(FLAG);

        assert_eq!(Frame::decode(&wire), Err(FrameError::UnknownType(0x0A)));
    }

    #[test]
    fn test_crc_checked_before_type() {
        // Corrupt the control byte of a valid frame: must be a CRC error,
        // never an unknown type.
        let frame = Frame::ack(2);
        let mut inner = vec![frame.frame_type.as_byte(), frame.seq];
        crate::wire::crc::append_crc(&mut inner);
        inner[0] = 0x0B; // corrupt after the CRC was computed
        let mut wire = vec![FLAG];
        wire.extend(crate::wire::stuffing::escape(&inner));
        wire.push(FLAG);

        assert!(matches!(Frame::decode(&wire), Err(FrameError::CrcMismatch { .. })));
    }

    #[test]
    fn test_control_payloads() {
        assert_eq!(Frame::connect(0).payload, b"CONNECT_REQUEST");
        assert_eq!(Frame::connect_ack(0).payload, b"CONNECT_ACK");
        assert_eq!(Frame::disconnect().payload, b"DISCONNECT");

        // Heartbeat payload is decimal text.
        let hb = Frame::heartbeat();
        assert!(hb.payload.iter().all(u8::is_ascii_digit));
    }

    #[test]
    fn test_corrupted_frames_never_misparse() {
        // Single-byte bit flips either fail to parse or parse identically.
        let frame = Frame::data(7, b"integrity".to_vec()).unwrap();
        let wire = frame.encode();

        for i in 0..wire.len() {
            for bit in 0..8 {
                let mut flipped = wire.clone();
                flipped[i] ^= 1 << bit;
                if let Ok(parsed) = Frame::decode(&flipped) {
                    assert_eq!(parsed, frame, "flip at byte {i} bit {bit} changed the frame");
                }
            }
        }
    }

    #[test]
    fn test_silent_drop_classification() {
        assert!(FrameError::MissingFlags.is_silent_drop());
        assert!(FrameError::TooShort { expected: 6, actual: 2 }.is_silent_drop());
        assert!(FrameError::Stuffing(StuffingError::TruncatedEscape).is_silent_drop());
        assert!(FrameError::PayloadTooShort { expected: 4, actual: 2 }.is_silent_drop());

        assert!(!FrameError::CrcMismatch { received: 0, calculated: 1 }.is_silent_drop());
        assert!(!FrameError::UnknownType(0x0A).is_silent_drop());
    }
}
