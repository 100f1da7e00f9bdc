//! Protocol constants for the framelink wire format and timers.
//!
//! The framing bytes and sequence-space parameters are fixed by the wire
//! format and MUST NOT be changed. Timing values are defaults; the
//! configurable ones are overridable through [`crate::core::LinkConfig`].

use std::time::Duration;

// =============================================================================
// FRAMING
// =============================================================================

/// Frame delimiter byte.
pub const FLAG: u8 = 0x7E;

/// Escape prefix byte for stuffing.
pub const ESC: u8 = 0x7D;

/// XOR mask applied to escaped bytes.
pub const ESC_XOR: u8 = 0x20;

// =============================================================================
// CONTROL BYTES
// =============================================================================

/// Data frame carrying a network-layer payload.
pub const CTRL_DATA: u8 = 0x01;

/// Positive acknowledgement.
pub const CTRL_ACK: u8 = 0x02;

/// Negative acknowledgement.
pub const CTRL_NAK: u8 = 0x03;

/// Connection request.
pub const CTRL_CONNECT: u8 = 0x04;

/// Connection accept.
pub const CTRL_CONNECT_ACK: u8 = 0x05;

/// Disconnect request.
pub const CTRL_DISCONNECT: u8 = 0x06;

/// Disconnect confirmation.
pub const CTRL_DISCONNECT_ACK: u8 = 0x07;

/// Liveness probe.
pub const CTRL_HEARTBEAT: u8 = 0x08;

// =============================================================================
// SEQUENCE SPACE
// =============================================================================

/// Bits in the sequence number (low nibble of the SEQ byte).
pub const SEQ_BITS: u32 = 4;

/// Modulus of the sequence space.
pub const SEQ_MOD: u8 = 16;

/// Highest valid sequence number.
pub const MAX_SEQ: u8 = 15;

/// Hard cap on the window size. Half the sequence space, so sender and
/// receiver windows can never overlap across a wrap.
pub const MAX_WINDOW: u8 = 8;

/// Default window size.
pub const DEFAULT_WINDOW: u8 = 8;

// =============================================================================
// FRAME SIZES
// =============================================================================

/// Maximum payload bytes in a single frame.
pub const MAX_DATA: usize = 1024;

/// Inner header size (control byte + sequence byte).
pub const HEADER_SIZE: usize = 2;

/// CRC trailer size.
pub const CRC_SIZE: usize = 2;

/// Smallest possible frame on the wire: two flags around an unstuffed
/// header + CRC with an empty payload.
pub const MIN_WIRE_SIZE: usize = 2 + HEADER_SIZE + CRC_SIZE;

// =============================================================================
// TIMING
// =============================================================================

/// Retransmission timeout for an unacknowledged data frame.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(2000);

/// Retransmission budget; a frame is transmitted at most `MAX_RETRIES + 1`
/// times before being declared failed.
pub const MAX_RETRIES: u32 = 3;

/// Interval between heartbeat probes while connected.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(5000);

/// The peer is declared dead after this many missed heartbeat intervals.
pub const HEARTBEAT_LIVENESS_MULTIPLIER: u32 = 3;

/// How long an unanswered connection request is left pending.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// How long to wait for a disconnect confirmation before forcing the
/// local transition.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

// =============================================================================
// CONTROL PAYLOADS (informative text; receivers never parse these)
// =============================================================================

/// Payload carried by a connection request.
pub const CONNECT_PAYLOAD: &[u8] = b"CONNECT_REQUEST";

/// Payload carried by a connection accept.
pub const CONNECT_ACK_PAYLOAD: &[u8] = b"CONNECT_ACK";

/// Payload carried by a disconnect request.
pub const DISCONNECT_PAYLOAD: &[u8] = b"DISCONNECT";
