//! Telemetry events emitted by the link engine.
//!
//! The engine reports everything observable about the link through a
//! single closed enum, delivered to one subscriber sink. Events are
//! informational: dropping them never affects protocol behavior.

use std::time::Duration;

use crate::wire::FrameErrorKind;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Local `disconnect()` call (including a forced local transition
    /// after the disconnect confirmation timed out).
    Local,
    /// The peer requested the disconnect.
    Peer,
    /// No heartbeat from the peer within the liveness horizon.
    HeartbeatTimeout,
    /// The connection request went unanswered.
    ConnectTimeout,
}

/// Why a negative acknowledgement was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NakReason {
    /// A frame arrived ahead of the expected sequence number.
    OutOfOrder,
    /// A frame failed integrity checks.
    Corrupt,
}

/// Observable link events, delivered to a single subscriber sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The connection is established.
    Connected,

    /// The connection ended.
    Disconnected {
        /// Why the connection ended.
        reason: DisconnectReason,
        /// How long the connection was up.
        uptime: Duration,
    },

    /// A peer asked to connect; answer with `accept(remote_seq)`.
    ConnectionRequest {
        /// The initial sequence number announced by the peer.
        remote_seq: u8,
    },

    /// A data frame was handed to the physical layer.
    DataFrameSent {
        /// Sequence number of the frame.
        seq: u8,
        /// Encoded size on the wire.
        size: usize,
    },

    /// The send window slid forward.
    WindowAdvanced {
        /// Base before the slide.
        old_base: u8,
        /// Base after the slide.
        new_base: u8,
    },

    /// A send had to wait because the window is full.
    WindowFull,

    /// An out-of-order frame was stored for later in-order delivery.
    FrameBuffered {
        /// Sequence number of the buffered frame.
        seq: u8,
        /// Sequence number delivery is waiting on.
        expected: u8,
    },

    /// A received frame was dropped.
    FrameError {
        /// What failed during parsing.
        kind: FrameErrorKind,
    },

    /// An acknowledgement was transmitted.
    AckSent {
        /// Acknowledged sequence number (cumulative).
        seq: u8,
    },

    /// An acknowledgement for an outstanding frame arrived.
    AckReceived {
        /// Acknowledged sequence number.
        seq: u8,
        /// Time from first transmission to acknowledgement.
        rtt: Duration,
        /// Retransmissions the frame needed.
        retries: u32,
    },

    /// An acknowledgement arrived for a frame that is not outstanding.
    AckUnexpected {
        /// The unmatched sequence number.
        seq: u8,
    },

    /// A negative acknowledgement was transmitted.
    NakSent {
        /// Sequence number being asked for.
        seq: u8,
        /// Why it was sent.
        reason: NakReason,
    },

    /// A negative acknowledgement arrived; the frame was retransmitted
    /// ahead of its timer if still outstanding.
    NakReceived {
        /// The sequence number the peer asked for.
        seq: u8,
    },

    /// A frame exhausted its retransmission budget and was dropped.
    TransmissionFailed {
        /// Sequence number of the abandoned frame.
        seq: u8,
        /// Retransmissions attempted.
        retries: u32,
    },
}
