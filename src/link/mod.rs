//! The link layer: reliable, in-order delivery over a lossy frame channel.
//!
//! This module implements the protocol core:
//!
//! - **Acknowledgement tracking**: [`AckTracker`] with per-frame
//!   retransmission deadlines and a bounded retry budget
//! - **Sliding windows**: [`SendWindow`] / [`RecvWindow`] over the 4-bit
//!   sequence space, with in-order reassembly on the receive side
//! - **Connection lifecycle**: [`Connection`] state machine with
//!   handshake, heartbeat liveness, and graceful teardown
//! - **Coordination**: [`LinkEngine`], a deterministic sans-IO engine
//!   that wires the pieces together
//!
//! # Architecture
//!
//! Everything here is synchronous and time-explicit: operations take a
//! `now: Instant`, and the engine returns [`Action`]s instead of doing
//! I/O. A driver (see [`crate::peer`]) owns the clock and the channels.
//! This keeps the protocol a deterministic state machine that tests can
//! drive without sleeping.

mod ack;
mod connection;
mod engine;
mod window;

pub use ack::{AckOutcome, AckTracker, PendingFrame, TimerOutcome};
pub use connection::{ConnPoll, ConnState, Connection};
pub use engine::{Action, LinkEngine, SendToken};
pub use window::{
    RecvOutcome, RecvSlot, RecvWindow, SendWindow, SlideOutcome, seq_distance,
    seq_distance_signed,
};
