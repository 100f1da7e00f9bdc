//! # Framelink
//!
//! A point-to-point data link layer protocol engine. Framelink turns a
//! lossy, corrupting byte channel into an in-order, duplicate-free,
//! connection-oriented stream between two peers. It provides:
//!
//! - **Framing**: flag-delimited frames with HDLC-style byte stuffing
//! - **Integrity**: CRC-16-CCITT over every frame
//! - **Reliability**: positive/negative acknowledgements with per-frame
//!   retransmission timers and a bounded retry budget
//! - **Pipelining**: a sliding window over a 4-bit sequence space with
//!   in-order reassembly on the receive side
//! - **Lifecycle**: a connection state machine with handshake, heartbeat
//!   liveness, and graceful teardown
//!
//! ## Feature Flags
//!
//! - `runtime` (default): Tokio-backed peer driver ([`peer`])
//!
//! ## Modules
//!
//! - [`core`]: Constants, configuration, errors, events (always included)
//! - [`wire`]: Byte stuffing, CRC-16-CCITT, frame codec (always included)
//! - [`link`]: Acknowledgement tracking, sliding windows, connection state
//!   machine, and the deterministic link engine (always included)
//! - [`peer`]: Async driver wiring the engine to channels and timers
//!   (requires `runtime` feature)
//!
//! ## Architecture
//!
//! The protocol core is sans-IO: every time-dependent operation takes an
//! explicit `Instant`, and the [`link::LinkEngine`] consumes inputs and
//! returns actions instead of performing I/O. The [`peer`] module runs one
//! engine per peer inside a single task, so all state transitions are
//! serialized.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Network Layer                 │  send(bytes) / deliveries
//! ├─────────────────────────────────────────┤
//! │           Link Engine                   │  ← this crate
//! │   windows, acks, connection, queue      │
//! ├─────────────────────────────────────────┤
//! │           Frame Codec                   │  stuffing + CRC + header
//! ├─────────────────────────────────────────┤
//! │           Physical Channel              │  frames_out / handle_rx
//! └─────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod link;
pub mod wire;

// Async peer driver (feature-gated)
#[cfg(feature = "runtime")]
pub mod peer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        DisconnectReason, Event, LinkConfig, LinkConfigBuilder, LinkError, LinkStats,
    };
    pub use crate::link::{
        Action, AckOutcome, AckTracker, ConnState, Connection, LinkEngine, RecvOutcome,
        RecvWindow, SendWindow, SlideOutcome, TimerOutcome,
    };
    pub use crate::wire::{Frame, FrameError, FrameErrorKind, FrameType, StuffingError};

    #[cfg(feature = "runtime")]
    pub use crate::peer::{Delivery, LinkHandle, LinkIo, LinkPeer};
}

// Re-export commonly used items at crate root
pub use crate::core::{DisconnectReason, Event, LinkConfig, LinkError, LinkStats};
pub use crate::link::LinkEngine;
pub use crate::wire::{Frame, FrameError, FrameType};

#[cfg(feature = "runtime")]
pub use crate::peer::{LinkHandle, LinkIo, LinkPeer};
