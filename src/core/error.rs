//! Caller-visible error types.
//!
//! Wire-level parse errors live next to the codec in [`crate::wire`];
//! everything here is surfaced through the public API (`send`, `connect`,
//! `disconnect`).

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to the network-layer caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// A connection already exists or is being established.
    #[error("already connected")]
    AlreadyConnected,

    /// The connection request went unanswered.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Payload exceeds the per-frame maximum. This is a programming error
    /// on the caller's side, not a runtime event.
    #[error("payload too large: {size} bytes exceeds {max}")]
    PayloadTooLarge {
        /// Bytes the caller tried to send.
        size: usize,
        /// Per-frame payload limit.
        max: usize,
    },

    /// The engine task is gone; the link can no longer be used.
    #[error("link closed")]
    Closed,
}

impl LinkError {
    /// Check if this error is a misuse of the API rather than a
    /// condition of the link.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            LinkError::PayloadTooLarge { .. } | LinkError::AlreadyConnected
        )
    }
}
