//! Core types shared across the link layer.
//!
//! This module holds the pieces every other layer depends on:
//!
//! - [`constants`]: wire bytes, sequence-space parameters, timing defaults
//! - [`LinkConfig`]: tunable knobs with a builder
//! - [`LinkError`]: caller-visible failures
//! - [`Event`]: the closed set of telemetry events the engine emits
//! - [`LinkStats`]: monotonic counters for drops, retransmits, and traffic

pub mod constants;

mod config;
mod error;
mod event;
mod stats;

pub use config::{LinkConfig, LinkConfigBuilder};
pub use error::LinkError;
pub use event::{DisconnectReason, Event, NakReason};
pub use stats::LinkStats;
