//! Monotonic link counters.

/// Counters kept by the engine. Silent drops (malformed frames, stuffing
/// errors) are only visible here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames handed to the physical layer, retransmissions included.
    pub frames_sent: u64,
    /// Data frames among `frames_sent` (first transmissions only).
    pub data_frames_sent: u64,
    /// Frames that parsed successfully.
    pub frames_received: u64,
    /// Payloads delivered in order to the network layer.
    pub delivered: u64,
    /// Retransmissions, timer- and NAK-driven.
    pub retransmits: u64,
    /// Frames dropped for a CRC mismatch.
    pub crc_failures: u64,
    /// Frames dropped for structural reasons (flags, stuffing, length).
    pub structural_drops: u64,
    /// Frames dropped for an unknown control byte.
    pub unknown_frames: u64,
    /// Duplicate data frames (already delivered, re-acknowledged).
    pub duplicates: u64,
    /// Acknowledgements transmitted.
    pub acks_sent: u64,
    /// Acknowledgements received and matched to an outstanding frame.
    pub acks_received: u64,
}

impl LinkStats {
    /// Fraction of data transmissions that were retransmissions, used as
    /// the loss estimate for the advisory window hint.
    pub fn loss_rate(&self) -> f64 {
        let total = self.data_frames_sent + self.retransmits;
        if total == 0 {
            0.0
        } else {
            self.retransmits as f64 / total as f64
        }
    }
}
