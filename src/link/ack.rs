//! Acknowledgement tracking and retransmission.
//!
//! Every data frame handed to the physical layer is registered here with
//! a copy of its encoded bytes and a retransmission deadline. The entry
//! is removed by a matching acknowledgement, by a cumulative window
//! slide, or by exhausting its retry budget. The deadline lives inside
//! the entry, so an entry and its timer cannot diverge: cancelling one
//! cancels the other.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::trace;

/// An outstanding frame awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct PendingFrame {
    /// Encoded frame bytes, kept for retransmission.
    frame: Vec<u8>,
    /// When the frame was first handed to the physical layer.
    sent_at: Instant,
    /// Retransmissions so far.
    retries: u32,
    /// When the retransmission timer fires.
    deadline: Instant,
}

impl PendingFrame {
    /// Retransmissions so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// When the frame was first transmitted.
    pub fn sent_at(&self) -> Instant {
        self.sent_at
    }
}

/// Result of matching an incoming acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The acknowledgement matched an outstanding frame.
    Acked {
        /// Time from first transmission to acknowledgement.
        rtt: Duration,
        /// Retransmissions the frame needed.
        retries: u32,
    },
    /// No outstanding frame with that sequence number.
    Unexpected,
}

/// Result of an expired retransmission timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Retransmit the frame; the retry counter has been bumped.
    Retransmit {
        /// Sequence number of the frame.
        seq: u8,
        /// Encoded bytes to put back on the wire.
        frame: Vec<u8>,
        /// Retransmissions including this one.
        retries: u32,
    },
    /// The retry budget is spent; the entry has been dropped.
    Failed {
        /// Sequence number of the abandoned frame.
        seq: u8,
        /// Retransmissions attempted.
        retries: u32,
    },
}

/// Tracks outstanding frames and drives their retransmission.
#[derive(Debug)]
pub struct AckTracker {
    pending: BTreeMap<u8, PendingFrame>,
    ack_timeout: Duration,
    max_retries: u32,
}

impl AckTracker {
    /// Create a tracker with the given retransmission timeout and budget.
    pub fn new(ack_timeout: Duration, max_retries: u32) -> Self {
        Self {
            pending: BTreeMap::new(),
            ack_timeout,
            max_retries,
        }
    }

    /// Register a transmitted frame. An existing entry for the same
    /// sequence number is replaced, timer included.
    pub fn register(&mut self, seq: u8, frame: Vec<u8>, now: Instant) {
        let replaced = self
            .pending
            .insert(
                seq,
                PendingFrame {
                    frame,
                    sent_at: now,
                    retries: 0,
                    deadline: now + self.ack_timeout,
                },
            )
            .is_some();
        if replaced {
            trace!(seq, "replaced pending frame");
        }
    }

    /// Match an incoming acknowledgement against the pending set.
    pub fn acknowledge(&mut self, seq: u8, now: Instant) -> AckOutcome {
        match self.pending.remove(&seq) {
            Some(entry) => AckOutcome::Acked {
                rtt: now.saturating_duration_since(entry.sent_at),
                retries: entry.retries,
            },
            None => AckOutcome::Unexpected,
        }
    }

    /// Drop entries covered by a cumulative acknowledgement, cancelling
    /// their timers. Returns how many entries were cleared.
    pub fn sweep(&mut self, seqs: impl IntoIterator<Item = u8>) -> usize {
        let mut cleared = 0;
        for seq in seqs {
            if self.pending.remove(&seq).is_some() {
                trace!(seq, "cleared by cumulative ack");
                cleared += 1;
            }
        }
        cleared
    }

    /// Accelerated retransmission in response to a negative
    /// acknowledgement. Counts as a retry and re-arms the deadline, but
    /// never declares failure itself; only the timer path can exhaust an
    /// entry. Returns the frame bytes to retransmit.
    pub fn negative(&mut self, seq: u8, now: Instant) -> Option<Vec<u8>> {
        let entry = self.pending.get_mut(&seq)?;
        if entry.retries >= self.max_retries {
            return None;
        }
        entry.retries += 1;
        entry.deadline = now + self.ack_timeout;
        Some(entry.frame.clone())
    }

    /// Process every entry whose deadline has passed.
    ///
    /// An entry that still has budget is re-armed and reported as
    /// [`TimerOutcome::Retransmit`]; one that is out of budget is dropped
    /// and reported as [`TimerOutcome::Failed`], so a frame is
    /// transmitted at most `max_retries + 1` times.
    pub fn expire(&mut self, now: Instant) -> Vec<TimerOutcome> {
        let due: Vec<u8> = self
            .pending
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(&seq, _)| seq)
            .collect();

        let mut outcomes = Vec::with_capacity(due.len());
        for seq in due {
            let Some(entry) = self.pending.get_mut(&seq) else {
                continue;
            };
            if entry.retries >= self.max_retries {
                let retries = entry.retries;
                self.pending.remove(&seq);
                outcomes.push(TimerOutcome::Failed { seq, retries });
            } else {
                entry.retries += 1;
                entry.deadline = now + self.ack_timeout;
                outcomes.push(TimerOutcome::Retransmit {
                    seq,
                    frame: entry.frame.clone(),
                    retries: entry.retries,
                });
            }
        }
        outcomes
    }

    /// The earliest retransmission deadline, if anything is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|e| e.deadline).min()
    }

    /// Drop every entry, cancelling all timers. Returns how many were
    /// dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Number of outstanding frames.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Check if a sequence number is outstanding.
    pub fn contains(&self, seq: u8) -> bool {
        self.pending.contains_key(&seq)
    }

    /// Inspect an outstanding entry.
    pub fn get(&self, seq: u8) -> Option<&PendingFrame> {
        self.pending.get(&seq)
    }
}
