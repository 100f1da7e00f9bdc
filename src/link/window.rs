//! Sliding windows over the modulo-16 sequence space.
//!
//! The sender tracks `base..next_seq` (outstanding frames); the receiver
//! tracks `expected` plus a 16-slot reassembly ring. Window sizes are
//! capped at half the sequence space, so the two windows can never
//! overlap across a wrap and a sequence number is unambiguous within its
//! epoch.

use std::time::{Duration, Instant};

use crate::core::constants::{MAX_WINDOW, SEQ_MOD};

/// Distance from `b` forward to `a`, in `0..16`.
pub fn seq_distance(a: u8, b: u8) -> u8 {
    (a + SEQ_MOD - b) % SEQ_MOD
}

/// Signed distance from `b` to `a`: values past the midpoint fold into
/// the negative range, distinguishing "behind" from "ahead".
pub fn seq_distance_signed(a: u8, b: u8) -> i8 {
    let d = seq_distance(a, b);
    if d > SEQ_MOD / 2 {
        d as i8 - SEQ_MOD as i8
    } else {
        d as i8
    }
}

/// Result of feeding an acknowledgement to the send window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideOutcome {
    /// Acknowledgement for a frame behind the window; already processed.
    Duplicate,
    /// Acknowledgement ahead of anything outstanding; ignored.
    OutOfWindow,
    /// The window slid forward.
    Slid {
        /// Base before the slide.
        from: u8,
        /// Base after the slide.
        to: u8,
        /// Sequence numbers covered by the slide (cumulative).
        count: u8,
    },
}

/// Sender-side window state.
#[derive(Debug, Clone)]
pub struct SendWindow {
    base: u8,
    next_seq: u8,
    size: u8,
}

impl SendWindow {
    /// Create a send window. Sizes outside `1..=8` are clamped.
    pub fn new(size: u8) -> Self {
        Self {
            base: 0,
            next_seq: 0,
            size: size.clamp(1, MAX_WINDOW),
        }
    }

    /// Oldest unacknowledged sequence number.
    pub fn base(&self) -> u8 {
        self.base
    }

    /// Next sequence number to be assigned.
    pub fn next_seq(&self) -> u8 {
        self.next_seq
    }

    /// Current window size.
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Frames in flight.
    pub fn outstanding(&self) -> u8 {
        seq_distance(self.next_seq, self.base)
    }

    /// Check if another frame may be admitted.
    pub fn can_send(&self) -> bool {
        self.outstanding() < self.size
    }

    /// Claim the next sequence number, or `None` while the window is full.
    pub fn acquire(&mut self) -> Option<u8> {
        if !self.can_send() {
            return None;
        }
        let seq = self.next_seq;
        self.next_seq = (self.next_seq + 1) % SEQ_MOD;
        Some(seq)
    }

    /// Process a cumulative acknowledgement for `ack_seq`.
    ///
    /// An acknowledgement covers everything from the current base through
    /// `ack_seq`; the base moves to `(ack_seq + 1) % 16`.
    pub fn on_ack(&mut self, ack_seq: u8) -> SlideOutcome {
        let d = seq_distance_signed(ack_seq, self.base);
        if d < 0 {
            return SlideOutcome::Duplicate;
        }
        // Bounded by what is actually in flight, so a stray ack can never
        // push the base past next_seq.
        if d as u8 >= self.outstanding() {
            return SlideOutcome::OutOfWindow;
        }

        let from = self.base;
        self.base = (ack_seq + 1) % SEQ_MOD;
        SlideOutcome::Slid {
            from,
            to: self.base,
            count: d as u8 + 1,
        }
    }

    /// Advisory window hint from observed link quality.
    ///
    /// Heavy loss halves the window, mild loss shrinks it by one, and a
    /// fast clean link grows it by one. Returns the new size.
    pub fn adjust(&mut self, rtt: Duration, loss_rate: f64) -> u8 {
        if loss_rate > 0.05 {
            self.size = (self.size / 2).max(1);
        } else if loss_rate > 0.01 {
            self.size = (self.size - 1).max(1);
        } else if rtt < Duration::from_millis(100) && loss_rate < 0.001 {
            self.size = (self.size + 1).min(MAX_WINDOW);
        }
        self.size
    }

    /// Reset to the initial epoch.
    pub fn reset(&mut self) {
        self.base = 0;
        self.next_seq = 0;
    }
}

/// A buffered out-of-order frame.
#[derive(Debug, Clone)]
pub struct RecvSlot {
    /// Payload of the buffered frame.
    pub payload: Vec<u8>,
    /// When it arrived.
    pub received_at: Instant,
}

/// Result of feeding a data frame to the receive window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvOutcome {
    /// Already delivered in this epoch; the caller should re-acknowledge.
    Duplicate,
    /// Too far ahead to buffer; ignored.
    OutOfWindow,
    /// Stored for later; no acknowledgement yet.
    Buffered,
    /// One or more frames became deliverable, in order.
    Delivered(Vec<(u8, Vec<u8>)>),
}

/// Receiver-side window state: the next expected sequence number plus a
/// 16-slot reassembly ring indexed by sequence number.
#[derive(Debug)]
pub struct RecvWindow {
    expected: u8,
    size: u8,
    slots: [Option<RecvSlot>; SEQ_MOD as usize],
}

impl RecvWindow {
    /// Create a receive window. Sizes outside `1..=8` are clamped.
    pub fn new(size: u8) -> Self {
        Self {
            expected: 0,
            size: size.clamp(1, MAX_WINDOW),
            slots: std::array::from_fn(|_| None),
        }
    }

    /// The sequence number in-order delivery is waiting on.
    pub fn expected(&self) -> u8 {
        self.expected
    }

    /// Frames currently buffered out of order.
    pub fn buffered(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Process a data frame.
    ///
    /// A frame behind `expected` is a duplicate of something already
    /// delivered this epoch. A frame at `expected` triggers an in-order
    /// walk that drains every consecutive filled slot. Anything else
    /// inside the window is buffered; anything past it is dropped.
    pub fn on_frame(&mut self, seq: u8, payload: Vec<u8>, now: Instant) -> RecvOutcome {
        let d = seq_distance_signed(seq, self.expected);
        if d < 0 {
            return RecvOutcome::Duplicate;
        }
        if d as u8 >= self.size {
            return RecvOutcome::OutOfWindow;
        }

        let slot = &mut self.slots[seq as usize];
        if slot.is_none() {
            *slot = Some(RecvSlot {
                payload,
                received_at: now,
            });
        }

        if seq != self.expected {
            return RecvOutcome::Buffered;
        }

        let mut delivered = Vec::new();
        while let Some(slot) = self.slots[self.expected as usize].take() {
            delivered.push((self.expected, slot.payload));
            self.expected = (self.expected + 1) % SEQ_MOD;
        }
        RecvOutcome::Delivered(delivered)
    }

    /// Reset to the initial epoch, dropping any buffered frames.
    pub fn reset(&mut self) {
        self.expected = 0;
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Instant {
        Instant::now()
    }

    mod distance {
        use super::*;

        #[test]
        fn test_seq_distance() {
            assert_eq!(seq_distance(5, 3), 2);
            assert_eq!(seq_distance(3, 3), 0);
            assert_eq!(seq_distance(1, 15), 2); // across the wrap
            assert_eq!(seq_distance(15, 0), 15);
        }

        #[test]
        fn test_signed_folding() {
            assert_eq!(seq_distance_signed(5, 3), 2);
            assert_eq!(seq_distance_signed(3, 5), -2);
            assert_eq!(seq_distance_signed(1, 15), 2);
            assert_eq!(seq_distance_signed(15, 1), -2);
            // The midpoint stays "ahead".
            assert_eq!(seq_distance_signed(8, 0), 8);
        }
    }

    mod send_window {
        use super::*;

        #[test]
        fn test_acquire_until_full() {
            let mut win = SendWindow::new(8);
            for expect in 0..8 {
                assert!(win.can_send());
                assert_eq!(win.acquire(), Some(expect));
            }
            assert!(!win.can_send());
            assert_eq!(win.acquire(), None);
            assert_eq!(win.outstanding(), 8);
        }

        #[test]
        fn test_outstanding_never_exceeds_size() {
            let mut win = SendWindow::new(3);
            for _ in 0..20 {
                while win.acquire().is_some() {}
                assert!(win.outstanding() <= win.size());
                win.on_ack(win.base());
            }
        }

        #[test]
        fn test_ack_slides_by_one() {
            let mut win = SendWindow::new(8);
            win.acquire();
            win.acquire();

            let outcome = win.on_ack(0);
            assert_eq!(outcome, SlideOutcome::Slid { from: 0, to: 1, count: 1 });
            assert_eq!(win.base(), 1);
            assert_eq!(win.outstanding(), 1);
        }

        #[test]
        fn test_cumulative_ack() {
            let mut win = SendWindow::new(8);
            for _ in 0..5 {
                win.acquire();
            }

            // Ack of seq 3 covers 0..=3 at once.
            let outcome = win.on_ack(3);
            assert_eq!(outcome, SlideOutcome::Slid { from: 0, to: 4, count: 4 });
            assert_eq!(win.outstanding(), 1);
        }

        #[test]
        fn test_duplicate_ack() {
            let mut win = SendWindow::new(8);
            win.acquire();
            win.on_ack(0);

            assert_eq!(win.on_ack(0), SlideOutcome::Duplicate);
            assert_eq!(win.base(), 1);
        }

        #[test]
        fn test_ack_for_unsent_seq_ignored() {
            let mut win = SendWindow::new(8);
            win.acquire(); // only seq 0 outstanding

            assert_eq!(win.on_ack(5), SlideOutcome::OutOfWindow);
            assert_eq!(win.base(), 0);
            assert_eq!(win.outstanding(), 1);
        }

        #[test]
        fn test_base_monotonic_across_wrap() {
            let mut win = SendWindow::new(4);
            // Drive two full trips around the sequence space.
            for i in 0..40u32 {
                let seq = win.acquire().expect("window should have room");
                assert_eq!(seq, (i % 16) as u8);
                let outcome = win.on_ack(seq);
                assert!(matches!(outcome, SlideOutcome::Slid { count: 1, .. }));
            }
            assert_eq!(win.base(), 8); // 40 % 16
        }

        #[test]
        fn test_adjust_heavy_loss_halves() {
            let mut win = SendWindow::new(8);
            assert_eq!(win.adjust(Duration::from_millis(50), 0.10), 4);
            assert_eq!(win.adjust(Duration::from_millis(50), 0.10), 2);
            assert_eq!(win.adjust(Duration::from_millis(50), 0.10), 1);
            // Floor at one.
            assert_eq!(win.adjust(Duration::from_millis(50), 0.10), 1);
        }

        #[test]
        fn test_adjust_mild_loss_shrinks() {
            let mut win = SendWindow::new(8);
            assert_eq!(win.adjust(Duration::from_millis(50), 0.02), 7);
        }

        #[test]
        fn test_adjust_clean_link_grows() {
            let mut win = SendWindow::new(4);
            assert_eq!(win.adjust(Duration::from_millis(20), 0.0), 5);

            let mut win = SendWindow::new(8);
            // Cap at eight.
            assert_eq!(win.adjust(Duration::from_millis(20), 0.0), 8);
        }

        #[test]
        fn test_adjust_slow_link_unchanged() {
            let mut win = SendWindow::new(4);
            assert_eq!(win.adjust(Duration::from_millis(300), 0.005), 4);
        }

        #[test]
        fn test_reset() {
            let mut win = SendWindow::new(8);
            for _ in 0..5 {
                win.acquire();
            }
            win.on_ack(2);

            win.reset();
            assert_eq!(win.base(), 0);
            assert_eq!(win.next_seq(), 0);
            assert_eq!(win.outstanding(), 0);
        }

        #[test]
        fn test_size_clamped() {
            assert_eq!(SendWindow::new(0).size(), 1);
            assert_eq!(SendWindow::new(16).size(), 8);
        }
    }

    mod recv_window {
        use super::*;

        #[test]
        fn test_in_order_delivery() {
            let mut win = RecvWindow::new(8);

            let outcome = win.on_frame(0, b"a".to_vec(), now());
            assert_eq!(outcome, RecvOutcome::Delivered(vec![(0, b"a".to_vec())]));
            assert_eq!(win.expected(), 1);

            let outcome = win.on_frame(1, b"b".to_vec(), now());
            assert_eq!(outcome, RecvOutcome::Delivered(vec![(1, b"b".to_vec())]));
            assert_eq!(win.expected(), 2);
        }

        #[test]
        fn test_out_of_order_buffers_then_drains() {
            let mut win = RecvWindow::new(8);

            assert_eq!(win.on_frame(1, b"b".to_vec(), now()), RecvOutcome::Buffered);
            assert_eq!(win.on_frame(2, b"c".to_vec(), now()), RecvOutcome::Buffered);
            assert_eq!(win.buffered(), 2);

            // The missing head releases everything in order.
            let outcome = win.on_frame(0, b"a".to_vec(), now());
            assert_eq!(
                outcome,
                RecvOutcome::Delivered(vec![
                    (0, b"a".to_vec()),
                    (1, b"b".to_vec()),
                    (2, b"c".to_vec()),
                ])
            );
            assert_eq!(win.expected(), 3);
            assert_eq!(win.buffered(), 0);
        }

        #[test]
        fn test_duplicate_after_delivery() {
            let mut win = RecvWindow::new(8);
            win.on_frame(0, b"a".to_vec(), now());

            assert_eq!(win.on_frame(0, b"a".to_vec(), now()), RecvOutcome::Duplicate);
            assert_eq!(win.expected(), 1);
        }

        #[test]
        fn test_duplicate_of_buffered_frame() {
            let mut win = RecvWindow::new(8);
            assert_eq!(win.on_frame(2, b"c".to_vec(), now()), RecvOutcome::Buffered);
            // A second copy neither delivers nor duplicates the slot.
            assert_eq!(win.on_frame(2, b"c".to_vec(), now()), RecvOutcome::Buffered);
            assert_eq!(win.buffered(), 1);
        }

        #[test]
        fn test_out_of_window_ignored() {
            let mut win = RecvWindow::new(4);
            assert_eq!(win.on_frame(4, b"x".to_vec(), now()), RecvOutcome::OutOfWindow);
            assert_eq!(win.buffered(), 0);
        }

        #[test]
        fn test_delivery_across_wrap() {
            let mut win = RecvWindow::new(8);
            // Deliver a full trip so expected wraps to 0 again.
            for turn in 0..2 {
                for seq in 0..16u8 {
                    let outcome = win.on_frame(seq, vec![seq], now());
                    assert_eq!(
                        outcome,
                        RecvOutcome::Delivered(vec![(seq, vec![seq])]),
                        "turn {turn} seq {seq}"
                    );
                }
            }
            assert_eq!(win.expected(), 0);
        }

        #[test]
        fn test_duplicate_detection_across_wrap() {
            let mut win = RecvWindow::new(8);
            for seq in 0..16u8 {
                win.on_frame(seq, vec![seq], now());
            }
            // expected is back at 0; seqs 9..=15 are the just-delivered half.
            assert_eq!(win.on_frame(15, vec![15], now()), RecvOutcome::Duplicate);
            assert_eq!(win.on_frame(9, vec![9], now()), RecvOutcome::Duplicate);
        }

        #[test]
        fn test_reset_drops_buffered() {
            let mut win = RecvWindow::new(8);
            win.on_frame(0, b"a".to_vec(), now());
            win.on_frame(2, b"c".to_vec(), now());

            win.reset();
            assert_eq!(win.expected(), 0);
            assert_eq!(win.buffered(), 0);
        }
    }
}
