//! The link engine: a deterministic coordinator for one endpoint.
//!
//! The engine owns the acknowledgement tracker, both windows, the
//! connection state machine, and the send queue. It consumes API calls,
//! received bytes, and timer expirations, and returns [`Action`]s for the
//! driver to execute. No I/O, no clock: callers pass `now` explicitly,
//! which makes the whole protocol a deterministic state machine.
//!
//! Send pipeline: `send` enqueues, the queue drains while the window has
//! room, each admitted payload becomes a data frame that is registered
//! with the tracker and handed to the physical layer. Back-pressure is
//! implicit: items wait in the queue while the window is full, and every
//! window slide drains again.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::core::constants::SEQ_MOD;
use crate::core::{DisconnectReason, Event, LinkConfig, LinkError, LinkStats, NakReason};
use crate::link::ack::{AckOutcome, AckTracker, TimerOutcome};
use crate::link::connection::{ConnPoll, ConnState, Connection};
use crate::link::window::{RecvOutcome, RecvWindow, SendWindow, SlideOutcome};
use crate::wire::{Frame, FrameErrorKind, FrameType};

/// Correlates an API call with its completion.
pub type SendToken = u64;

/// Work the driver must perform on the engine's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Hand a completed frame to the physical layer.
    Transmit(Vec<u8>),
    /// Deliver an in-order payload to the network layer.
    Deliver {
        /// Sequence number the payload arrived under.
        seq: u8,
        /// The payload bytes.
        payload: Vec<u8>,
    },
    /// Resolve the completion of a `send`/`connect`/`disconnect` call.
    Complete {
        /// Token of the originating call.
        token: SendToken,
        /// Its outcome.
        result: Result<(), LinkError>,
    },
    /// Report a telemetry event to the subscriber sink.
    Emit(Event),
}

#[derive(Debug)]
struct QueuedSend {
    token: SendToken,
    payload: Vec<u8>,
}

/// Deterministic protocol engine for one link endpoint.
#[derive(Debug)]
pub struct LinkEngine {
    config: LinkConfig,
    conn: Connection,
    ack: AckTracker,
    send_win: SendWindow,
    recv_win: RecvWindow,
    queue: VecDeque<QueuedSend>,
    stats: LinkStats,
    connect_token: Option<SendToken>,
    disconnect_token: Option<SendToken>,
    /// Most recent clean (no-retransmit) round-trip sample.
    last_rtt: Option<Duration>,
}

impl LinkEngine {
    /// Create an engine in the disconnected state.
    pub fn new(config: LinkConfig) -> Self {
        let conn = Connection::new(
            config.heartbeat_interval,
            config.heartbeat_liveness(),
            config.connect_timeout,
            config.disconnect_timeout,
        );
        let ack = AckTracker::new(config.ack_timeout, config.max_retries);
        let send_win = SendWindow::new(config.window_size);
        let recv_win = RecvWindow::new(config.window_size);
        Self {
            config,
            conn,
            ack,
            send_win,
            recv_win,
            queue: VecDeque::new(),
            stats: LinkStats::default(),
            connect_token: None,
            disconnect_token: None,
            last_rtt: None,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnState {
        self.conn.state()
    }

    /// Check if data may flow.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Link counters.
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// The send window, for inspection.
    pub fn send_window(&self) -> &SendWindow {
        &self.send_win
    }

    /// The receive window, for inspection.
    pub fn recv_window(&self) -> &RecvWindow {
        &self.recv_win
    }

    /// The acknowledgement tracker, for inspection.
    pub fn ack_tracker(&self) -> &AckTracker {
        &self.ack
    }

    /// Begin the handshake. The completion resolves when the peer
    /// accepts, or fails on timeout.
    pub fn connect(&mut self, token: SendToken, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        match self.conn.start_connect(self.send_win.next_seq(), now) {
            Ok(()) => {
                self.connect_token = Some(token);
                self.transmit(&Frame::connect(self.conn.local_seq()), &mut actions);
            }
            Err(err) => actions.push(Action::Complete {
                token,
                result: Err(err),
            }),
        }
        actions
    }

    /// Answer a pending inbound connection request. Returns whether the
    /// request was accepted alongside the resulting actions.
    pub fn accept(&mut self, remote_seq: u8, now: Instant) -> (bool, Vec<Action>) {
        let mut actions = Vec::new();
        if !self.conn.accept(remote_seq, self.send_win.next_seq(), now) {
            return (false, actions);
        }
        self.transmit(&Frame::connect_ack(self.conn.local_seq()), &mut actions);
        actions.push(Action::Emit(Event::Connected));
        self.poll_connection(now, &mut actions);
        (true, actions)
    }

    /// Begin a graceful teardown. Idempotent: on a disconnected endpoint
    /// the completion resolves immediately.
    pub fn disconnect(&mut self, token: SendToken, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        let was_connecting = self.conn.state() == ConnState::Connecting;
        if self.conn.start_disconnect(now) {
            self.disconnect_token = Some(token);
            self.transmit(&Frame::disconnect(), &mut actions);
        } else {
            if was_connecting {
                // Aborted handshake: fail the pending connect.
                if let Some(connect) = self.connect_token.take() {
                    actions.push(Action::Complete {
                        token: connect,
                        result: Err(LinkError::NotConnected),
                    });
                }
            }
            actions.push(Action::Complete {
                token,
                result: Ok(()),
            });
        }
        actions
    }

    /// Queue a payload for transmission.
    ///
    /// The completion resolves once the payload has been framed and
    /// handed to the physical layer, not once it is acknowledged. It
    /// fails fast outside `Connected` or when the payload exceeds the
    /// per-frame maximum.
    pub fn send(&mut self, token: SendToken, payload: Vec<u8>, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.conn.is_connected() {
            actions.push(Action::Complete {
                token,
                result: Err(LinkError::NotConnected),
            });
            return actions;
        }
        if payload.len() > self.config.max_data {
            actions.push(Action::Complete {
                token,
                result: Err(LinkError::PayloadTooLarge {
                    size: payload.len(),
                    max: self.config.max_data,
                }),
            });
            return actions;
        }
        self.queue.push_back(QueuedSend { token, payload });
        self.drain_queue(now, &mut actions);
        actions
    }

    /// Hand received physical-layer bytes to the engine.
    pub fn handle_rx(&mut self, bytes: &[u8], now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                match err.kind() {
                    FrameErrorKind::Crc => {
                        self.stats.crc_failures += 1;
                        actions.push(Action::Emit(Event::FrameError { kind: err.kind() }));
                    }
                    FrameErrorKind::UnknownType => {
                        self.stats.unknown_frames += 1;
                        actions.push(Action::Emit(Event::FrameError { kind: err.kind() }));
                    }
                    _ => {
                        // Structural garbage carries no usable header.
                        self.stats.structural_drops += 1;
                        trace!(error = %err, "dropping malformed frame");
                    }
                }
                return actions;
            }
        };
        self.stats.frames_received += 1;

        match frame.frame_type {
            FrameType::Connect => {
                if self.conn.on_connect_request(frame.seq) {
                    actions.push(Action::Emit(Event::ConnectionRequest {
                        remote_seq: frame.seq,
                    }));
                }
            }
            FrameType::ConnectAck => {
                if self.conn.on_connect_ack(frame.seq, now) {
                    actions.push(Action::Emit(Event::Connected));
                    if let Some(token) = self.connect_token.take() {
                        actions.push(Action::Complete {
                            token,
                            result: Ok(()),
                        });
                    }
                    self.poll_connection(now, &mut actions);
                }
            }
            FrameType::Disconnect => {
                let uptime = self.conn.uptime(now);
                if self.conn.on_disconnect() {
                    self.transmit(&Frame::disconnect_ack(), &mut actions);
                    self.teardown(DisconnectReason::Peer, uptime, &mut actions);
                }
            }
            FrameType::DisconnectAck => {
                let uptime = self.conn.uptime(now);
                if self.conn.on_disconnect_ack() {
                    if let Some(token) = self.disconnect_token.take() {
                        actions.push(Action::Complete {
                            token,
                            result: Ok(()),
                        });
                    }
                    self.teardown(DisconnectReason::Local, uptime, &mut actions);
                }
            }
            FrameType::Heartbeat => {
                if self.conn.on_heartbeat(now) {
                    self.transmit(&Frame::heartbeat(), &mut actions);
                    self.conn.record_heartbeat_sent(now);
                }
            }
            FrameType::Data => self.on_data(frame.seq, frame.payload, now, &mut actions),
            FrameType::Ack => self.on_ack(frame.seq, now, &mut actions),
            FrameType::Nak => self.on_nak(frame.seq, now, &mut actions),
        }
        actions
    }

    /// Drive the retransmission and connection timers.
    pub fn handle_timeout(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        for outcome in self.ack.expire(now) {
            match outcome {
                TimerOutcome::Retransmit { seq, frame, retries } => {
                    debug!(seq, retries, "ack timeout, retransmitting");
                    self.stats.retransmits += 1;
                    self.stats.frames_sent += 1;
                    actions.push(Action::Transmit(frame));
                }
                TimerOutcome::Failed { seq, retries } => {
                    warn!(seq, retries, "retry budget exhausted, dropping frame");
                    actions.push(Action::Emit(Event::TransmissionFailed { seq, retries }));
                }
            }
        }
        self.poll_connection(now, &mut actions);
        actions
    }

    /// The next instant at which [`LinkEngine::handle_timeout`] has work.
    pub fn next_timeout(&self) -> Option<Instant> {
        match (self.ack.next_deadline(), self.conn.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Transmit a negative acknowledgement asking for `seq`.
    ///
    /// Nothing in the receive path triggers this automatically: a corrupt
    /// frame has no trustworthy sequence number to point at, so loss
    /// recovery normally rides on the sender's retransmission timer.
    pub fn send_nak(&mut self, seq: u8, reason: NakReason) -> Vec<Action> {
        let mut actions = Vec::new();
        self.transmit(&Frame::nak(seq), &mut actions);
        actions.push(Action::Emit(Event::NakSent { seq, reason }));
        actions
    }

    fn on_data(&mut self, seq: u8, payload: Vec<u8>, now: Instant, actions: &mut Vec<Action>) {
        if !self.conn.is_connected() {
            trace!(seq, "data frame outside a connection, dropping");
            return;
        }
        match self.recv_win.on_frame(seq, payload, now) {
            RecvOutcome::Delivered(frames) => {
                let highest = frames.last().map(|(seq, _)| *seq);
                for (seq, payload) in frames {
                    self.stats.delivered += 1;
                    actions.push(Action::Deliver { seq, payload });
                }
                if let Some(highest) = highest {
                    self.send_ack(highest, actions);
                }
            }
            RecvOutcome::Duplicate => {
                // The peer missed our ack; repeat it.
                self.stats.duplicates += 1;
                self.send_ack(seq, actions);
            }
            RecvOutcome::Buffered => {
                actions.push(Action::Emit(Event::FrameBuffered {
                    seq,
                    expected: self.recv_win.expected(),
                }));
            }
            RecvOutcome::OutOfWindow => {
                trace!(seq, expected = self.recv_win.expected(), "frame outside window");
            }
        }
    }

    fn on_ack(&mut self, seq: u8, now: Instant, actions: &mut Vec<Action>) {
        // Tracker first, then the window: the tracker needs the entry to
        // measure the round trip before the slide sweeps it away.
        match self.ack.acknowledge(seq, now) {
            AckOutcome::Acked { rtt, retries } => {
                self.stats.acks_received += 1;
                if retries == 0 {
                    self.last_rtt = Some(rtt);
                }
                actions.push(Action::Emit(Event::AckReceived { seq, rtt, retries }));
            }
            AckOutcome::Unexpected => {
                actions.push(Action::Emit(Event::AckUnexpected { seq }));
            }
        }

        match self.send_win.on_ack(seq) {
            SlideOutcome::Slid { from, to, count } => {
                // Cumulative: everything the slide covered is confirmed,
                // so earlier entries must not keep live timers.
                let covered = (0..count)
                    .map(|i| (from + i) % SEQ_MOD)
                    .filter(|&s| s != seq);
                self.ack.sweep(covered);
                actions.push(Action::Emit(Event::WindowAdvanced {
                    old_base: from,
                    new_base: to,
                }));
                if let Some(rtt) = self.last_rtt {
                    self.send_win.adjust(rtt, self.stats.loss_rate());
                }
                self.drain_queue(now, actions);
            }
            SlideOutcome::Duplicate | SlideOutcome::OutOfWindow => {}
        }
    }

    fn on_nak(&mut self, seq: u8, now: Instant, actions: &mut Vec<Action>) {
        actions.push(Action::Emit(Event::NakReceived { seq }));
        if let Some(frame) = self.ack.negative(seq, now) {
            debug!(seq, "nak, retransmitting ahead of timer");
            self.stats.retransmits += 1;
            self.stats.frames_sent += 1;
            actions.push(Action::Transmit(frame));
        }
    }

    fn drain_queue(&mut self, now: Instant, actions: &mut Vec<Action>) {
        while self.conn.is_connected() && !self.queue.is_empty() {
            let Some(seq) = self.send_win.acquire() else {
                actions.push(Action::Emit(Event::WindowFull));
                break;
            };
            let Some(item) = self.queue.pop_front() else {
                break;
            };
            match Frame::data(seq, item.payload) {
                Ok(frame) => {
                    let bytes = frame.encode();
                    let size = bytes.len();
                    self.ack.register(seq, bytes.clone(), now);
                    self.stats.data_frames_sent += 1;
                    self.stats.frames_sent += 1;
                    actions.push(Action::Transmit(bytes));
                    actions.push(Action::Emit(Event::DataFrameSent { seq, size }));
                    actions.push(Action::Complete {
                        token: item.token,
                        result: Ok(()),
                    });
                }
                Err(err) => {
                    // Size is validated on entry; this is unreachable in
                    // practice but must not lose the completion.
                    actions.push(Action::Complete {
                        token: item.token,
                        result: Err(LinkError::PayloadTooLarge {
                            size: 0,
                            max: self.config.max_data,
                        }),
                    });
                    warn!(seq, error = %err, "failed to frame queued payload");
                }
            }
        }
    }

    fn send_ack(&mut self, seq: u8, actions: &mut Vec<Action>) {
        self.transmit(&Frame::ack(seq), actions);
        self.stats.acks_sent += 1;
        actions.push(Action::Emit(Event::AckSent { seq }));
    }

    fn transmit(&mut self, frame: &Frame, actions: &mut Vec<Action>) {
        self.stats.frames_sent += 1;
        actions.push(Action::Transmit(frame.encode()));
    }

    fn poll_connection(&mut self, now: Instant, actions: &mut Vec<Action>) {
        let uptime = self.conn.uptime(now);
        match self.conn.poll(now) {
            Some(ConnPoll::SendHeartbeat) => {
                self.transmit(&Frame::heartbeat(), actions);
                self.conn.record_heartbeat_sent(now);
            }
            Some(ConnPoll::PeerDead) => {
                self.teardown(DisconnectReason::HeartbeatTimeout, uptime, actions);
            }
            Some(ConnPoll::ConnectTimedOut) => {
                if let Some(token) = self.connect_token.take() {
                    actions.push(Action::Complete {
                        token,
                        result: Err(LinkError::ConnectTimeout(self.config.connect_timeout)),
                    });
                }
                self.teardown(DisconnectReason::ConnectTimeout, uptime, actions);
            }
            Some(ConnPoll::DisconnectTimedOut) => {
                if let Some(token) = self.disconnect_token.take() {
                    actions.push(Action::Complete {
                        token,
                        result: Ok(()),
                    });
                }
                self.teardown(DisconnectReason::Local, uptime, actions);
            }
            None => {}
        }
    }

    /// Tear down transfer state after any transition into `Disconnected`:
    /// cancel every retransmission timer, reject queued sends, reset both
    /// windows, and report the disconnect.
    fn teardown(&mut self, reason: DisconnectReason, uptime: Duration, actions: &mut Vec<Action>) {
        let cleared = self.ack.clear();
        if cleared > 0 {
            trace!(cleared, "cancelled pending retransmissions");
        }
        self.send_win.reset();
        self.recv_win.reset();
        self.conn.drop_connection();
        while let Some(item) = self.queue.pop_front() {
            actions.push(Action::Complete {
                token: item.token,
                result: Err(LinkError::NotConnected),
            });
        }
        actions.push(Action::Emit(Event::Disconnected { reason, uptime }));
    }
}
