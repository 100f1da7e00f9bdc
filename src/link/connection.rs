//! Connection lifecycle state machine.
//!
//! ```text
//! DISCONNECTED --connect()-->        CONNECTING    (tx CONNECT)
//! CONNECTING   --rx CONNECT_ACK-->   CONNECTED     (heartbeats start)
//! CONNECTING   --timeout(10s)-->     DISCONNECTED  (connect fails)
//! DISCONNECTED --rx CONNECT-->       DISCONNECTED  (request surfaced;
//!                                    accept() => CONNECTED, tx CONNECT_ACK)
//! CONNECTED    --disconnect()-->     DISCONNECTING (tx DISCONNECT)
//! DISCONNECTING--rx DISCONNECT_ACK-->DISCONNECTED
//! DISCONNECTING--timeout(5s)-->      DISCONNECTED  (forced)
//! CONNECTED    --rx DISCONNECT-->    DISCONNECTED  (tx DISCONNECT_ACK)
//! CONNECTED    --hb timeout-->       DISCONNECTED  (peer dead)
//! ```
//!
//! While connected, a heartbeat is emitted every interval; a peer silent
//! for three intervals is declared dead. Heartbeat replies are
//! rate-limited by the last transmission time so two connected peers
//! cannot amplify each other.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::LinkError;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No connection.
    Disconnected,
    /// Connection request sent, waiting for the accept.
    Connecting,
    /// Established; data may flow.
    Connected,
    /// Disconnect sent, waiting for the confirmation.
    Disconnecting,
}

/// Time-driven outcomes reported by [`Connection::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnPoll {
    /// Emit a heartbeat probe.
    SendHeartbeat,
    /// The peer missed its liveness horizon; now disconnected.
    PeerDead,
    /// The connection request went unanswered; now disconnected.
    ConnectTimedOut,
    /// The disconnect confirmation never arrived; forced the transition.
    DisconnectTimedOut,
}

/// Connection state machine for one link endpoint.
#[derive(Debug)]
pub struct Connection {
    state: ConnState,
    local_seq: u8,
    remote_seq: u8,
    /// Sequence number announced by a pending inbound connection request.
    pending_request: Option<u8>,
    connected_at: Option<Instant>,
    last_hb_sent: Option<Instant>,
    last_hb_recv: Option<Instant>,
    /// Connect or disconnect deadline, depending on state.
    deadline: Option<Instant>,

    heartbeat_interval: Duration,
    liveness: Duration,
    connect_timeout: Duration,
    disconnect_timeout: Duration,
}

impl Connection {
    /// Create a disconnected endpoint.
    pub fn new(
        heartbeat_interval: Duration,
        liveness: Duration,
        connect_timeout: Duration,
        disconnect_timeout: Duration,
    ) -> Self {
        Self {
            state: ConnState::Disconnected,
            local_seq: 0,
            remote_seq: 0,
            pending_request: None,
            connected_at: None,
            last_hb_sent: None,
            last_hb_recv: None,
            deadline: None,
            heartbeat_interval,
            liveness,
            connect_timeout,
            disconnect_timeout,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Check if data may flow.
    pub fn is_connected(&self) -> bool {
        self.state == ConnState::Connected
    }

    /// Initial sequence number announced to the peer.
    pub fn local_seq(&self) -> u8 {
        self.local_seq
    }

    /// Initial sequence number announced by the peer.
    pub fn remote_seq(&self) -> u8 {
        self.remote_seq
    }

    /// How long the connection has been up.
    pub fn uptime(&self, now: Instant) -> Duration {
        self.connected_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default()
    }

    /// Begin the handshake. Fails outside `Disconnected`.
    pub fn start_connect(&mut self, local_seq: u8, now: Instant) -> Result<(), LinkError> {
        if self.state != ConnState::Disconnected {
            return Err(LinkError::AlreadyConnected);
        }
        self.local_seq = local_seq;
        self.state = ConnState::Connecting;
        self.deadline = Some(now + self.connect_timeout);
        debug!("connecting");
        Ok(())
    }

    /// The peer accepted our connection request.
    ///
    /// Returns `true` on the `Connecting -> Connected` transition.
    pub fn on_connect_ack(&mut self, remote_seq: u8, now: Instant) -> bool {
        if self.state != ConnState::Connecting {
            return false;
        }
        self.remote_seq = remote_seq;
        self.establish(now);
        true
    }

    /// The peer asked to connect. Only meaningful while disconnected; the
    /// request is held until [`Connection::accept`] answers it. Returns
    /// `true` if the request should be surfaced to the caller.
    pub fn on_connect_request(&mut self, remote_seq: u8) -> bool {
        if self.state != ConnState::Disconnected {
            return false;
        }
        self.pending_request = Some(remote_seq);
        true
    }

    /// Accept a pending inbound connection request.
    ///
    /// Succeeds only while a request with exactly this sequence number is
    /// pending; the caller then transmits the accept frame.
    pub fn accept(&mut self, remote_seq: u8, local_seq: u8, now: Instant) -> bool {
        if self.state != ConnState::Disconnected || self.pending_request != Some(remote_seq) {
            return false;
        }
        self.local_seq = local_seq;
        self.remote_seq = remote_seq;
        self.establish(now);
        true
    }

    fn establish(&mut self, now: Instant) {
        self.state = ConnState::Connected;
        self.pending_request = None;
        self.connected_at = Some(now);
        self.last_hb_sent = None;
        self.last_hb_recv = Some(now);
        self.deadline = None;
        debug!("connected");
    }

    /// Begin a graceful teardown. Returns `true` if a disconnect frame
    /// should be transmitted; disconnecting an already-disconnected
    /// endpoint is a no-op.
    pub fn start_disconnect(&mut self, now: Instant) -> bool {
        match self.state {
            ConnState::Connected => {
                self.state = ConnState::Disconnecting;
                self.deadline = Some(now + self.disconnect_timeout);
                debug!("disconnecting");
                true
            }
            // Connecting aborts locally; nothing to tell the peer yet.
            ConnState::Connecting => {
                self.drop_connection();
                false
            }
            ConnState::Disconnecting | ConnState::Disconnected => false,
        }
    }

    /// The peer confirmed our disconnect. Returns `true` on the
    /// `Disconnecting -> Disconnected` transition.
    pub fn on_disconnect_ack(&mut self) -> bool {
        if self.state != ConnState::Disconnecting {
            return false;
        }
        self.drop_connection();
        true
    }

    /// The peer requested a disconnect. Returns `true` if a confirmation
    /// should be transmitted (also answers a simultaneous close).
    pub fn on_disconnect(&mut self) -> bool {
        match self.state {
            ConnState::Connected | ConnState::Disconnecting => {
                self.drop_connection();
                true
            }
            _ => false,
        }
    }

    /// A heartbeat arrived. Records peer liveness; returns `true` if a
    /// reply should be transmitted now (suppressed if we probed the peer
    /// within the last interval).
    pub fn on_heartbeat(&mut self, now: Instant) -> bool {
        if self.state != ConnState::Connected {
            return false;
        }
        self.last_hb_recv = Some(now);
        match self.last_hb_sent {
            Some(sent) => now.saturating_duration_since(sent) >= self.heartbeat_interval,
            None => true,
        }
    }

    /// Record that a heartbeat was put on the wire.
    pub fn record_heartbeat_sent(&mut self, now: Instant) {
        self.last_hb_sent = Some(now);
    }

    /// Drive the time-based transitions.
    pub fn poll(&mut self, now: Instant) -> Option<ConnPoll> {
        match self.state {
            ConnState::Connecting => {
                if self.deadline.is_some_and(|d| now >= d) {
                    self.drop_connection();
                    debug!("connect timed out");
                    return Some(ConnPoll::ConnectTimedOut);
                }
                None
            }
            ConnState::Disconnecting => {
                if self.deadline.is_some_and(|d| now >= d) {
                    self.drop_connection();
                    debug!("disconnect timed out, forcing local transition");
                    return Some(ConnPoll::DisconnectTimedOut);
                }
                None
            }
            ConnState::Connected => {
                if self
                    .last_hb_recv
                    .is_some_and(|recv| now.saturating_duration_since(recv) > self.liveness)
                {
                    self.drop_connection();
                    debug!("peer missed liveness horizon");
                    return Some(ConnPoll::PeerDead);
                }
                let due = match self.last_hb_sent {
                    Some(sent) => now.saturating_duration_since(sent) >= self.heartbeat_interval,
                    None => true,
                };
                if due {
                    return Some(ConnPoll::SendHeartbeat);
                }
                None
            }
            ConnState::Disconnected => None,
        }
    }

    /// The next instant at which [`Connection::poll`] has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            ConnState::Connecting | ConnState::Disconnecting => self.deadline,
            ConnState::Connected => {
                let hb = self.last_hb_sent.map(|sent| sent + self.heartbeat_interval);
                let dead = self.last_hb_recv.map(|recv| recv + self.liveness);
                match (hb, dead) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            }
            ConnState::Disconnected => None,
        }
    }

    /// Force the disconnected state, clearing all bookkeeping.
    pub fn drop_connection(&mut self) {
        self.state = ConnState::Disconnected;
        self.pending_request = None;
        self.connected_at = None;
        self.last_hb_sent = None;
        self.last_hb_recv = None;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HB: Duration = Duration::from_millis(5000);
    const LIVENESS: Duration = Duration::from_millis(15_000);
    const CONNECT_T: Duration = Duration::from_millis(10_000);
    const DISCONNECT_T: Duration = Duration::from_millis(5000);

    fn conn() -> Connection {
        Connection::new(HB, LIVENESS, CONNECT_T, DISCONNECT_T)
    }

    #[test]
    fn test_handshake_initiator() {
        let mut c = conn();
        let t0 = Instant::now();

        assert_eq!(c.state(), ConnState::Disconnected);
        c.start_connect(0, t0).unwrap();
        assert_eq!(c.state(), ConnState::Connecting);

        assert!(c.on_connect_ack(0, t0 + Duration::from_millis(30)));
        assert!(c.is_connected());
        assert_eq!(c.remote_seq(), 0);
    }

    #[test]
    fn test_connect_rejected_when_busy() {
        let mut c = conn();
        let t0 = Instant::now();
        c.start_connect(0, t0).unwrap();

        assert_eq!(c.start_connect(0, t0), Err(LinkError::AlreadyConnected));

        c.on_connect_ack(0, t0);
        assert_eq!(c.start_connect(0, t0), Err(LinkError::AlreadyConnected));
    }

    #[test]
    fn test_connect_timeout() {
        let mut c = conn();
        let t0 = Instant::now();
        c.start_connect(0, t0).unwrap();

        assert_eq!(c.poll(t0 + CONNECT_T - Duration::from_millis(1)), None);
        assert_eq!(c.poll(t0 + CONNECT_T), Some(ConnPoll::ConnectTimedOut));
        assert_eq!(c.state(), ConnState::Disconnected);
    }

    #[test]
    fn test_handshake_acceptor() {
        let mut c = conn();
        let t0 = Instant::now();

        assert!(c.on_connect_request(0));
        assert_eq!(c.state(), ConnState::Disconnected);

        // Wrong token is refused, right one connects.
        assert!(!c.accept(5, 0, t0));
        assert!(c.accept(0, 0, t0));
        assert!(c.is_connected());
    }

    #[test]
    fn test_accept_without_request_fails() {
        let mut c = conn();
        assert!(!c.accept(0, 0, Instant::now()));
    }

    #[test]
    fn test_connect_request_ignored_when_connected() {
        let mut c = conn();
        let t0 = Instant::now();
        c.on_connect_request(2);
        c.accept(2, 0, t0);

        assert!(!c.on_connect_request(7));
    }

    #[test]
    fn test_graceful_disconnect() {
        let mut c = conn();
        let t0 = Instant::now();
        c.start_connect(0, t0).unwrap();
        c.on_connect_ack(0, t0);

        assert!(c.start_disconnect(t0 + Duration::from_secs(1)));
        assert_eq!(c.state(), ConnState::Disconnecting);

        assert!(c.on_disconnect_ack());
        assert_eq!(c.state(), ConnState::Disconnected);
    }

    #[test]
    fn test_disconnect_idempotent() {
        let mut c = conn();
        assert!(!c.start_disconnect(Instant::now()));
        assert_eq!(c.state(), ConnState::Disconnected);
    }

    #[test]
    fn test_disconnect_timeout_forces() {
        let mut c = conn();
        let t0 = Instant::now();
        c.on_connect_request(0);
        c.accept(0, 0, t0);
        c.start_disconnect(t0);

        assert_eq!(c.poll(t0 + DISCONNECT_T), Some(ConnPoll::DisconnectTimedOut));
        assert_eq!(c.state(), ConnState::Disconnected);
    }

    #[test]
    fn test_peer_disconnect() {
        let mut c = conn();
        let t0 = Instant::now();
        c.on_connect_request(0);
        c.accept(0, 0, t0);

        assert!(c.on_disconnect());
        assert_eq!(c.state(), ConnState::Disconnected);

        // Not connected: nothing to confirm.
        assert!(!c.on_disconnect());
    }

    #[test]
    fn test_simultaneous_close() {
        let mut c = conn();
        let t0 = Instant::now();
        c.on_connect_request(0);
        c.accept(0, 0, t0);
        c.start_disconnect(t0);

        // Peer's disconnect crosses ours; still confirm and drop.
        assert!(c.on_disconnect());
        assert_eq!(c.state(), ConnState::Disconnected);
    }

    #[test]
    fn test_heartbeat_emission_schedule() {
        let mut c = conn();
        let t0 = Instant::now();
        c.on_connect_request(0);
        c.accept(0, 0, t0);

        // First poll probes immediately.
        assert_eq!(c.poll(t0), Some(ConnPoll::SendHeartbeat));
        c.record_heartbeat_sent(t0);

        assert_eq!(c.poll(t0 + HB - Duration::from_millis(1)), None);
        assert_eq!(c.poll(t0 + HB), Some(ConnPoll::SendHeartbeat));
    }

    #[test]
    fn test_heartbeat_reply_rate_limited() {
        let mut c = conn();
        let t0 = Instant::now();
        c.on_connect_request(0);
        c.accept(0, 0, t0);
        c.record_heartbeat_sent(t0);

        // Probe arrives right after we sent one: no reply.
        assert!(!c.on_heartbeat(t0 + Duration::from_millis(100)));

        // A probe after a full interval earns a reply.
        assert!(c.on_heartbeat(t0 + HB));
    }

    #[test]
    fn test_liveness_failure() {
        let mut c = conn();
        let t0 = Instant::now();
        c.on_connect_request(0);
        c.accept(0, 0, t0);
        c.record_heartbeat_sent(t0);

        // Peer heartbeats keep the link alive.
        c.on_heartbeat(t0 + Duration::from_secs(5));
        assert_ne!(c.poll(t0 + Duration::from_secs(10)), Some(ConnPoll::PeerDead));

        // Silence past the horizon kills it.
        let dead_at = t0 + Duration::from_secs(5) + LIVENESS + Duration::from_millis(1);
        assert_eq!(c.poll(dead_at), Some(ConnPoll::PeerDead));
        assert_eq!(c.state(), ConnState::Disconnected);
    }

    #[test]
    fn test_uptime() {
        let mut c = conn();
        let t0 = Instant::now();
        assert_eq!(c.uptime(t0), Duration::ZERO);

        c.on_connect_request(0);
        c.accept(0, 0, t0);
        assert_eq!(c.uptime(t0 + Duration::from_secs(9)), Duration::from_secs(9));
    }

    #[test]
    fn test_next_deadline_by_state() {
        let mut c = conn();
        let t0 = Instant::now();
        assert!(c.next_deadline().is_none());

        c.start_connect(0, t0).unwrap();
        assert_eq!(c.next_deadline(), Some(t0 + CONNECT_T));

        c.on_connect_ack(0, t0);
        c.record_heartbeat_sent(t0);
        // Heartbeat is sooner than the liveness horizon.
        assert_eq!(c.next_deadline(), Some(t0 + HB));

        c.start_disconnect(t0);
        assert_eq!(c.next_deadline(), Some(t0 + DISCONNECT_T));
    }

    #[test]
    fn test_disconnect_while_connecting_aborts_silently() {
        let mut c = conn();
        let t0 = Instant::now();
        c.start_connect(0, t0).unwrap();

        assert!(!c.start_disconnect(t0));
        assert_eq!(c.state(), ConnState::Disconnected);
    }

    #[test]
    fn test_heartbeat_ignored_when_not_connected() {
        let mut c = conn();
        assert!(!c.on_heartbeat(Instant::now()));
    }
}
