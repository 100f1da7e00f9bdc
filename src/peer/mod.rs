//! Tokio-backed driver for one link endpoint.
//!
//! [`LinkPeer::spawn`] starts a single engine task per peer. All state
//! lives inside that task, so commands, received frames, and timer
//! expirations are processed strictly serially; the async API is a thin
//! channel layer in front of the deterministic [`LinkEngine`].
//!
//! The physical layer binds through [`LinkIo::frames_out`] (frames the
//! engine wants on the wire) and [`LinkHandle::handle_rx`] (bytes that
//! arrived, corrupted or not). The network layer consumes
//! [`LinkIo::deliveries`] and calls [`LinkHandle::send`].

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::core::{Event, LinkConfig, LinkError};
use crate::link::{Action, LinkEngine, SendToken};

/// An in-order payload handed up to the network layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Sequence number the payload arrived under.
    pub seq: u8,
    /// The payload bytes.
    pub payload: Vec<u8>,
}

enum Command {
    Connect {
        done: oneshot::Sender<Result<(), LinkError>>,
    },
    Accept {
        remote_seq: u8,
        done: oneshot::Sender<bool>,
    },
    Disconnect {
        done: oneshot::Sender<Result<(), LinkError>>,
    },
    Send {
        payload: Vec<u8>,
        done: oneshot::Sender<Result<(), LinkError>>,
    },
    Rx {
        bytes: Vec<u8>,
    },
}

/// Handle for driving a spawned link endpoint.
///
/// Cheap to clone; all clones talk to the same engine task.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    cmd: mpsc::UnboundedSender<Command>,
}

impl LinkHandle {
    /// Establish a connection with the peer.
    ///
    /// Resolves once the peer accepts; fails with
    /// [`LinkError::ConnectTimeout`] if the request goes unanswered.
    pub async fn connect(&self) -> Result<(), LinkError> {
        let (done, wait) = oneshot::channel();
        self.cmd
            .send(Command::Connect { done })
            .map_err(|_| LinkError::Closed)?;
        wait.await.map_err(|_| LinkError::Closed)?
    }

    /// Answer a surfaced [`Event::ConnectionRequest`]. Returns whether
    /// the request was still pending and has been accepted.
    pub async fn accept(&self, remote_seq: u8) -> Result<bool, LinkError> {
        let (done, wait) = oneshot::channel();
        self.cmd
            .send(Command::Accept { remote_seq, done })
            .map_err(|_| LinkError::Closed)?;
        wait.await.map_err(|_| LinkError::Closed)
    }

    /// Tear the connection down gracefully. Idempotent on a
    /// disconnected endpoint.
    pub async fn disconnect(&self) -> Result<(), LinkError> {
        let (done, wait) = oneshot::channel();
        self.cmd
            .send(Command::Disconnect { done })
            .map_err(|_| LinkError::Closed)?;
        wait.await.map_err(|_| LinkError::Closed)?
    }

    /// Queue a payload for reliable, in-order delivery to the peer.
    ///
    /// Resolves once the payload has been framed and handed to the
    /// physical layer, not once it is acknowledged.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), LinkError> {
        let (done, wait) = oneshot::channel();
        self.cmd
            .send(Command::Send { payload, done })
            .map_err(|_| LinkError::Closed)?;
        wait.await.map_err(|_| LinkError::Closed)?
    }

    /// Physical-layer upcall: bytes arrived on the wire, possibly
    /// corrupted or truncated. Never blocks.
    pub fn handle_rx(&self, bytes: Vec<u8>) -> Result<(), LinkError> {
        self.cmd
            .send(Command::Rx { bytes })
            .map_err(|_| LinkError::Closed)
    }
}

/// The engine task's outbound channels.
#[derive(Debug)]
pub struct LinkIo {
    /// Frames for the physical layer, in transmission order.
    pub frames_out: mpsc::UnboundedReceiver<Vec<u8>>,
    /// In-order payloads for the network layer.
    pub deliveries: mpsc::UnboundedReceiver<Delivery>,
    /// Telemetry events for the subscriber sink.
    pub events: mpsc::UnboundedReceiver<Event>,
}

/// Factory for spawned link endpoints.
pub struct LinkPeer;

impl LinkPeer {
    /// Spawn the engine task for one endpoint. Must be called inside a
    /// tokio runtime.
    pub fn spawn(config: LinkConfig) -> (LinkHandle, LinkIo) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            engine: LinkEngine::new(config),
            completions: HashMap::new(),
            next_token: 0,
            frames_out: frames_tx,
            deliveries: deliveries_tx,
            events: events_tx,
        };
        tokio::spawn(driver.run(cmd_rx));
        debug!("link endpoint spawned");

        (
            LinkHandle { cmd: cmd_tx },
            LinkIo {
                frames_out: frames_rx,
                deliveries: deliveries_rx,
                events: events_rx,
            },
        )
    }
}

struct Driver {
    engine: LinkEngine,
    completions: HashMap<SendToken, oneshot::Sender<Result<(), LinkError>>>,
    next_token: SendToken,
    frames_out: mpsc::UnboundedSender<Vec<u8>>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    events: mpsc::UnboundedSender<Event>,
}

impl Driver {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let deadline = self.engine.next_timeout();
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        // Every handle dropped; the link dies with them.
                        trace!("command channel closed, stopping engine task");
                        break;
                    };
                    self.handle_command(cmd);
                }
                _ = Self::sleep_until(deadline) => {
                    let actions = self.engine.handle_timeout(Instant::now());
                    self.apply(actions);
                }
            }
        }
    }

    async fn sleep_until(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => {
                tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            }
            None => std::future::pending().await,
        }
    }

    fn next_token(&mut self) -> SendToken {
        self.next_token += 1;
        self.next_token
    }

    fn handle_command(&mut self, cmd: Command) {
        let now = Instant::now();
        let actions = match cmd {
            Command::Connect { done } => {
                let token = self.next_token();
                self.completions.insert(token, done);
                self.engine.connect(token, now)
            }
            Command::Disconnect { done } => {
                let token = self.next_token();
                self.completions.insert(token, done);
                self.engine.disconnect(token, now)
            }
            Command::Send { payload, done } => {
                let token = self.next_token();
                self.completions.insert(token, done);
                self.engine.send(token, payload, now)
            }
            Command::Accept { remote_seq, done } => {
                let (accepted, actions) = self.engine.accept(remote_seq, now);
                let _ = done.send(accepted);
                actions
            }
            Command::Rx { bytes } => self.engine.handle_rx(&bytes, now),
        };
        self.apply(actions);
    }

    fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Transmit(bytes) => {
                    // A closed physical side just means frames fall on the
                    // floor, which the protocol already tolerates.
                    let _ = self.frames_out.send(bytes);
                }
                Action::Deliver { seq, payload } => {
                    let _ = self.deliveries.send(Delivery { seq, payload });
                }
                Action::Complete { token, result } => {
                    if let Some(done) = self.completions.remove(&token) {
                        let _ = done.send(result);
                    }
                }
                Action::Emit(event) => {
                    let _ = self.events.send(event);
                }
            }
        }
    }
}
