//! The voice session actor.
//!
//! [`ConnectionState`] is owned by a single task. Every request (reconciling
//! against a text event's channel, manual join/leave, observer notifications,
//! playback, status) is a `SessionCommand` on one mpsc channel and is
//! processed to completion before the next one is read. That gives the
//! lifecycle its ordering guarantees:
//!
//! - observer effects never interleave with an in-flight reconciliation;
//! - a superseding reconciliation waits for the previous one to finish;
//! - teardown always completes before the connect that follows it.
//!
//! [`VoiceSession`] is the cloneable handle used to talk to the actor.

use crate::config::ConnectionConfig;
use crate::error::{ConnectError, VoiceError};
use crate::establisher::Establisher;
use crate::playback::{self, Rejected, Started};
use crate::state::{ConnectionSnapshot, ConnectionState};
use crate::transport::VoiceTransport;
use murmur_types::SessionTarget;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the command channel feeding the session actor.
const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// The session is connected to the requested channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ready {
    /// An existing, verified connection was reused.
    Reused,
    /// A fresh connection was established.
    Connected,
    /// The session moved from another channel.
    Migrated,
}

/// The session could not be brought to the requested channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unready {
    #[error("sender is not in a voice channel")]
    NoChannel,

    #[error(transparent)]
    ConnectFailed(ConnectError),

    #[error("voice session task is not running")]
    SessionClosed,
}

/// Why the observer asked for a teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownReason {
    TargetLeft,
    SessionInvalid,
}

impl TeardownReason {
    fn label(self) -> &'static str {
        match self {
            Self::TargetLeft => "target_left",
            Self::SessionInvalid => "session_invalid",
        }
    }
}

enum SessionCommand {
    Ensure {
        target: SessionTarget,
        reply: oneshot::Sender<Result<Ready, Unready>>,
    },
    Join {
        target: SessionTarget,
        reply: oneshot::Sender<Result<Ready, ConnectError>>,
    },
    Leave {
        reply: oneshot::Sender<bool>,
    },
    Teardown {
        reason: TeardownReason,
    },
    Lost {
        channel: Option<SessionTarget>,
    },
    Play {
        audio: Vec<u8>,
        reply: oneshot::Sender<Result<Started, Rejected>>,
    },
    Status {
        reply: oneshot::Sender<ConnectionSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// What reconciliation decided to do, computed from a fresh read of state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Reuse,
    ProbeFailed(String),
    Migrate { from: SessionTarget },
    Dead,
    Absent,
}

/// Handle to the voice session actor.
#[derive(Clone)]
pub struct VoiceSession {
    tx: mpsc::Sender<SessionCommand>,
}

impl VoiceSession {
    /// Spawns the session actor on the current tokio runtime.
    pub fn spawn(
        transport: Arc<dyn VoiceTransport>,
        config: &ConnectionConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(DEFAULT_COMMAND_CAPACITY);
        let actor = SessionActor {
            state: ConnectionState::new(),
            establisher: Establisher::new(transport, config),
            migrate_delay: config.migrate_delay(),
            rx,
        };
        let handle = tokio::spawn(actor.run());
        (Self { tx }, handle)
    }

    /// Makes sure the session is connected to `target`.
    ///
    /// `None` means the sender is not in any voice channel.
    pub async fn ensure(&self, target: Option<SessionTarget>) -> Result<Ready, Unready> {
        let Some(target) = target else {
            debug!("sender not in a voice channel");
            return Err(Unready::NoChannel);
        };
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Ensure { target, reply })
            .await
            .map_err(|_| Unready::SessionClosed)?;
        rx.await.map_err(|_| Unready::SessionClosed)?
    }

    /// Manually connects to `target`, replacing any current session.
    pub async fn join(&self, target: SessionTarget) -> Result<Ready, VoiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Join { target, reply })
            .await
            .map_err(|_| VoiceError::SessionClosed)?;
        Ok(rx.await.map_err(|_| VoiceError::SessionClosed)??)
    }

    /// Manually leaves the current channel.
    ///
    /// Returns `true` if a live session was torn down.
    pub async fn leave(&self) -> Result<bool, VoiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Leave { reply })
            .await
            .map_err(|_| VoiceError::SessionClosed)?;
        rx.await.map_err(|_| VoiceError::SessionClosed)
    }

    /// Enqueues an unconditional teardown.
    pub async fn request_teardown(&self, reason: TeardownReason) -> Result<(), VoiceError> {
        self.tx
            .send(SessionCommand::Teardown { reason })
            .await
            .map_err(|_| VoiceError::SessionClosed)
    }

    /// Enqueues a notice that the agent lost its membership in `channel`.
    pub async fn report_lost(&self, channel: Option<SessionTarget>) -> Result<(), VoiceError> {
        self.tx
            .send(SessionCommand::Lost { channel })
            .await
            .map_err(|_| VoiceError::SessionClosed)
    }

    /// Starts playing `audio`, or rejects it if that is not possible right now.
    pub async fn play(&self, audio: Vec<u8>) -> Result<Started, Rejected> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Play { audio, reply })
            .await
            .map_err(|_| Rejected::NotConnected)?;
        rx.await.map_err(|_| Rejected::NotConnected)?
    }

    pub async fn status(&self) -> Result<ConnectionSnapshot, VoiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Status { reply })
            .await
            .map_err(|_| VoiceError::SessionClosed)?;
        rx.await.map_err(|_| VoiceError::SessionClosed)
    }

    /// Tears the session down and stops the actor.
    pub async fn shutdown(&self) -> Result<(), VoiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Shutdown { reply })
            .await
            .map_err(|_| VoiceError::SessionClosed)?;
        rx.await.map_err(|_| VoiceError::SessionClosed)
    }
}

struct SessionActor {
    state: ConnectionState,
    establisher: Establisher,
    migrate_delay: Duration,
    rx: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self) {
        info!("voice session actor started");
        while let Some(command) = self.rx.recv().await {
            match command {
                SessionCommand::Ensure { target, reply } => {
                    let result = self.ensure(target).await;
                    let _ = reply.send(result);
                }
                SessionCommand::Join { target, reply } => {
                    let result = self.join(target).await;
                    let _ = reply.send(result);
                }
                SessionCommand::Leave { reply } => {
                    let was_live = self.state.live_target().is_some();
                    self.state.teardown().await;
                    let _ = reply.send(was_live);
                }
                SessionCommand::Teardown { reason } => {
                    if self.state.teardown().await {
                        info!(reason = reason.label(), "voice session torn down by observer");
                    }
                }
                SessionCommand::Lost { channel } => self.lost(channel),
                SessionCommand::Play { audio, reply } => {
                    let _ = reply.send(playback::start(&mut self.state, audio));
                }
                SessionCommand::Status { reply } => {
                    let _ = reply.send(self.state.snapshot());
                }
                SessionCommand::Shutdown { reply } => {
                    self.state.teardown().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
        self.state.teardown().await;
        info!("voice session actor stopped");
    }

    async fn ensure(&mut self, target: SessionTarget) -> Result<Ready, Unready> {
        self.wait_cooldown(&target).await;

        let migrated = match self.decide(&target) {
            Decision::Reuse => return Ok(Ready::Reused),
            Decision::ProbeFailed(reason) => {
                warn!(channel = %target, "voice session appears invalid ({}), reconnecting", reason);
                self.state.teardown().await;
                false
            }
            Decision::Migrate { from } => {
                info!(from = %from, to = %target, "moving voice session");
                self.state.teardown().await;
                tokio::time::sleep(self.migrate_delay).await;
                true
            }
            Decision::Dead => {
                self.state.teardown().await;
                false
            }
            Decision::Absent => false,
        };

        match self.connect_fresh(target).await {
            Ok(()) if migrated => Ok(Ready::Migrated),
            Ok(()) => Ok(Ready::Connected),
            Err(e) => {
                warn!("voice connection error: {}", e);
                self.state.teardown().await;
                Err(Unready::ConnectFailed(e))
            }
        }
    }

    async fn join(&mut self, target: SessionTarget) -> Result<Ready, ConnectError> {
        self.wait_cooldown(&target).await;
        let migrated = self.state.teardown().await;
        if migrated {
            tokio::time::sleep(self.migrate_delay).await;
        }
        match self.connect_fresh(target).await {
            Ok(()) if migrated => Ok(Ready::Migrated),
            Ok(()) => Ok(Ready::Connected),
            Err(e) => {
                self.state.teardown().await;
                Err(e)
            }
        }
    }

    fn decide(&self, target: &SessionTarget) -> Decision {
        let Some(active) = self.state.active() else {
            return Decision::Absent;
        };
        if !active.is_alive() {
            return Decision::Dead;
        }
        if active.target() != target {
            return Decision::Migrate {
                from: active.target().clone(),
            };
        }
        match active.connection().channel_name() {
            Ok(_) => Decision::Reuse,
            Err(e) => Decision::ProbeFailed(e.to_string()),
        }
    }

    async fn wait_cooldown(&self, target: &SessionTarget) {
        let remaining = self
            .establisher
            .policy()
            .cooldown_remaining(self.state.since_last_disconnect());
        if !remaining.is_zero() {
            info!(channel = %target, ?remaining, "waiting out reconnect cooldown");
            tokio::time::sleep(remaining).await;
        }
    }

    async fn connect_fresh(&mut self, target: SessionTarget) -> Result<(), ConnectError> {
        let connection = self.establisher.connect(&target, &mut self.state).await?;
        self.state.install(connection, target).await;
        Ok(())
    }

    fn lost(&mut self, channel: Option<SessionTarget>) {
        let Some(active) = self.state.active() else {
            return;
        };
        let stale = match &channel {
            Some(lost) => active.target() != lost && active.is_alive(),
            None => false,
        };
        if stale {
            debug!(
                current = %active.target(),
                "ignoring membership loss for a previous voice session"
            );
            return;
        }
        info!("agent was disconnected from voice channel");
        self.state.forget();
    }
}
