//! The single record describing the agent's voice session.
//!
//! The connection handle and the channel it is connected to live together in
//! [`ActiveConnection`], so a target can never outlive its handle. Liveness is
//! never cached: every query goes to the transport.

use crate::transport::VoiceConnection;
use chrono::{DateTime, Utc};
use murmur_types::SessionTarget;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// A connection handle together with the channel it was opened for.
pub struct ActiveConnection {
    connection: Box<dyn VoiceConnection>,
    target: SessionTarget,
    session_id: Uuid,
    connected_at: DateTime<Utc>,
}

impl ActiveConnection {
    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn is_alive(&self) -> bool {
        self.connection.is_alive()
    }

    pub fn connection(&self) -> &dyn VoiceConnection {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> &mut dyn VoiceConnection {
        self.connection.as_mut()
    }
}

/// Point-in-time view of the connection state, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    /// A handle is present and alive.
    pub connected: bool,
    /// A handle is recorded, alive or not.
    pub has_handle: bool,
    pub channel: Option<SessionTarget>,
    pub playing: bool,
    pub session_id: Option<Uuid>,
    pub connected_since: Option<DateTime<Utc>>,
    pub since_last_disconnect_ms: Option<u64>,
    pub teardowns: u64,
}

#[derive(Default)]
pub struct ConnectionState {
    active: Option<ActiveConnection>,
    last_disconnect: Option<Instant>,
    teardowns: u64,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveConnection> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveConnection> {
        self.active.as_mut()
    }

    pub fn has_handle(&self) -> bool {
        self.active.is_some()
    }

    /// The connected channel, only while the handle is present and alive.
    pub fn live_target(&self) -> Option<&SessionTarget> {
        self.active
            .as_ref()
            .filter(|active| active.is_alive())
            .map(ActiveConnection::target)
    }

    pub fn is_connected_to(&self, target: &SessionTarget) -> bool {
        self.live_target() == Some(target)
    }

    /// Time since the most recent teardown, if any.
    pub fn since_last_disconnect(&self) -> Option<Duration> {
        self.last_disconnect.map(|at| at.elapsed())
    }

    pub fn last_disconnect(&self) -> Option<Instant> {
        self.last_disconnect
    }

    /// Number of times a recorded handle has been cleared.
    pub fn teardowns(&self) -> u64 {
        self.teardowns
    }

    /// Installs a freshly established connection.
    ///
    /// Any handle still recorded is torn down first, so at most one handle is
    /// ever held.
    pub async fn install(
        &mut self,
        connection: Box<dyn VoiceConnection>,
        target: SessionTarget,
    ) -> Uuid {
        if self.active.is_some() {
            warn!("installing a voice connection over an existing handle");
            self.teardown().await;
        }
        let session_id = Uuid::new_v4();
        info!(channel = %target, %session_id, "voice session installed");
        self.active = Some(ActiveConnection {
            connection,
            target,
            session_id,
            connected_at: Utc::now(),
        });
        session_id
    }

    /// Disconnects and clears the recorded handle.
    ///
    /// Returns `false` without touching anything when no handle is recorded.
    /// Disconnect failures are logged; the handle is cleared regardless.
    pub async fn teardown(&mut self) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };
        if active.is_alive() {
            if let Err(e) = active.connection.disconnect().await {
                warn!(channel = %active.target, "error during voice disconnect: {}", e);
            }
        }
        info!(channel = %active.target, session_id = %active.session_id, "voice session torn down");
        self.mark_cleared();
        true
    }

    /// Clears the recorded handle without calling disconnect.
    ///
    /// Used when the transport is already gone. Returns `false` when no handle
    /// was recorded.
    pub fn forget(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        info!(channel = %active.target, session_id = %active.session_id, "voice session forgotten");
        self.mark_cleared();
        true
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let active = self.active.as_ref();
        ConnectionSnapshot {
            connected: self.live_target().is_some(),
            has_handle: active.is_some(),
            channel: self.live_target().cloned(),
            playing: active.is_some_and(|a| a.is_alive() && a.connection.is_playing()),
            session_id: active.map(ActiveConnection::session_id),
            connected_since: active.map(ActiveConnection::connected_at),
            since_last_disconnect_ms: self
                .since_last_disconnect()
                .map(|d| d.as_millis().min(u64::MAX as u128) as u64),
            teardowns: self.teardowns,
        }
    }

    fn mark_cleared(&mut self) {
        self.last_disconnect = Some(Instant::now());
        self.teardowns += 1;
    }
}
