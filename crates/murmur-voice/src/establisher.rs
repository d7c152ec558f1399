//! Connection establishment with bounded, classified retries.
//!
//! This is the only place raw connect calls are issued. Each call to
//! [`Establisher::connect`] runs an explicit attempt loop; every failure is
//! classified by [`TransportError::classify`] and either retried after the
//! [`BackoffPolicy`] delay or propagated immediately.

use crate::backoff::BackoffPolicy;
use crate::config::ConnectionConfig;
use crate::error::ConnectError;
use crate::state::ConnectionState;
use crate::transport::{FailureClass, TransportError, VoiceConnection, VoiceTransport};
use murmur_types::SessionTarget;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bookkeeping for one establish call. Dropped when the call returns.
#[derive(Debug, Default)]
struct AttemptRecord {
    /// Index of the next attempt (0-based).
    index: u32,
    /// Classification of the attempt that just failed.
    previous: Option<FailureClass>,
    /// Sum of backoff delays waited so far.
    elapsed_delay: Duration,
    last_error: Option<TransportError>,
}

pub struct Establisher {
    transport: Arc<dyn VoiceTransport>,
    policy: BackoffPolicy,
    connect_timeout: Duration,
    stabilize: Duration,
}

impl Establisher {
    pub fn new(transport: Arc<dyn VoiceTransport>, config: &ConnectionConfig) -> Self {
        Self {
            transport,
            policy: config.backoff(),
            connect_timeout: config.connect_timeout(),
            stabilize: config.stabilize(),
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Connects to `target`, retrying recoverable failures.
    ///
    /// `state` is only touched on an already-connected conflict, where any
    /// stale local handle is force-cleared before the next attempt.
    pub async fn connect(
        &self,
        target: &SessionTarget,
        state: &mut ConnectionState,
    ) -> Result<Box<dyn VoiceConnection>, ConnectError> {
        let mut record = AttemptRecord::default();

        while !self.policy.is_exhausted(record.index) {
            if let Some(previous) = record.previous {
                let delay = self.policy.next_delay(record.index, previous);
                if !delay.is_zero() {
                    debug!(
                        channel = %target,
                        attempt = record.index + 1,
                        previous = previous.label(),
                        ?delay,
                        "backing off before voice connect"
                    );
                    tokio::time::sleep(delay).await;
                    record.elapsed_delay += delay;
                }
            }

            info!(
                channel = %target,
                attempt = record.index + 1,
                "attempting voice connect"
            );

            let err = match self.attempt(target).await {
                Ok(connection) => {
                    info!(
                        channel = %target,
                        attempt = record.index + 1,
                        waited = ?record.elapsed_delay,
                        "voice connect succeeded"
                    );
                    return Ok(connection);
                }
                Err(err) => err,
            };

            let class = err.classify();
            match class {
                FailureClass::UnclassifiedFatal => {
                    error!(
                        channel = %target,
                        attempt = record.index + 1,
                        "unrecoverable voice connect failure: {}",
                        err
                    );
                    return Err(ConnectError::Fatal {
                        channel: target.name.clone(),
                        reason: err.to_string(),
                    });
                }
                FailureClass::AlreadyConnectedConflict => {
                    warn!(
                        channel = %target,
                        attempt = record.index + 1,
                        "transport reports an existing connection, clearing stale state"
                    );
                    state.teardown().await;
                    self.transport.reset().await;
                }
                _ => {
                    warn!(
                        channel = %target,
                        attempt = record.index + 1,
                        class = class.label(),
                        "voice connect failed: {}",
                        err
                    );
                }
            }

            record.previous = Some(class);
            record.last_error = Some(err);
            record.index += 1;
        }

        let last_error = record
            .last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt was made".to_string());
        error!(
            channel = %target,
            attempts = record.index,
            "giving up on voice connect"
        );
        Err(ConnectError::Exhausted {
            channel: target.name.clone(),
            attempts: record.index,
            last_error,
        })
    }

    async fn attempt(
        &self,
        target: &SessionTarget,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        let mut connection =
            match tokio::time::timeout(self.connect_timeout, self.transport.connect(target)).await
            {
                Ok(result) => result?,
                Err(_) => return Err(TransportError::Timeout),
            };

        tokio::time::sleep(self.stabilize).await;
        if connection.is_alive() {
            return Ok(connection);
        }

        warn!(channel = %target, "connect reported success but the session is not alive");
        if let Err(e) = connection.disconnect().await {
            debug!(channel = %target, "disconnecting unstable session: {}", e);
        }
        Err(TransportError::NotAlive)
    }
}
