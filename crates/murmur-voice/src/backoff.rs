//! Retry delays for voice connection attempts.
//!
//! [`BackoffPolicy::next_delay`] is a pure function of the upcoming attempt
//! index and the failure class of the attempt before it:
//!
//! | previous failure             | delay before attempt `n`           |
//! |------------------------------|------------------------------------|
//! | transient timeout            | `min(base × 2^(n-1), cap)`         |
//! | session invalid              | `session_invalid_base + n × step`  |
//! | transport/server failure     | `server_failure_base + n × step`   |
//! | already-connected conflict   | `conflict_delay`                   |
//! | unclassified fatal           | never retried                      |
//!
//! Independently of per-attempt delays, [`BackoffPolicy::cooldown_remaining`]
//! enforces a quiet period after every teardown so that flapping
//! (disconnect immediately followed by reconnect) does not hammer the backend.

use crate::transport::FailureClass;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Connect attempts per establish call.
    pub max_attempts: u32,
    /// First delay for generic transient failures.
    pub base: Duration,
    /// Ceiling for generic transient failures.
    pub cap: Duration,
    pub session_invalid_base: Duration,
    pub session_invalid_step: Duration,
    pub server_failure_base: Duration,
    pub server_failure_step: Duration,
    pub conflict_delay: Duration,
    /// Minimum time between a teardown and the next connect attempt.
    pub cooldown: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        crate::config::ConnectionConfig::default().backoff()
    }
}

impl BackoffPolicy {
    /// Delay to wait before attempt `attempt` (0-indexed) given the class of
    /// the failure that ended the previous attempt.
    ///
    /// The first attempt never waits.
    pub fn next_delay(&self, attempt: u32, previous: FailureClass) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match previous {
            FailureClass::TransientTimeout => self.exponential(attempt),
            FailureClass::SessionInvalid => {
                self.session_invalid_base
                    .saturating_add(self.session_invalid_step.saturating_mul(attempt))
            }
            FailureClass::TransportServerFailure => {
                self.server_failure_base
                    .saturating_add(self.server_failure_step.saturating_mul(attempt))
            }
            FailureClass::AlreadyConnectedConflict => self.conflict_delay,
            FailureClass::UnclassifiedFatal => Duration::ZERO,
        }
    }

    /// Returns `true` once `attempts_made` reaches the attempt bound.
    pub fn is_exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts.max(1)
    }

    /// Remaining cooldown given the time elapsed since the last teardown.
    ///
    /// `None` means no teardown has happened yet.
    pub fn cooldown_remaining(&self, since_last_disconnect: Option<Duration>) -> Duration {
        match since_last_disconnect {
            Some(elapsed) => self.cooldown.saturating_sub(elapsed),
            None => Duration::ZERO,
        }
    }

    fn exponential(&self, attempt: u32) -> Duration {
        let exp = (attempt - 1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * 2f64.powi(exp);
        if !secs.is_finite() || secs < 0.0 || secs > self.cap.as_secs_f64() {
            self.cap
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
