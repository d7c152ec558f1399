//! Reactions to voice state changes that happen outside the session's control.
//!
//! The observer never touches connection state. It classifies each
//! notification and enqueues the matching instruction on the session actor,
//! so its effects land between, never inside, reconciliation steps.

use crate::error::VoiceError;
use crate::session::{TeardownReason, VoiceSession};
use murmur_types::{CloseCode, FaultNotification, MemberId, MembershipEvent, SessionTarget};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// The member whose messages are spoken. Shared between the event pipeline and
/// the observer; replaced at runtime by the set-target command.
#[derive(Debug, Clone, Default)]
pub struct TrackedMember(Arc<RwLock<Option<MemberId>>>);

impl TrackedMember {
    pub fn new(member: Option<MemberId>) -> Self {
        Self(Arc::new(RwLock::new(member)))
    }

    pub fn get(&self) -> Option<MemberId> {
        self.0.read().ok().and_then(|guard| *guard)
    }

    pub fn set(&self, member: Option<MemberId>) {
        if let Ok(mut guard) = self.0.write() {
            *guard = member;
        }
    }

    pub fn is(&self, member: MemberId) -> bool {
        self.get() == Some(member)
    }
}

/// What a notification asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Reaction {
    /// Nothing relevant changed.
    None,
    /// Tear the session down unconditionally.
    Teardown { reason: TeardownReason },
    /// The agent's own membership is gone; forget the handle.
    Forget {
        channel: Option<SessionTarget>,
    },
}

/// Maps a membership change onto a reaction.
pub fn classify_membership(
    event: &MembershipEvent,
    tracked: Option<MemberId>,
    agent: Option<MemberId>,
) -> Reaction {
    if !event.left_voice() {
        return Reaction::None;
    }
    if tracked == Some(event.member_id) {
        return Reaction::Teardown {
            reason: TeardownReason::TargetLeft,
        };
    }
    if agent == Some(event.member_id) {
        return Reaction::Forget {
            channel: event.previous_channel.clone(),
        };
    }
    Reaction::None
}

/// Whether an out-of-band fault means the voice session can no longer be used.
pub fn fault_indicates_session_invalid(fault: &FaultNotification) -> bool {
    if fault.code == Some(CloseCode::SessionInvalid.as_u16()) {
        return true;
    }
    let detail = fault.detail.to_ascii_lowercase();
    detail.contains("4006") || detail.contains("connectionclosed")
}

/// Forwards external notifications to the session actor.
#[derive(Clone)]
pub struct DisconnectObserver {
    session: VoiceSession,
    tracked: TrackedMember,
    agent: Option<MemberId>,
}

impl DisconnectObserver {
    pub fn new(session: VoiceSession, tracked: TrackedMember, agent: Option<MemberId>) -> Self {
        Self {
            session,
            tracked,
            agent,
        }
    }

    pub async fn on_membership(&self, event: &MembershipEvent) -> Result<Reaction, VoiceError> {
        let reaction = classify_membership(event, self.tracked.get(), self.agent);
        match &reaction {
            Reaction::None => {}
            Reaction::Teardown { reason } => {
                info!(member = %event.member_id, "tracked member left voice, disconnecting");
                self.session.request_teardown(*reason).await?;
            }
            Reaction::Forget { channel } => {
                debug!(member = %event.member_id, "agent lost voice membership");
                self.session.report_lost(channel.clone()).await?;
            }
        }
        Ok(reaction)
    }

    pub async fn on_fault(&self, fault: &FaultNotification) -> Result<Reaction, VoiceError> {
        if !fault_indicates_session_invalid(fault) {
            debug!(event = %fault.event, code = ?fault.code, "ignoring fault notification");
            return Ok(Reaction::None);
        }
        info!(
            event = %fault.event,
            code = ?fault.code,
            "session-invalid fault reported, cleaning up voice connection"
        );
        let reason = TeardownReason::SessionInvalid;
        self.session.request_teardown(reason).await?;
        Ok(Reaction::Teardown { reason })
    }
}
