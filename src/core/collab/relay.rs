//! Broadcast relay
//!
//! Fans one participant's update out to the rest of its session. Every
//! recipient has its own bounded queue and writer task, so a slow socket only
//! ever fills its own queue. A recipient whose queue is full or closed is
//! dropped from the session instead of holding up the sender.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;

use super::protocol::{Outbound, ParticipantId, SessionKey, Update};
use super::registry::SessionRegistry;

/// What happened to one relayed update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Recipients the update was queued for
    pub delivered: usize,
    /// Recipients removed because their queue could not take it
    pub evicted: usize,
}

#[derive(Debug, Clone)]
pub struct BroadcastRelay {
    registry: Arc<SessionRegistry>,
}

impl BroadcastRelay {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `update` to every participant of the session except the sender
    ///
    /// Never fails: a failed delivery turns into a disconnect of that recipient.
    pub fn relay(
        &self,
        session_key: &SessionKey,
        sender: ParticipantId,
        update: Update,
    ) -> RelayOutcome {
        let mut outcome = RelayOutcome::default();

        for recipient in self.registry.participants_of(session_key, Some(sender)) {
            match recipient.try_deliver(Outbound::Update(update.clone())) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    let reason = match e {
                        TrySendError::Full(_) => "outbound queue full",
                        TrySendError::Closed(_) => "connection gone",
                    };
                    tracing::warn!(
                        session_key = %session_key,
                        participant_id = %recipient.id(),
                        reason,
                        "Dropping participant after failed delivery"
                    );

                    self.registry.leave(session_key, recipient.id());
                    recipient.evict();
                    outcome.evicted += 1;
                }
            }
        }

        tracing::trace!(
            session_key = %session_key,
            participant_id = %sender,
            bytes = update.len(),
            delivered = outcome.delivered,
            evicted = outcome.evicted,
            "Relayed update"
        );

        outcome
    }
}
