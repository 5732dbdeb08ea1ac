//! Messaging collaborator seam

use crate::messages::DecisionMessage;
use crate::responses::DeliveryOutcome;
use async_trait::async_trait;
use proven_common::ParticipantId;

/// Delivers decision messages to participants.
///
/// Implementations own endpoint resolution, connection handling and the
/// classification of raw replies into a `DeliveryOutcome`. A single call is
/// one delivery attempt; retrying is the caller's job.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, participant: &ParticipantId, message: &DecisionMessage)
    -> DeliveryOutcome;
}
