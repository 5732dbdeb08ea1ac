//! Mock client that implements the coordinator's `Transport`
//!
//! Each `send` is one delivery attempt through the `MockEngine`. Replies are
//! classified with the protocol's rules; an unresolvable participant is a
//! transient failure, the same as an unreachable host.

use crate::{Message, MockEngine};
use async_trait::async_trait;
use proven_common::ParticipantId;
use proven_protocol::{DecisionMessage, DeliveryOutcome, ParticipantReply, Transport};
use std::sync::Arc;

/// Mock client for sending decisions through the mock engine
#[derive(Clone)]
pub struct MockClient {
    /// Node ID
    node_id: String,

    /// Reference to the mock engine
    engine: Arc<MockEngine>,
}

impl MockClient {
    /// Create a new mock client
    pub fn new(node_id: String, engine: Arc<MockEngine>) -> Self {
        Self { node_id, engine }
    }

    /// Get the node ID of this client
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Get the engine this client sends through
    pub fn engine(&self) -> &Arc<MockEngine> {
        &self.engine
    }
}

#[async_trait]
impl Transport for MockClient {
    async fn send(
        &self,
        participant: &ParticipantId,
        message: &DecisionMessage,
    ) -> DeliveryOutcome {
        let request = Message::with_headers(message.to_headers())
            .with_header("coordinator_id".to_string(), self.node_id.clone());

        let reply = match self.engine.deliver(participant, request).await {
            Ok(reply) => reply,
            Err(e) => return DeliveryOutcome::Retryable(e.to_string()),
        };

        match ParticipantReply::from_headers(&reply.headers) {
            Ok(reply) => DeliveryOutcome::from(&reply),
            Err(e) => {
                tracing::warn!("Unparseable reply from {}: {}", participant, e);
                DeliveryOutcome::Retryable(e.to_string())
            }
        }
    }
}
