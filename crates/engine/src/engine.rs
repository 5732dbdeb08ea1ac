//! Core mock engine implementation
//!
//! This module provides the in-memory network that participants are reached
//! through: endpoint resolution, scripted replies, per-participant latency
//! and a log of every request that arrived.

use crate::{Message, MockEngineError, Result};
use parking_lot::Mutex;
use proven_common::ParticipantId;
use proven_protocol::{DecisionMessage, ParticipantReply};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A request that reached a participant endpoint
#[derive(Debug, Clone)]
pub struct DeliveredRequest {
    pub participant: ParticipantId,
    pub endpoint: String,
    pub message: Message,
    pub reply: ParticipantReply,
}

impl DeliveredRequest {
    /// Decode the decision carried by this request
    pub fn decision(&self) -> Option<DecisionMessage> {
        DecisionMessage::from_headers(&self.message.headers).ok()
    }

    pub fn is_commit(&self) -> bool {
        self.decision().is_some_and(|d| d.command.is_commit())
    }

    pub fn is_abort(&self) -> bool {
        self.decision().is_some_and(|d| !d.command.is_commit())
    }
}

/// Mock engine that simulates the participant network
pub struct MockEngine {
    /// Participant to endpoint mapping
    endpoints: Arc<Mutex<HashMap<ParticipantId, String>>>,

    /// Replies queued per participant, consumed in order (default: Ok)
    scripted_replies: Arc<Mutex<HashMap<ParticipantId, VecDeque<ParticipantReply>>>>,

    /// Artificial delivery latency per participant
    latencies: Arc<Mutex<HashMap<ParticipantId, Duration>>>,

    /// Every request that reached an endpoint, in arrival order
    requests: Arc<Mutex<Vec<DeliveredRequest>>>,

    /// Woken whenever a request is logged
    request_notify: Arc<Notify>,
}

impl MockEngine {
    /// Create a new mock engine
    pub fn new() -> Self {
        Self {
            endpoints: Arc::new(Mutex::new(HashMap::new())),
            scripted_replies: Arc::new(Mutex::new(HashMap::new())),
            latencies: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            request_notify: Arc::new(Notify::new()),
        }
    }

    /// Register a participant and return its endpoint
    pub fn register_participant(&self, participant: impl Into<ParticipantId>) -> String {
        let participant = participant.into();
        let endpoint = format!("{}:123", participant);
        self.endpoints
            .lock()
            .insert(participant, endpoint.clone());
        endpoint
    }

    /// Remove a participant's endpoint, making it unreachable
    pub fn unregister_participant(&self, participant: &ParticipantId) {
        self.endpoints.lock().remove(participant);
    }

    /// Resolve a participant to its endpoint
    pub fn resolve(&self, participant: &ParticipantId) -> Option<String> {
        self.endpoints.lock().get(participant).cloned()
    }

    /// Queue the reply for the next request to `participant`
    pub fn script_reply(&self, participant: impl Into<ParticipantId>, reply: ParticipantReply) {
        self.scripted_replies
            .lock()
            .entry(participant.into())
            .or_default()
            .push_back(reply);
    }

    /// Delay every delivery to `participant`
    pub fn set_latency(&self, participant: impl Into<ParticipantId>, latency: Duration) {
        self.latencies.lock().insert(participant.into(), latency);
    }

    /// Deliver a message to a participant endpoint and return its reply
    pub async fn deliver(&self, participant: &ParticipantId, message: Message) -> Result<Message> {
        let endpoint = self
            .resolve(participant)
            .ok_or_else(|| MockEngineError::ParticipantNotFound(participant.to_string()))?;

        let latency = self.latencies.lock().get(participant).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let reply = self
            .scripted_replies
            .lock()
            .get_mut(participant)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ParticipantReply::Ok);

        tracing::debug!(
            "Participant {} at {} received {:?}, replying {:?}",
            participant,
            endpoint,
            message.get_header("txn_phase"),
            reply
        );

        self.requests.lock().push(DeliveredRequest {
            participant: participant.clone(),
            endpoint,
            message,
            reply: reply.clone(),
        });
        self.request_notify.notify_waiters();

        Ok(Message::with_headers(reply.to_headers()))
    }

    /// Snapshot of every request logged so far
    pub fn requests(&self) -> Vec<DeliveredRequest> {
        self.requests.lock().clone()
    }

    /// Requests that reached one participant
    pub fn requests_to(&self, participant: &ParticipantId) -> Vec<DeliveredRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| &r.participant == participant)
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Wait until at least `count` requests have been logged
    pub async fn wait_for_requests(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<DeliveredRequest>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking to avoid a lost wakeup
            let notified = self.request_notify.notified();

            {
                let requests = self.requests.lock();
                if requests.len() >= count {
                    return Ok(requests.clone());
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(MockEngineError::Timeout {
                    expected: count,
                    received: self.request_count(),
                });
            }
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}
