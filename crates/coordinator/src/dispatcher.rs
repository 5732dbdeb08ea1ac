//! Decision delivery with per-participant retry
//!
//! Every delivery runs on its own task so a slow or unreachable participant
//! never holds up another. The `DeliveryTable` is the acknowledgment table a
//! coordinator keeps: it pins the one instruction each participant gets and
//! tracks whether another attempt is still owed.

use crate::config::RetryPolicy;
use parking_lot::Mutex;
use proven_common::{ParticipantId, TransactionKey};
use proven_protocol::{DecisionCommand, DecisionMessage, DeliveryOutcome, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Called after a delivery in a table settles
pub type SettleHook = Arc<dyn Fn() + Send + Sync>;

/// Delivery progress for one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// An attempt (or a backoff retry loop) is running
    InFlight,
    /// Last attempt failed transiently; waiting for the participant to vote again
    AwaitingRedrive,
    /// Participant applied the decision
    Acknowledged,
    /// Participant gave a non-retryable reply; nothing more is owed
    Satisfied,
}

impl DeliveryState {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Acknowledged | Self::Satisfied)
    }
}

#[derive(Debug, Clone, Copy)]
struct Delivery {
    command: DecisionCommand,
    state: DeliveryState,
    attempts: u32,
}

/// Acknowledgment table for one transaction
#[derive(Default)]
pub struct DeliveryTable {
    deliveries: Mutex<HashMap<ParticipantId, Delivery>>,
    on_settled: Option<SettleHook>,
}

impl DeliveryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settle_hook(hook: SettleHook) -> Self {
        Self {
            deliveries: Mutex::new(HashMap::new()),
            on_settled: Some(hook),
        }
    }

    pub fn state(&self, participant: &ParticipantId) -> Option<DeliveryState> {
        self.deliveries.lock().get(participant).map(|d| d.state)
    }

    /// The instruction pinned for a participant
    pub fn command(&self, participant: &ParticipantId) -> Option<DecisionCommand> {
        self.deliveries.lock().get(participant).map(|d| d.command)
    }

    /// Number of delivery attempts started for a participant
    pub fn attempts(&self, participant: &ParticipantId) -> u32 {
        self.deliveries
            .lock()
            .get(participant)
            .map_or(0, |d| d.attempts)
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.deliveries.lock().contains_key(participant)
    }

    pub fn all_settled(&self) -> bool {
        self.deliveries.lock().values().all(|d| d.state.is_settled())
    }

    /// Whether any attempt is still running
    pub fn any_in_flight(&self) -> bool {
        self.deliveries
            .lock()
            .values()
            .any(|d| d.state == DeliveryState::InFlight)
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.lock().is_empty()
    }

    /// Claim a first delivery. Returns false if the participant already has one.
    fn claim_new(&self, participant: &ParticipantId, command: DecisionCommand) -> bool {
        let mut deliveries = self.deliveries.lock();
        if deliveries.contains_key(participant) {
            return false;
        }
        deliveries.insert(
            participant.clone(),
            Delivery {
                command,
                state: DeliveryState::InFlight,
                attempts: 1,
            },
        );
        true
    }

    /// Claim a redelivery of the pinned instruction, only if one is owed
    fn claim_redrive(&self, participant: &ParticipantId) -> Option<DecisionCommand> {
        let mut deliveries = self.deliveries.lock();
        let delivery = deliveries.get_mut(participant)?;
        if delivery.state != DeliveryState::AwaitingRedrive {
            return None;
        }
        delivery.state = DeliveryState::InFlight;
        delivery.attempts += 1;
        Some(delivery.command)
    }

    fn record_retry(&self, participant: &ParticipantId) {
        if let Some(delivery) = self.deliveries.lock().get_mut(participant) {
            delivery.attempts += 1;
        }
    }

    fn finish(&self, participant: &ParticipantId, state: DeliveryState) {
        if let Some(delivery) = self.deliveries.lock().get_mut(participant) {
            delivery.state = state;
        }

        if state.is_settled()
            && let Some(hook) = &self.on_settled
        {
            hook();
        }
    }
}

/// Sends decision instructions to participants
#[derive(Clone)]
pub struct DecisionDispatcher {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl DecisionDispatcher {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Start delivering `command` to a participant that has not been sent
    /// anything yet. Returns false (and sends nothing) otherwise.
    pub fn send(
        &self,
        table: &Arc<DeliveryTable>,
        key: TransactionKey,
        participant: &ParticipantId,
        command: DecisionCommand,
    ) -> bool {
        if !table.claim_new(participant, command) {
            return false;
        }
        self.spawn_tracked(table, key, participant, command);
        true
    }

    /// Resend the pinned instruction if the last attempt failed transiently
    /// and nothing is in flight. Returns whether an attempt was started.
    pub fn redrive(
        &self,
        table: &Arc<DeliveryTable>,
        key: TransactionKey,
        participant: &ParticipantId,
    ) -> bool {
        let Some(command) = table.claim_redrive(participant) else {
            return false;
        };
        tracing::debug!("Redriving {} to {} for {}", command, participant, key);
        self.spawn_tracked(table, key, participant, command);
        true
    }

    /// Deliver without any coordinator state behind it
    pub fn send_direct(
        &self,
        key: TransactionKey,
        participant: &ParticipantId,
        command: DecisionCommand,
    ) -> JoinHandle<DeliveryState> {
        let transport = self.transport.clone();
        let retry = self.retry.clone();
        let participant = participant.clone();
        let message = DecisionMessage::new(key, command);

        tokio::spawn(async move {
            deliver(transport.as_ref(), &retry, &participant, &message, || {}).await
        })
    }

    fn spawn_tracked(
        &self,
        table: &Arc<DeliveryTable>,
        key: TransactionKey,
        participant: &ParticipantId,
        command: DecisionCommand,
    ) {
        let transport = self.transport.clone();
        let retry = self.retry.clone();
        let table = table.clone();
        let participant = participant.clone();
        let message = DecisionMessage::new(key, command);

        tokio::spawn(async move {
            let state = deliver(transport.as_ref(), &retry, &participant, &message, || {
                table.record_retry(&participant)
            })
            .await;
            table.finish(&participant, state);
        });
    }
}

/// Attempt delivery until settled, or until a transient failure under
/// `RetryPolicy::Redrive`.
async fn deliver(
    transport: &dyn Transport,
    retry: &RetryPolicy,
    participant: &ParticipantId,
    message: &DecisionMessage,
    on_retry: impl Fn(),
) -> DeliveryState {
    let mut backoff = None;
    loop {
        match transport.send(participant, message).await {
            DeliveryOutcome::Acknowledged => {
                tracing::debug!(
                    "{} acknowledged {} for {}",
                    participant,
                    message.command,
                    message.key
                );
                return DeliveryState::Acknowledged;
            }
            DeliveryOutcome::Terminal(reason) => {
                tracing::debug!(
                    "{} gave final reply to {} for {}: {}",
                    participant,
                    message.command,
                    message.key,
                    reason
                );
                return DeliveryState::Satisfied;
            }
            DeliveryOutcome::Retryable(reason) => {
                tracing::warn!(
                    "Failed to deliver {} to {} for {}: {}",
                    message.command,
                    participant,
                    message.key,
                    reason
                );
                let Some(delay) = retry.next_backoff(backoff) else {
                    return DeliveryState::AwaitingRedrive;
                };
                backoff = Some(delay);
                tokio::time::sleep(delay).await;
                on_retry();
            }
        }
    }
}
