//! Per-transaction two-phase-commit state machine
//!
//! A `TransactionCoordinator` consumes votes and the participant set,
//! fixes the commit/abort decision once, publishes it to every waiter and
//! hands the resulting instructions to the dispatcher. It performs no I/O
//! itself and never blocks; all sends run on dispatcher tasks.

use crate::decision::{CommitDecision, Decision, DecisionFuture, DecisionPublisher};
use crate::dispatcher::{DecisionDispatcher, DeliveryTable};
use crate::error::{CoordinatorError, Result};
use crate::ledger::{RecordOutcome, Vote, VoteLedger};
use proven_common::{ParticipantId, Timestamp, TransactionKey};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Participant set not yet supplied
    AwaitingParticipants,
    /// Participant set known, decision pending
    AwaitingVotes,
    /// Decision fixed, some instructions not yet settled
    Decided(CommitDecision),
    /// Decision fixed and every known participant has been messaged
    Complete(CommitDecision),
}

/// Decision engine for one transaction
pub struct TransactionCoordinator {
    /// Transaction this coordinator decides
    key: TransactionKey,

    /// Distinguishes this instance from earlier ones with the same key
    generation: u64,

    /// Addressees, unknown until first supplied
    participants: Option<BTreeSet<ParticipantId>>,

    /// Votes received so far
    ledger: VoteLedger,

    /// Participants that voted abort; they are never messaged
    aborted_locally: BTreeSet<ParticipantId>,

    decision: Decision,
    publisher: DecisionPublisher,
    future: DecisionFuture,

    /// Acknowledgment table shared with dispatcher tasks
    deliveries: Arc<DeliveryTable>,
    dispatcher: DecisionDispatcher,

    /// Time after which an undecided transaction aborts
    deadline: Instant,
    deadline_task: Option<JoinHandle<()>>,
}

impl TransactionCoordinator {
    pub fn new(
        key: TransactionKey,
        generation: u64,
        deadline: Instant,
        dispatcher: DecisionDispatcher,
        deliveries: Arc<DeliveryTable>,
    ) -> Self {
        let (publisher, future) = DecisionPublisher::new();
        Self {
            key,
            generation,
            participants: None,
            ledger: VoteLedger::new(),
            aborted_locally: BTreeSet::new(),
            decision: Decision::Undecided,
            publisher,
            future,
            deliveries,
            dispatcher,
            deadline,
            deadline_task: None,
        }
    }

    pub fn key(&self) -> TransactionKey {
        self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn participants(&self) -> Option<&BTreeSet<ParticipantId>> {
        self.participants.as_ref()
    }

    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    pub fn deliveries(&self) -> &Arc<DeliveryTable> {
        &self.deliveries
    }

    /// Attach the timer task that calls [`Self::on_deadline`]; aborted on drop
    pub(crate) fn set_deadline_task(&mut self, task: JoinHandle<()>) {
        if let Some(previous) = self.deadline_task.replace(task) {
            previous.abort();
        }
    }

    /// The shared decision future; every call returns a handle on the same value
    pub fn decision_future(&self) -> DecisionFuture {
        self.future.clone()
    }

    pub fn state(&self) -> CoordinatorState {
        match self.decision {
            Decision::Decided(decision) if self.is_complete() => {
                CoordinatorState::Complete(decision)
            }
            Decision::Decided(decision) => CoordinatorState::Decided(decision),
            Decision::Undecided if self.participants.is_some() => CoordinatorState::AwaitingVotes,
            Decision::Undecided => CoordinatorState::AwaitingParticipants,
        }
    }

    /// Decided, every owed participant messaged and every delivery settled
    pub fn is_complete(&self) -> bool {
        self.decision.is_decided()
            && self.owed().iter().all(|p| self.deliveries.contains(p))
            && self.deliveries.all_settled()
    }

    /// Supply the participant set
    ///
    /// Commit votes that arrived earlier are evaluated against it. If the
    /// decision is already fixed, newly learned participants receive it.
    pub fn set_participants(&mut self, participants: BTreeSet<ParticipantId>) -> Result<()> {
        if let Some(existing) = &self.participants {
            if *existing == participants {
                return Ok(());
            }
            tracing::warn!(
                "Rejecting participant set {:?} for {}; already {:?}",
                participants,
                self.key,
                existing
            );
            return Err(CoordinatorError::ParticipantSetMismatch {
                key: self.key,
                expected: existing.clone(),
                actual: participants,
            });
        }

        tracing::debug!("Participants for {}: {:?}", self.key, participants);
        self.participants = Some(participants);

        match self.decision {
            Decision::Undecided => self.try_commit(),
            Decision::Decided(_) => self.dispatch_owed(),
        }
        Ok(())
    }

    /// Record a commit vote
    pub fn record_commit_vote(&mut self, participant: &ParticipantId, prepare_timestamp: Timestamp) {
        let outcome = self
            .ledger
            .record(participant, Vote::Commit { prepare_timestamp });

        if let RecordOutcome::Conflict { existing } = outcome {
            tracing::warn!(
                "Ignoring commit vote from {} for {} at {}; already voted {:?}",
                participant,
                self.key,
                prepare_timestamp,
                existing
            );
        }

        match self.decision {
            Decision::Undecided => self.try_commit(),
            Decision::Decided(decision) => {
                if self.aborted_locally.contains(participant) {
                    return;
                }
                // The commit timestamp only covers the participant set
                if decision.is_commit() && !self.is_addressee(participant) {
                    tracing::warn!(
                        "Commit vote from {} outside participant set of {}; not sending commit",
                        participant,
                        self.key
                    );
                    return;
                }
                if self.deliveries.contains(participant) {
                    self.dispatcher
                        .redrive(&self.deliveries, self.key, participant);
                } else {
                    // Prepared after the decision was fixed (or unknown when
                    // it was): it must learn the outcome
                    self.dispatcher.send(
                        &self.deliveries,
                        self.key,
                        participant,
                        decision.command(),
                    );
                }
            }
        }
    }

    /// Record an abort vote
    ///
    /// One abort vote is enough to decide abort. Every other participant that
    /// may hold prepared state is told to roll back; the voter is not.
    pub fn record_abort_vote(&mut self, participant: &ParticipantId) {
        let outcome = self.ledger.record(participant, Vote::Abort);
        if let RecordOutcome::Conflict { existing } = outcome {
            tracing::warn!(
                "Abort vote from {} for {} after {:?}",
                participant,
                self.key,
                existing
            );
        }

        if self.decision.is_decided() {
            // Still never messaged, even if the participant set arrives later
            if !matches!(outcome, RecordOutcome::Conflict { .. }) {
                self.aborted_locally.insert(participant.clone());
            }
            return;
        }

        self.aborted_locally.insert(participant.clone());
        tracing::debug!("{} voted abort for {}", participant, self.key);
        self.decide(CommitDecision::Abort);
    }

    /// Force abort if the deadline passed without a decision
    pub fn on_deadline(&mut self) {
        if self.decision.is_decided() {
            return;
        }
        tracing::info!("Deadline expired for {} without decision", self.key);
        self.decide(CommitDecision::Abort);
    }

    fn try_commit(&mut self) {
        let Some(participants) = &self.participants else {
            return;
        };
        if let Some(commit_timestamp) = self.ledger.unanimous_commit(participants) {
            self.decide(CommitDecision::Commit(commit_timestamp));
        }
    }

    fn decide(&mut self, decision: CommitDecision) {
        debug_assert!(!self.decision.is_decided());
        self.decision = Decision::Decided(decision);
        self.publisher.publish(decision);
        tracing::info!("Decided {} for {}", decision, self.key);
        self.dispatch_owed();
    }

    /// Send the decision to every owed participant not yet messaged
    fn dispatch_owed(&self) {
        let Decision::Decided(decision) = self.decision else {
            return;
        };
        let command = decision.command();
        for participant in self.owed() {
            self.dispatcher
                .send(&self.deliveries, self.key, &participant, command);
        }
    }

    fn is_addressee(&self, participant: &ParticipantId) -> bool {
        self.participants
            .as_ref()
            .is_some_and(|set| set.contains(participant))
    }

    /// Known participants that must learn the decision, minus those who
    /// voted abort. An abort reaches every commit voter; a commit reaches
    /// only the participant set, whose prepare timestamps it covers.
    fn owed(&self) -> BTreeSet<ParticipantId> {
        let commit_voters = match self.decision {
            Decision::Decided(CommitDecision::Commit(_)) => None,
            _ => Some(self.ledger.commit_voters()),
        };
        self.participants
            .iter()
            .flatten()
            .chain(commit_voters.into_iter().flatten())
            .filter(|p| !self.aborted_locally.contains(*p))
            .cloned()
            .collect()
    }
}

impl Drop for TransactionCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.deadline_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::dispatcher::DeliveryState;
    use proven_common::{SessionId, TxnNumber};
    use proven_engine::{MockClient, MockEngine};
    use proven_protocol::{DecisionCommand, ParticipantReply};
    use std::time::Duration;

    struct Harness {
        engine: Arc<MockEngine>,
        coordinator: TransactionCoordinator,
    }

    fn harness() -> Harness {
        let engine = Arc::new(MockEngine::new());
        for name in ["s1", "s2", "s3"] {
            engine.register_participant(name);
        }
        let client = MockClient::new("coord".to_string(), engine.clone());
        let dispatcher = DecisionDispatcher::new(Arc::new(client), RetryPolicy::Redrive);
        let coordinator = TransactionCoordinator::new(
            TransactionKey::new(SessionId::new(), TxnNumber::new(1)),
            0,
            Instant::now() + Duration::from_secs(60),
            dispatcher,
            Arc::new(DeliveryTable::new()),
        );
        Harness {
            engine,
            coordinator,
        }
    }

    fn p(name: &str) -> ParticipantId {
        ParticipantId::from(name)
    }

    fn set(names: &[&str]) -> BTreeSet<ParticipantId> {
        names.iter().map(|n| p(n)).collect()
    }

    fn ts(physical: u64) -> Timestamp {
        Timestamp::from_micros(physical)
    }

    fn addressed(requests: &[proven_engine::DeliveredRequest]) -> Vec<ParticipantId> {
        let mut participants: Vec<_> = requests.iter().map(|r| r.participant.clone()).collect();
        participants.sort();
        participants
    }

    async fn settle(coordinator: &TransactionCoordinator) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.deliveries().any_in_flight() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_state_progression_to_commit() {
        let mut h = harness();
        assert_eq!(
            h.coordinator.state(),
            CoordinatorState::AwaitingParticipants
        );

        h.coordinator.set_participants(set(&["s1", "s2"])).unwrap();
        assert_eq!(h.coordinator.state(), CoordinatorState::AwaitingVotes);

        h.coordinator.record_commit_vote(&p("s1"), ts(10));
        assert!(!h.coordinator.decision_future().is_ready());

        h.coordinator.record_commit_vote(&p("s2"), ts(20));
        let expected = CommitDecision::Commit(ts(20));
        assert_eq!(h.coordinator.decision_future().peek(), Some(expected));

        settle(&h.coordinator).await;
        assert_eq!(h.coordinator.state(), CoordinatorState::Complete(expected));

        let requests = h.engine.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert_eq!(
                request.decision().map(|d| d.command),
                Some(DecisionCommand::Commit {
                    commit_timestamp: ts(20)
                })
            );
        }
    }

    #[tokio::test]
    async fn test_buffered_votes_replayed_when_participants_arrive() {
        let mut h = harness();
        h.coordinator.record_commit_vote(&p("s2"), ts(5));
        h.coordinator.record_commit_vote(&p("s1"), ts(8));
        assert!(!h.coordinator.decision().is_decided());
        assert!(h.coordinator.deliveries().is_empty());

        h.coordinator.set_participants(set(&["s1", "s2"])).unwrap();
        assert_eq!(
            h.coordinator.decision(),
            Decision::Decided(CommitDecision::Commit(ts(8)))
        );
    }

    #[tokio::test]
    async fn test_abort_vote_decides_and_skips_voter() {
        let mut h = harness();
        h.coordinator
            .set_participants(set(&["s1", "s2", "s3"]))
            .unwrap();
        h.coordinator.record_commit_vote(&p("s1"), ts(1));
        h.coordinator.record_abort_vote(&p("s2"));

        assert_eq!(
            h.coordinator.decision(),
            Decision::Decided(CommitDecision::Abort)
        );
        settle(&h.coordinator).await;

        let mut addressed: Vec<_> = h
            .engine
            .requests()
            .into_iter()
            .inspect(|r| assert!(r.is_abort()))
            .map(|r| r.participant)
            .collect();
        addressed.sort();
        assert_eq!(addressed, vec![p("s1"), p("s3")]);

        // A later abort vote changes nothing
        h.coordinator.record_abort_vote(&p("s3"));
        settle(&h.coordinator).await;
        assert_eq!(h.engine.request_count(), 2);
    }

    #[tokio::test]
    async fn test_decision_never_changes() {
        let mut h = harness();
        h.coordinator.set_participants(set(&["s1"])).unwrap();
        h.coordinator.record_commit_vote(&p("s1"), ts(3));
        let decided = h.coordinator.decision();

        h.coordinator.record_abort_vote(&p("s1"));
        h.coordinator.on_deadline();
        assert_eq!(h.coordinator.decision(), decided);
        assert_eq!(
            h.coordinator.decision_future().peek(),
            Some(CommitDecision::Commit(ts(3)))
        );
    }

    #[tokio::test]
    async fn test_late_commit_vote_after_abort_gets_abort() {
        let mut h = harness();
        h.coordinator.record_abort_vote(&p("s1"));
        assert!(h.coordinator.is_complete());

        h.coordinator.record_commit_vote(&p("s2"), ts(4));
        settle(&h.coordinator).await;

        let requests = h.engine.requests_to(&p("s2"));
        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_abort());
        assert!(h.engine.requests_to(&p("s1")).is_empty());
    }

    #[tokio::test]
    async fn test_participants_learned_after_abort_are_told() {
        let mut h = harness();
        h.coordinator.record_abort_vote(&p("s1"));
        h.coordinator
            .set_participants(set(&["s1", "s2", "s3"]))
            .unwrap();
        settle(&h.coordinator).await;

        let mut addressed: Vec<_> = h
            .engine
            .requests()
            .into_iter()
            .map(|r| r.participant)
            .collect();
        addressed.sort();
        assert_eq!(addressed, vec![p("s2"), p("s3")]);
    }

    #[tokio::test]
    async fn test_participant_set_mismatch_is_rejected() {
        let mut h = harness();
        h.coordinator.set_participants(set(&["s1", "s2"])).unwrap();
        h.coordinator.set_participants(set(&["s2", "s1"])).unwrap();

        let err = h
            .coordinator
            .set_participants(set(&["s1"]))
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::ParticipantSetMismatch { .. }
        ));
        assert_eq!(h.coordinator.participants(), Some(&set(&["s1", "s2"])));
    }

    #[tokio::test]
    async fn test_duplicate_vote_redrives_only_failed_delivery() {
        let mut h = harness();
        h.engine
            .script_reply("s1", ParticipantReply::HostUnreachable);
        h.coordinator.set_participants(set(&["s1", "s2"])).unwrap();
        h.coordinator.record_commit_vote(&p("s1"), ts(1));
        h.coordinator.record_commit_vote(&p("s2"), ts(2));
        settle(&h.coordinator).await;

        assert_eq!(
            h.coordinator.deliveries().state(&p("s1")),
            Some(DeliveryState::AwaitingRedrive)
        );
        assert!(!h.coordinator.is_complete());

        // Acknowledged participant: no-op
        h.coordinator.record_commit_vote(&p("s2"), ts(2));
        // Failed participant: one more attempt
        h.coordinator.record_commit_vote(&p("s1"), ts(1));
        settle(&h.coordinator).await;

        assert_eq!(h.engine.requests_to(&p("s1")).len(), 2);
        assert_eq!(h.engine.requests_to(&p("s2")).len(), 1);
        assert!(h.coordinator.is_complete());
    }

    #[tokio::test]
    async fn test_commit_skips_voters_outside_participant_set() {
        let mut h = harness();
        h.coordinator.record_commit_vote(&p("s3"), ts(100));
        h.coordinator.set_participants(set(&["s1", "s2"])).unwrap();
        h.coordinator.record_commit_vote(&p("s1"), ts(10));
        h.coordinator.record_commit_vote(&p("s2"), ts(20));

        assert_eq!(
            h.coordinator.decision(),
            Decision::Decided(CommitDecision::Commit(ts(20)))
        );
        settle(&h.coordinator).await;
        assert!(h.coordinator.is_complete());

        // A commit at 20 would land before s3's prepare point
        h.coordinator.record_commit_vote(&p("s3"), ts(100));
        settle(&h.coordinator).await;
        assert!(h.engine.requests_to(&p("s3")).is_empty());
        assert_eq!(
            addressed(&h.engine.requests()),
            vec![p("s1"), p("s2")]
        );
    }

    #[tokio::test]
    async fn test_abort_voter_after_decision_is_never_messaged() {
        let mut h = harness();
        h.engine
            .script_reply("s3", ParticipantReply::HostUnreachable);
        h.coordinator.record_commit_vote(&p("s3"), ts(1));
        h.coordinator.record_abort_vote(&p("s1"));
        settle(&h.coordinator).await;
        assert_eq!(
            h.coordinator.deliveries().state(&p("s3")),
            Some(DeliveryState::AwaitingRedrive)
        );

        // Already decided: recorded, but no side effects
        h.coordinator.record_abort_vote(&p("s2"));
        h.coordinator
            .set_participants(set(&["s1", "s2", "s3"]))
            .unwrap();
        settle(&h.coordinator).await;

        assert!(h.engine.requests_to(&p("s1")).is_empty());
        assert!(h.engine.requests_to(&p("s2")).is_empty());
        assert_eq!(h.engine.requests_to(&p("s3")).len(), 1);
    }

    #[tokio::test]
    async fn test_deadline_forces_abort_to_known_participants() {
        let mut h = harness();
        h.coordinator.set_participants(set(&["s1", "s2"])).unwrap();
        h.coordinator.record_commit_vote(&p("s1"), ts(1));

        h.coordinator.on_deadline();
        assert_eq!(
            h.coordinator.decision_future().peek(),
            Some(CommitDecision::Abort)
        );
        settle(&h.coordinator).await;

        let requests = h.engine.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.is_abort()));
    }
}
