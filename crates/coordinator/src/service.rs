//! Coordinator registry
//!
//! Owns every live `TransactionCoordinator`, routes votes and commit
//! requests to them and erases them once complete. Coordinators are grouped
//! by session in a `DashMap`, so everything that happens to one transaction
//! runs under its session's shard lock.

use crate::config::{CoordinatorConfig, SupersessionPolicy};
use crate::coordinator::{CoordinatorState, TransactionCoordinator};
use crate::decision::{CommitDecision, DecisionFuture};
use crate::dispatcher::{DecisionDispatcher, DeliveryState, DeliveryTable, SettleHook};
use crate::error::{CoordinatorError, Result};
use dashmap::DashMap;
use proven_common::{ParticipantId, SessionId, Timestamp, TransactionKey, TxnNumber};
use proven_protocol::{DecisionCommand, Transport};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::time::Instant;

/// Live coordinators of one session, by transaction number
type SessionCoordinators = BTreeMap<TxnNumber, TransactionCoordinator>;

struct ServiceInner {
    sessions: DashMap<SessionId, SessionCoordinators>,
    dispatcher: DecisionDispatcher,
    config: CoordinatorConfig,
    next_generation: AtomicU64,
}

impl ServiceInner {
    /// Run `f` against a live coordinator, erasing it afterwards if complete
    fn with_coordinator<R>(
        &self,
        key: &TransactionKey,
        f: impl FnOnce(&mut TransactionCoordinator) -> R,
    ) -> Option<R> {
        let mut session = self.sessions.get_mut(&key.session)?;
        let coordinator = session.get_mut(&key.txn_number)?;

        let result = f(coordinator);
        let complete = coordinator.is_complete();
        if complete {
            session.remove(&key.txn_number);
            tracing::debug!("Removed completed coordinator for {}", key);
        }

        let empty = session.is_empty();
        drop(session);
        if empty {
            self.sessions.remove_if(&key.session, |_, txns| txns.is_empty());
        }
        Some(result)
    }

    /// Like `with_coordinator`, but only for the given instance
    fn with_generation(
        &self,
        key: &TransactionKey,
        generation: u64,
        f: impl FnOnce(&mut TransactionCoordinator),
    ) {
        self.with_coordinator(key, |coordinator| {
            if coordinator.generation() == generation {
                f(coordinator);
            }
        });
    }
}

/// Entry point for 2PC coordination requests
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct CoordinatorService {
    inner: Arc<ServiceInner>,
}

impl CoordinatorService {
    pub fn new(transport: Arc<dyn Transport>, config: CoordinatorConfig) -> Self {
        let dispatcher = DecisionDispatcher::new(transport, config.retry.clone());
        Self {
            inner: Arc::new(ServiceInner {
                sessions: DashMap::new(),
                dispatcher,
                config,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Register a coordinator for `key` that aborts unless decided by `deadline`
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the deadline timer is
    /// spawned onto the current runtime.
    pub fn create_coordinator(&self, key: TransactionKey, deadline: Instant) -> Result<()> {
        let mut session = self.inner.sessions.entry(key.session).or_default();

        if session.contains_key(&key.txn_number) {
            return Err(CoordinatorError::CoordinatorExists(key));
        }
        if self.inner.config.supersession == SupersessionPolicy::Reject
            && let Some(active) = session.keys().next()
        {
            tracing::warn!(
                "Refusing coordinator for {}; session already coordinating txn {}",
                key,
                active
            );
            return Err(CoordinatorError::SessionBusy {
                session: key.session,
                active: *active,
            });
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);

        let hook: SettleHook = {
            let weak = weak.clone();
            Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.with_generation(&key, generation, |_| {});
                }
            })
        };

        let mut coordinator = TransactionCoordinator::new(
            key,
            generation,
            deadline,
            self.inner.dispatcher.clone(),
            Arc::new(DeliveryTable::with_settle_hook(hook)),
        );
        coordinator.set_deadline_task(tokio::spawn(deadline_timer(
            weak, key, generation, deadline,
        )));

        session.insert(key.txn_number, coordinator);
        tracing::debug!("Created coordinator for {}", key);
        Ok(())
    }

    /// Supply the participant set and get the decision future
    ///
    /// With no live coordinator the transaction is presumed resolved or
    /// abandoned and the returned future is already `Abort`.
    pub fn coordinate_commit(
        &self,
        key: TransactionKey,
        participants: BTreeSet<ParticipantId>,
    ) -> Result<DecisionFuture> {
        let result = self.inner.with_coordinator(&key, |coordinator| {
            coordinator.set_participants(participants)?;
            Ok(coordinator.decision_future())
        });

        result.unwrap_or_else(|| {
            tracing::debug!("No coordinator for {}; presuming abort", key);
            Ok(DecisionFuture::ready(CommitDecision::Abort))
        })
    }

    /// A participant prepared at `prepare_timestamp`
    ///
    /// With no live coordinator the participant is told to abort. Like every
    /// send, that runs on a task of the current Tokio runtime.
    pub fn vote_commit(
        &self,
        key: TransactionKey,
        participant: ParticipantId,
        prepare_timestamp: Timestamp,
    ) {
        let found = self.inner.with_coordinator(&key, |coordinator| {
            coordinator.record_commit_vote(&participant, prepare_timestamp)
        });

        if found.is_none() {
            tracing::debug!(
                "Commit vote from {} for unknown {}; sending abort",
                participant,
                key
            );
            self.inner
                .dispatcher
                .send_direct(key, &participant, DecisionCommand::Abort);
        }
    }

    /// A participant could not prepare and has rolled back locally
    pub fn vote_abort(&self, key: TransactionKey, participant: ParticipantId) {
        let found = self
            .inner
            .with_coordinator(&key, |coordinator| coordinator.record_abort_vote(&participant));

        if found.is_none() {
            tracing::debug!("Abort vote from {} for unknown {}", participant, key);
        }
    }

    /// Whether a coordinator for `key` is registered
    pub fn contains(&self, key: &TransactionKey) -> bool {
        self.inner
            .sessions
            .get(&key.session)
            .is_some_and(|session| session.contains_key(&key.txn_number))
    }

    pub fn state(&self, key: &TransactionKey) -> Option<CoordinatorState> {
        let session = self.inner.sessions.get(&key.session)?;
        session.get(&key.txn_number).map(TransactionCoordinator::state)
    }

    /// Delivery progress of the decision to one participant
    pub fn delivery_state(
        &self,
        key: &TransactionKey,
        participant: &ParticipantId,
    ) -> Option<DeliveryState> {
        let session = self.inner.sessions.get(&key.session)?;
        session
            .get(&key.txn_number)?
            .deliveries()
            .state(participant)
    }

    /// Transaction numbers with a live coordinator in `session`
    pub fn active_transactions(&self, session: &SessionId) -> Vec<TxnNumber> {
        self.inner
            .sessions
            .get(session)
            .map(|txns| txns.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live coordinators
    pub fn len(&self) -> usize {
        self.inner.sessions.iter().map(|session| session.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn deadline_timer(
    inner: Weak<ServiceInner>,
    key: TransactionKey,
    generation: u64,
    deadline: Instant,
) {
    tokio::time::sleep_until(deadline).await;

    if let Some(inner) = inner.upgrade() {
        inner.with_generation(&key, generation, TransactionCoordinator::on_deadline);
    }
}
