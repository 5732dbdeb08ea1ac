//! Error types for the coordinator

use proven_common::{ParticipantId, SessionId, TransactionKey, TxnNumber};
use std::collections::BTreeSet;
use thiserror::Error;

/// Coordinator error types
///
/// Delivery failures and missing coordinators are never errors; they are
/// handled by retry and by the service's conservative fallbacks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Coordinator already exists for transaction {0}")]
    CoordinatorExists(TransactionKey),

    #[error("Session {session} already has a live coordinator for transaction {active}")]
    SessionBusy {
        session: SessionId,
        active: TxnNumber,
    },

    #[error("Participant set for {key} already fixed to {expected:?}, got {actual:?}")]
    ParticipantSetMismatch {
        key: TransactionKey,
        expected: BTreeSet<ParticipantId>,
        actual: BTreeSet<ParticipantId>,
    },
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;
