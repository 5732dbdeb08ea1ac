//! Two-phase-commit decision coordinator
//!
//! This crate decides, for each transaction, whether every participant
//! commits or every participant aborts, and drives that decision to the
//! participants:
//! - `ledger`: participant votes
//! - `coordinator`: the per-transaction decision state machine
//! - `decision`: the decision value and the shared future that publishes it
//! - `dispatcher`: per-participant delivery with retry
//! - `service`: the registry that owns live coordinators

pub mod config;
pub mod coordinator;
pub mod decision;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod service;

pub use config::{CoordinatorConfig, RetryPolicy, SupersessionPolicy};
pub use coordinator::{CoordinatorState, TransactionCoordinator};
pub use decision::{CommitDecision, Decision, DecisionFuture};
pub use dispatcher::{DecisionDispatcher, DeliveryState, DeliveryTable, SettleHook};
pub use error::{CoordinatorError, Result};
pub use ledger::{RecordOutcome, Vote, VoteLedger};
pub use service::CoordinatorService;
