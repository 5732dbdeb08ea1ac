//! Commit decisions and the shared future that publishes them

use futures::future::BoxFuture;
use proven_common::Timestamp;
use proven_protocol::DecisionCommand;
use std::fmt;
use std::future::IntoFuture;
use tokio::sync::watch;

/// Final outcome of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    Commit(Timestamp),
    Abort,
}

impl CommitDecision {
    pub fn is_commit(&self) -> bool {
        matches!(self, Self::Commit(_))
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort)
    }

    /// The instruction participants receive for this decision
    pub fn command(&self) -> DecisionCommand {
        match self {
            Self::Commit(commit_timestamp) => DecisionCommand::Commit {
                commit_timestamp: *commit_timestamp,
            },
            Self::Abort => DecisionCommand::Abort,
        }
    }
}

impl fmt::Display for CommitDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit(ts) => write!(f, "commit@{}", ts),
            Self::Abort => f.write_str("abort"),
        }
    }
}

/// Coordinator decision state. Moves from `Undecided` to `Decided` once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Decision {
    #[default]
    Undecided,
    Decided(CommitDecision),
}

impl Decision {
    pub fn is_decided(&self) -> bool {
        matches!(self, Self::Decided(_))
    }

    pub fn outcome(&self) -> Option<CommitDecision> {
        match self {
            Self::Undecided => None,
            Self::Decided(decision) => Some(*decision),
        }
    }
}

/// Write side of a decision future. Publishes exactly once.
#[derive(Debug)]
pub(crate) struct DecisionPublisher {
    sender: watch::Sender<Option<CommitDecision>>,
}

impl DecisionPublisher {
    pub(crate) fn new() -> (Self, DecisionFuture) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, DecisionFuture { receiver })
    }

    /// Resolve every attached future. Returns false if already resolved.
    pub(crate) fn publish(&self, decision: CommitDecision) -> bool {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(decision);
            true
        })
    }
}

/// Multi-consumer handle on a transaction's eventual decision
///
/// Clones observe the same value. Any number of callers may attach before
/// or after resolution. Await it directly or call [`DecisionFuture::wait`].
#[derive(Debug, Clone)]
pub struct DecisionFuture {
    receiver: watch::Receiver<Option<CommitDecision>>,
}

impl DecisionFuture {
    /// A future that is already resolved
    pub fn ready(decision: CommitDecision) -> Self {
        let (_, receiver) = watch::channel(Some(decision));
        Self { receiver }
    }

    /// The decision if it has been made
    pub fn peek(&self) -> Option<CommitDecision> {
        *self.receiver.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.peek().is_some()
    }

    /// Wait for the decision
    ///
    /// A coordinator that went away without deciding is reported as abort.
    pub async fn wait(&self) -> CommitDecision {
        let mut receiver = self.receiver.clone();
        let result = receiver.wait_for(Option::is_some).await;
        match result {
            Ok(decision) => decision.unwrap_or(CommitDecision::Abort),
            Err(_) => {
                tracing::warn!("Coordinator dropped before deciding; treating as abort");
                CommitDecision::Abort
            }
        }
    }
}

impl IntoFuture for DecisionFuture {
    type Output = CommitDecision;
    type IntoFuture = BoxFuture<'static, CommitDecision>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}
