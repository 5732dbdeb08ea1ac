//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How undelivered decisions are retried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// Keep resending on a background task until settled
    Backoff {
        /// Delay before the first retry
        initial_backoff: Duration,
        /// Upper bound for the delay between retries
        max_backoff: Duration,
        /// Growth factor applied after each failed attempt
        multiplier: f64,
    },

    /// Park the delivery after a transient failure; it is resent only when
    /// the participant's vote arrives again
    Redrive,
}

impl RetryPolicy {
    /// Delay before the next attempt, given the previous delay
    pub(crate) fn next_backoff(&self, previous: Option<Duration>) -> Option<Duration> {
        match self {
            Self::Backoff {
                initial_backoff,
                max_backoff,
                multiplier,
            } => {
                let next = match previous {
                    None => *initial_backoff,
                    Some(prev) => prev.mul_f64(*multiplier),
                };
                Some(next.min(*max_backoff))
            }
            Self::Redrive => None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Backoff {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

/// What `create_coordinator` does when the session already has a live
/// coordinator for a different transaction number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupersessionPolicy {
    /// Refuse the new coordinator
    #[default]
    Reject,
    /// Register the new coordinator next to the existing one
    Coexist,
}

/// Configuration for the coordinator service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Retry behavior for decision delivery
    pub retry: RetryPolicy,

    /// Handling of concurrent transactions on one session
    pub supersession: SupersessionPolicy,
}

impl CoordinatorConfig {
    /// Set retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set supersession policy
    pub fn with_supersession(mut self, supersession: SupersessionPolicy) -> Self {
        self.supersession = supersession;
        self
    }
}
