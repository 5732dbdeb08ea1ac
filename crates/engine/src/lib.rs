//! In-memory mock engine for testing decision delivery
//!
//! This module provides an in-memory stand-in for the participant network,
//! allowing the coordinator to be exercised against scripted participants.

use thiserror::Error;

pub mod client;
pub mod engine;
pub mod message;

pub use client::MockClient;
pub use engine::{DeliveredRequest, MockEngine};
pub use message::Message;

/// Mock engine errors
#[derive(Debug, Error)]
pub enum MockEngineError {
    #[error("No endpoint for participant: {0}")]
    ParticipantNotFound(String),

    #[error("Timed out waiting for {expected} requests (received {received})")]
    Timeout { expected: usize, received: usize },
}

pub type Result<T> = std::result::Result<T, MockEngineError>;
