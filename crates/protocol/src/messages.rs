//! Typed decision messages for coordinator-to-participant communication

use proven_common::{SessionId, Timestamp, TransactionKey, TxnNumber};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Decision phases carried in the `txn_phase` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    /// Commit phase (decision)
    Commit,
    /// Abort phase (decision)
    Abort,
}

impl TransactionPhase {
    /// Parse from string header value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "commit" => Some(Self::Commit),
            "abort" => Some(Self::Abort),
            _ => None,
        }
    }

    /// Convert to string header value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Abort => "abort",
        }
    }
}

/// The one logical instruction a participant receives for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionCommand {
    /// Commit at the given timestamp
    Commit { commit_timestamp: Timestamp },
    /// Roll back
    Abort,
}

impl DecisionCommand {
    pub fn phase(&self) -> TransactionPhase {
        match self {
            Self::Commit { .. } => TransactionPhase::Commit,
            Self::Abort => TransactionPhase::Abort,
        }
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, Self::Commit { .. })
    }
}

impl fmt::Display for DecisionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit { commit_timestamp } => write!(f, "commit@{}", commit_timestamp),
            Self::Abort => f.write_str("abort"),
        }
    }
}

/// A decision command addressed to a specific transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionMessage {
    pub key: TransactionKey,
    pub command: DecisionCommand,
}

impl DecisionMessage {
    pub fn new(key: TransactionKey, command: DecisionCommand) -> Self {
        Self { key, command }
    }

    /// Encode as message headers
    pub fn to_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("session_id".to_string(), self.key.session.to_string());
        headers.insert("txn_number".to_string(), self.key.txn_number.to_string());
        headers.insert(
            "txn_phase".to_string(),
            self.command.phase().as_str().to_string(),
        );

        if let DecisionCommand::Commit { commit_timestamp } = self.command {
            headers.insert("commit_timestamp".to_string(), commit_timestamp.to_string());
        }

        headers
    }

    /// Parse from message headers
    pub fn from_headers(headers: &HashMap<String, String>) -> Result<Self, ParseError> {
        let header = |name: &'static str| {
            headers
                .get(name)
                .map(String::as_str)
                .ok_or(ParseError::MissingHeader(name))
        };

        let session_str = header("session_id")?;
        let session = SessionId::parse(session_str)
            .map_err(|_| ParseError::InvalidSessionId(session_str.to_string()))?;

        let txn_str = header("txn_number")?;
        let txn_number = txn_str
            .parse()
            .map(TxnNumber::new)
            .map_err(|_| ParseError::InvalidTxnNumber(txn_str.to_string()))?;

        let phase_str = header("txn_phase")?;
        let phase = TransactionPhase::parse(phase_str)
            .ok_or_else(|| ParseError::InvalidPhase(phase_str.to_string()))?;

        let command = match phase {
            TransactionPhase::Commit => {
                let ts_str = header("commit_timestamp")?;
                let commit_timestamp = Timestamp::parse(ts_str)
                    .map_err(|_| ParseError::InvalidTimestamp(ts_str.to_string()))?;
                DecisionCommand::Commit { commit_timestamp }
            }
            TransactionPhase::Abort => DecisionCommand::Abort,
        };

        Ok(Self::new(TransactionKey::new(session, txn_number), command))
    }
}

/// Errors that can occur when parsing messages and replies
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),

    #[error("Invalid transaction number: {0}")]
    InvalidTxnNumber(String),

    #[error("Invalid transaction phase: {0}")]
    InvalidPhase(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),
}
