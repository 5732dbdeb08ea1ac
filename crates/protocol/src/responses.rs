//! Participant replies and their classification for retry purposes

use crate::messages::ParseError;
use std::collections::HashMap;

/// Reply a participant (or the network on its behalf) returns for a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantReply {
    /// Decision applied
    Ok,
    /// Participant has no record of the transaction
    NoSuchTransaction,
    /// Participant has already moved past this transaction number
    TransactionTooOld,
    /// Participant endpoint could not be reached
    HostUnreachable,
    /// Request timed out before a reply arrived
    NetworkTimeout,
    /// Reached a replica that cannot accept the decision right now
    NotPrimary,
    /// Any other failure reported by the participant
    Error { message: String },
}

impl ParticipantReply {
    /// Encode as message headers
    pub fn to_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        let status = match self {
            Self::Ok => "ok",
            Self::NoSuchTransaction => "no_such_transaction",
            Self::TransactionTooOld => "transaction_too_old",
            Self::HostUnreachable => "host_unreachable",
            Self::NetworkTimeout => "network_timeout",
            Self::NotPrimary => "not_primary",
            Self::Error { message } => {
                headers.insert("error".to_string(), message.clone());
                "error"
            }
        };
        headers.insert("status".to_string(), status.to_string());
        headers
    }

    /// Parse from message headers
    pub fn from_headers(headers: &HashMap<String, String>) -> Result<Self, ParseError> {
        let reply = match headers.get("status").map(String::as_str) {
            Some("ok") => Self::Ok,
            Some("no_such_transaction") => Self::NoSuchTransaction,
            Some("transaction_too_old") => Self::TransactionTooOld,
            Some("host_unreachable") => Self::HostUnreachable,
            Some("network_timeout") => Self::NetworkTimeout,
            Some("not_primary") => Self::NotPrimary,
            Some("error") => Self::Error {
                message: headers
                    .get("error")
                    .cloned()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
            Some(other) => return Err(ParseError::InvalidStatus(other.to_string())),
            None => return Err(ParseError::MissingHeader("status")),
        };
        Ok(reply)
    }
}

/// How the coordinator should treat the result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Participant applied the decision
    Acknowledged,
    /// Transient failure; the identical instruction must be sent again
    Retryable(String),
    /// Non-retryable reply; delivery counts as satisfied
    Terminal(String),
}

impl DeliveryOutcome {
    /// Whether no further attempt is owed
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Retryable(_))
    }
}

impl From<&ParticipantReply> for DeliveryOutcome {
    fn from(reply: &ParticipantReply) -> Self {
        match reply {
            ParticipantReply::Ok => Self::Acknowledged,
            ParticipantReply::HostUnreachable => Self::Retryable("host unreachable".to_string()),
            ParticipantReply::NetworkTimeout => Self::Retryable("network timeout".to_string()),
            ParticipantReply::NotPrimary => Self::Retryable("not primary".to_string()),
            ParticipantReply::NoSuchTransaction => Self::Terminal("no such transaction".to_string()),
            ParticipantReply::TransactionTooOld => Self::Terminal("transaction too old".to_string()),
            ParticipantReply::Error { message } => Self::Terminal(message.clone()),
        }
    }
}
