//! Transaction identity: a session plus a transaction number within it

use crate::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically increasing transaction number within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnNumber(u64);

impl TxnNumber {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// The transaction number that follows this one in the same session
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TxnNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique key of a distributed transaction
///
/// Immutable once assigned. Ordering is by session, then transaction number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionKey {
    pub session: SessionId,
    pub txn_number: TxnNumber,
}

impl TransactionKey {
    pub fn new(session: SessionId, txn_number: TxnNumber) -> Self {
        Self {
            session,
            txn_number,
        }
    }

    /// Parse from string format: "session:txn_number"
    pub fn parse(s: &str) -> Result<Self, String> {
        let (session, txn_number) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("Invalid transaction key: {} (expected session:txn)", s))?;

        let session = SessionId::parse(session)?;
        let txn_number = txn_number
            .parse()
            .map(TxnNumber::new)
            .map_err(|_| format!("Invalid transaction number: {}", txn_number))?;

        Ok(Self::new(session, txn_number))
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session, self.txn_number)
    }
}
