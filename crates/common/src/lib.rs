//! Common types for the Proven transaction coordinator
//!
//! This crate defines:
//! - Transaction identity (session ID plus transaction number)
//! - Participant identifiers
//! - Prepare/commit timestamps

mod participant;
mod session_id;
mod timestamp;
mod transaction_key;

pub use participant::ParticipantId;
pub use session_id::SessionId;
pub use timestamp::Timestamp;
pub use transaction_key::{TransactionKey, TxnNumber};
