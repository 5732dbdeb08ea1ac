//! Protocol definitions for coordinator-participant decision delivery
//!
//! This crate defines the commit/abort instructions the coordinator sends,
//! the replies a participant can return, how those replies are classified
//! for retry purposes, and the `Transport` seam the coordinator sends through.
//! Messages are encoded as string headers so any header-carrying transport
//! can move them.

pub mod messages;
pub mod responses;
pub mod transport;

pub use messages::{DecisionCommand, DecisionMessage, ParseError, TransactionPhase};
pub use responses::{DeliveryOutcome, ParticipantReply};
pub use transport::Transport;
