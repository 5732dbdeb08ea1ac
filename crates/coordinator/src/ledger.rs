//! Per-transaction record of participant votes

use proven_common::{ParticipantId, Timestamp};
use std::collections::{BTreeSet, HashMap};

/// A participant's vote on the outcome of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// Participant prepared at the given timestamp
    Commit { prepare_timestamp: Timestamp },
    /// Participant cannot commit and has rolled back locally
    Abort,
}

/// Result of recording a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First vote from this participant
    New,
    /// Same vote seen before (re-delivery)
    Duplicate,
    /// Participant already voted something else; the earlier vote is kept
    Conflict { existing: Vote },
}

/// Mapping from participant to vote
#[derive(Debug, Clone, Default)]
pub struct VoteLedger {
    votes: HashMap<ParticipantId, Vote>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote. Recorded votes are immutable.
    pub fn record(&mut self, participant: &ParticipantId, vote: Vote) -> RecordOutcome {
        match self.votes.get(participant) {
            None => {
                self.votes.insert(participant.clone(), vote);
                RecordOutcome::New
            }
            Some(existing) if *existing == vote => RecordOutcome::Duplicate,
            Some(existing) => RecordOutcome::Conflict {
                existing: *existing,
            },
        }
    }

    pub fn vote(&self, participant: &ParticipantId) -> Option<Vote> {
        self.votes.get(participant).copied()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Participants that voted commit
    pub fn commit_voters(&self) -> impl Iterator<Item = &ParticipantId> {
        self.votes
            .iter()
            .filter(|(_, vote)| matches!(vote, Vote::Commit { .. }))
            .map(|(participant, _)| participant)
    }

    /// Participants that voted abort
    pub fn abort_voters(&self) -> impl Iterator<Item = &ParticipantId> {
        self.votes
            .iter()
            .filter(|(_, vote)| matches!(vote, Vote::Abort))
            .map(|(participant, _)| participant)
    }

    /// The commit timestamp for `participants` if every one of them voted
    /// commit: the maximum of their prepare timestamps.
    pub fn unanimous_commit(&self, participants: &BTreeSet<ParticipantId>) -> Option<Timestamp> {
        let mut max: Option<Timestamp> = None;
        for participant in participants {
            match self.votes.get(participant)? {
                Vote::Commit { prepare_timestamp } => {
                    max = Some(max.map_or(*prepare_timestamp, |m| m.max(*prepare_timestamp)));
                }
                Vote::Abort => return None,
            }
        }
        max
    }
}
