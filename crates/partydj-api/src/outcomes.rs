//! Outcomes of room actions
//!
//! Policy rejections are ordinary outcomes. Only store or transport failures
//! are errors.

use partydj_util::ItemId;
use serde::{Deserialize, Serialize};

/// Result of submitting a video to the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// A new queue entry was created
    Added { item_id: ItemId },
    /// The video was already queued or playing; its score went up by one
    Upvoted { item_id: ItemId, vote_score: i64 },
    /// Nothing changed
    Rejected { reason: SubmitRejection },
}

/// Why a submission was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum SubmitRejection {
    /// The submitter already has the maximum number of items queued
    PerUserLimit { limit: u32 },
    /// The candidate has no usable video id
    InvalidVideo,
}

/// Direction of a queue vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn delta(self) -> i64 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }
}

/// Result of casting or retracting a skip vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipOutcome {
    /// There is nothing to skip
    NothingPlaying,
    /// Vote set updated; quorum not reached
    Counted { votes: usize, required: usize },
    /// Quorum reached: the playing item was replaced by `next`
    Skipped { skipped: ItemId, next: Option<ItemId> },
}

/// What caused the now-playing slot to change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceCause {
    Host,
    VoteSkip,
}

/// Result of advancing the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Started { item_id: ItemId },
    QueueEmpty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_outcome_wire_names() {
        let added = serde_json::to_value(SubmitOutcome::Added {
            item_id: ItemId::youtube("a"),
        })
        .unwrap();
        assert_eq!(added["action"], "added");

        let rejected = serde_json::to_value(SubmitOutcome::Rejected {
            reason: SubmitRejection::PerUserLimit { limit: 3 },
        })
        .unwrap();
        assert_eq!(rejected["action"], "rejected");
        assert_eq!(rejected["reason"]["reason"], "per-user-limit");
    }

    #[test]
    fn vote_deltas() {
        assert_eq!(VoteDirection::Up.delta(), 1);
        assert_eq!(VoteDirection::Down.delta(), -1);
    }
}
