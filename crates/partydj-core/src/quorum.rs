//! Vote-to-skip quorum

use partydj_util::sanitize_key;
use std::collections::BTreeSet;

/// Name used when a participant has not set one
pub const DEFAULT_NAME: &str = "Guest";

/// Votes needed to skip: half the active listeners, rounded up, at least one.
///
/// An odd count needs a true majority (3 listeners need 2 votes).
pub fn required_votes(active_listeners: usize) -> usize {
    active_listeners.div_ceil(2).max(1)
}

/// Whether `votes` distinct voters are enough to skip
pub fn should_skip(votes: usize, active_listeners: usize) -> bool {
    votes >= required_votes(active_listeners)
}

/// Store key identifying a voter: the trimmed, sanitized display name
pub fn voter_key(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        sanitize_key(DEFAULT_NAME)
    } else {
        sanitize_key(name)
    }
}

/// Skip votes for the item currently playing. Cleared whenever it changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipVotes {
    voters: BTreeSet<String>,
}

impl SkipVotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vote; returns false if this voter had already voted
    pub fn cast(&mut self, voter: &str) -> bool {
        self.voters.insert(voter_key(voter))
    }

    /// Remove a vote; returns false if there was none
    pub fn retract(&mut self, voter: &str) -> bool {
        self.voters.remove(&voter_key(voter))
    }

    pub fn contains(&self, voter: &str) -> bool {
        self.voters.contains(&voter_key(voter))
    }

    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }

    pub fn clear(&mut self) {
        self.voters.clear();
    }

    pub fn voters(&self) -> impl Iterator<Item = &str> {
        self.voters.iter().map(String::as_str)
    }

    pub fn should_skip(&self, active_listeners: usize) -> bool {
        should_skip(self.len(), active_listeners)
    }
}

impl FromIterator<String> for SkipVotes {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            voters: iter.into_iter().map(|v| voter_key(&v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_votes_rounds_half_up() {
        let expected = [(0, 1), (1, 1), (2, 1), (3, 2), (4, 2), (5, 3), (6, 3), (7, 4)];
        for (active, required) in expected {
            assert_eq!(required_votes(active), required, "active = {}", active);
        }
    }

    #[test]
    fn quorum_boundary_is_inclusive() {
        assert!(!should_skip(1, 4));
        assert!(should_skip(2, 4));
        assert!(should_skip(1, 0));
        assert!(!should_skip(0, 0));
    }

    #[test]
    fn should_skip_is_monotonic_in_votes() {
        for active in 0..20 {
            let mut seen_true = false;
            for votes in 0..25 {
                let skip = should_skip(votes, active);
                assert!(!(seen_true && !skip), "active {} votes {}", active, votes);
                seen_true |= skip;
            }
        }
    }

    #[test]
    fn one_vote_per_voter() {
        let mut votes = SkipVotes::new();
        assert!(votes.cast("Ana"));
        assert!(!votes.cast(" Ana "));
        assert!(votes.cast("Ben"));
        assert_eq!(votes.len(), 2);

        assert!(votes.retract("Ana"));
        assert!(!votes.retract("Ana"));
        assert_eq!(votes.len(), 1);
        assert!(votes.contains("Ben"));
    }

    #[test]
    fn voter_keys_are_store_safe() {
        assert_eq!(voter_key("dj.k/ev"), "dj_k_ev");
        assert_eq!(voter_key("   "), "Guest");
    }
}
