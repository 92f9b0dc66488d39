use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::{
    election::{Candidate, Election, ElectionStatus},
    id::{CandidateId, ElectionId},
};

/// Per-candidate vote counts for one election. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub election_id: ElectionId,
    /// Election status at the time the tally was computed.
    /// Anything other than `completed` is a preview.
    pub status: ElectionStatus,
    /// One entry per candidate, including those with zero votes.
    pub counts: BTreeMap<CandidateId, u64>,
    pub total: u64,
}

impl Tally {
    /// Build a zero-filled tally from raw per-candidate counts.
    ///
    /// Counts for IDs that are not candidates of the election are dropped;
    /// the ledger never records such votes.
    pub fn from_counts(
        election: &Election,
        candidates: &[Candidate],
        raw: &HashMap<CandidateId, u64>,
    ) -> Self {
        let counts: BTreeMap<_, _> = candidates
            .iter()
            .map(|c| (c.id, raw.get(&c.id).copied().unwrap_or(0)))
            .collect();
        let total = counts.values().sum();
        Self {
            election_id: election.id,
            status: election.status,
            counts,
            total,
        }
    }

    pub fn count_for(&self, candidate: CandidateId) -> Option<u64> {
        self.counts.get(&candidate).copied()
    }

    pub fn is_final(&self) -> bool {
        self.status == ElectionStatus::Completed
    }
}

/// A completed election and its final tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResult {
    pub election: Election,
    pub candidates: Vec<Candidate>,
    pub tally: Tally,
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::model::election::ElectionSpec;

    #[test]
    fn zero_fills_and_sums() {
        let now = Utc::now();
        let (election, candidates) = ElectionSpec::multi_vote_example(now).into_election(now);
        let raw = HashMap::from([(candidates[1].id, 4)]);
        let tally = Tally::from_counts(&election, &candidates, &raw);
        assert_eq!(tally.counts.len(), 3);
        assert_eq!(tally.count_for(candidates[0].id), Some(0));
        assert_eq!(tally.count_for(candidates[1].id), Some(4));
        assert_eq!(tally.count_for(candidates[2].id), Some(0));
        assert_eq!(tally.total, 4);
        assert!(!tally.is_final());
    }
}
