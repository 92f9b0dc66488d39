use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    election::Election,
    id::{CandidateId, ElectionId, VoteId, VoterId},
};

/// A cast vote. Append-only: never updated, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: VoteId,
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    pub voter_id: VoterId,
    pub cast_at: DateTime<Utc>,
}

/// What distinguishes one allowed vote from a duplicate.
///
/// Elections allowing multiple votes permit one vote per candidate per voter;
/// all others permit one vote per voter.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum UniquenessKey {
    Voter {
        election: ElectionId,
        voter: VoterId,
    },
    VoterCandidate {
        election: ElectionId,
        voter: VoterId,
        candidate: CandidateId,
    },
}

impl UniquenessKey {
    /// The key a vote by `voter` for `candidate` occupies in `election`.
    pub fn for_vote(election: &Election, voter: &VoterId, candidate: CandidateId) -> Self {
        if election.allow_multiple_votes {
            Self::VoterCandidate {
                election: election.id,
                voter: voter.clone(),
                candidate,
            }
        } else {
            Self::Voter {
                election: election.id,
                voter: voter.clone(),
            }
        }
    }

    pub fn election(&self) -> ElectionId {
        match self {
            Self::Voter { election, .. } | Self::VoterCandidate { election, .. } => *election,
        }
    }

    pub fn voter(&self) -> &VoterId {
        match self {
            Self::Voter { voter, .. } | Self::VoterCandidate { voter, .. } => voter,
        }
    }

    /// Does `vote` occupy this key?
    pub fn matches(&self, vote: &Vote) -> bool {
        match self {
            Self::Voter { election, voter } => {
                vote.election_id == *election && vote.voter_id == *voter
            }
            Self::VoterCandidate {
                election,
                voter,
                candidate,
            } => {
                vote.election_id == *election
                    && vote.voter_id == *voter
                    && vote.candidate_id == *candidate
            }
        }
    }

    /// The per-election string form stored alongside each vote, on which the
    /// database enforces uniqueness. The election ID is indexed separately.
    pub fn storage_key(&self) -> String {
        match self {
            Self::Voter { voter, .. } => format!("v:{}", escape(voter.as_str())),
            Self::VoterCandidate {
                voter, candidate, ..
            } => format!("vc:{}:{}", escape(voter.as_str()), candidate),
        }
    }
}

/// Make voter IDs containing the separator unambiguous.
fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace(':', "\\:")
}

impl Display for UniquenessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.election(), self.storage_key())
    }
}

/// Proof of a successfully recorded vote, returned to the voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub vote_id: VoteId,
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    pub cast_at: DateTime<Utc>,
}

impl From<&Vote> for VoteReceipt {
    fn from(vote: &Vote) -> Self {
        Self {
            vote_id: vote.id,
            election_id: vote.election_id,
            candidate_id: vote.candidate_id,
            cast_at: vote.cast_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{election::ElectionSpec, id::Id};

    #[test]
    fn key_depends_on_multiple_vote_setting() {
        let now = Utc::now();
        let (single, candidates) = ElectionSpec::example(now).into_election(now);
        let voter = VoterId::from("v1");
        let a = UniquenessKey::for_vote(&single, &voter, candidates[0].id);
        let b = UniquenessKey::for_vote(&single, &voter, candidates[1].id);
        assert_eq!(a, b);

        let (multi, candidates) = ElectionSpec::multi_vote_example(now).into_election(now);
        let a = UniquenessKey::for_vote(&multi, &voter, candidates[0].id);
        let b = UniquenessKey::for_vote(&multi, &voter, candidates[1].id);
        assert_ne!(a, b);
        assert_ne!(a.storage_key(), b.storage_key());
    }

    #[test]
    fn storage_keys_cannot_collide_through_separators() {
        let election = Id::new();
        let candidate = Id::new();
        let tricky = UniquenessKey::Voter {
            election,
            voter: VoterId::from(format!("x:{candidate}")),
        };
        let plain = UniquenessKey::VoterCandidate {
            election,
            voter: VoterId::from("x"),
            candidate,
        };
        assert_ne!(tricky.storage_key(), plain.storage_key());
    }

    #[test]
    fn key_matches_its_own_vote_only() {
        let now = Utc::now();
        let (multi, candidates) = ElectionSpec::multi_vote_example(now).into_election(now);
        let vote = Vote {
            id: Id::new(),
            election_id: multi.id,
            candidate_id: candidates[0].id,
            voter_id: VoterId::from("v1"),
            cast_at: now,
        };
        let same = UniquenessKey::for_vote(&multi, &vote.voter_id, candidates[0].id);
        let other = UniquenessKey::for_vote(&multi, &vote.voter_id, candidates[1].id);
        assert!(same.matches(&vote));
        assert!(!other.matches(&vote));
    }
}
