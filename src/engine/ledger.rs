use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rocket::tokio::sync::Mutex;

use crate::error::{Error, Result, StorageError};
use crate::model::{
    CandidateId, ElectionId, Id, Identity, UniquenessKey, Vote, VoteReceipt,
};
use crate::store::{SharedStore, VoteInsert};

use super::lifecycle::LifecycleController;

/// Number of in-process lock stripes. Only bounds contention; correctness
/// comes from the store.
const LOCK_STRIPES: usize = 64;

/// Records cast votes, at most one per uniqueness key.
///
/// The store's conditional insert is what guarantees uniqueness, across any
/// number of processes. The striped locks here only stop concurrent requests
/// in this process from racing each other all the way to the database.
#[derive(Clone)]
pub struct VoteLedger {
    store: SharedStore,
    lifecycle: LifecycleController,
    stripes: Arc<[Mutex<()>]>,
}

impl VoteLedger {
    pub fn new(store: SharedStore, lifecycle: LifecycleController) -> Self {
        let stripes = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();
        Self {
            store,
            lifecycle,
            stripes,
        }
    }

    fn stripe(&self, key: &UniquenessKey) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        &self.stripes[index]
    }

    /// Cast `identity`'s vote for `candidate_id` in `election_id`.
    ///
    /// Either exactly one complete vote is recorded and a receipt returned,
    /// or nothing is written. A vote that collides with an existing one fails
    /// with [`Error::DuplicateVote`] naming the vote already recorded, which
    /// is left untouched. A vote racing the election's completion fails with
    /// [`Error::PreconditionFailed`] if the completion lands first.
    pub async fn cast_vote(
        &self,
        identity: &Identity,
        election_id: ElectionId,
        candidate_id: CandidateId,
    ) -> Result<VoteReceipt> {
        let election = self.lifecycle.visible_election(identity, election_id).await?;
        if !self.lifecycle.can_accept_votes(&election) {
            return Err(Error::PreconditionFailed(format!(
                "election {election_id} is not accepting votes (status {}, open {} to {})",
                election.status, election.start_date, election.end_date
            )));
        }
        let candidates = self.store.candidates(election_id).await?;
        if !candidates.iter().any(|c| c.id == candidate_id) {
            return Err(Error::not_found(format!(
                "candidate {candidate_id} in election {election_id}"
            )));
        }

        let voter = &identity.voter_id;
        let key = UniquenessKey::for_vote(&election, voter, candidate_id);
        let _guard = self.stripe(&key).lock().await;

        // Cheap early answer for retries; the insert below decides for real.
        if let Some(existing) = self.store.find_vote(&key).await? {
            return Err(duplicate(existing));
        }

        let vote = Vote {
            id: Id::new(),
            election_id,
            candidate_id,
            voter_id: voter.clone(),
            cast_at: self.lifecycle.clock().now(),
        };
        match self.store.insert_vote_if_absent(&vote, &key).await? {
            VoteInsert::Inserted => {
                debug!("Recorded vote {} in election {election_id}", vote.id);
                return Ok(VoteReceipt::from(&vote));
            }
            VoteInsert::Closed => {
                debug!("Election {election_id} closed before vote {} landed", vote.id);
                return Err(Error::PreconditionFailed(format!(
                    "election {election_id} is no longer accepting votes"
                )));
            }
            VoteInsert::Occupied => {}
        }

        // Lost the race to another process.
        match self.store.find_vote(&key).await? {
            Some(existing) => Err(duplicate(existing)),
            None => Err(StorageError::Corrupt(format!(
                "key {key} reported occupied but holds no vote"
            ))
            .into()),
        }
    }

    /// Candidates `identity` has voted for in the given election.
    pub async fn votes_for(
        &self,
        identity: &Identity,
        election_id: ElectionId,
    ) -> Result<Vec<CandidateId>> {
        self.lifecycle
            .visible_election(identity, election_id)
            .await?;
        let votes = self
            .store
            .votes_by_voter(election_id, &identity.voter_id)
            .await?;
        Ok(votes.into_iter().map(|v| v.candidate_id).collect())
    }
}

fn duplicate(existing: Vote) -> Error {
    Error::DuplicateVote {
        election: existing.election_id,
        voter: existing.voter_id,
        existing: existing.id,
    }
}
