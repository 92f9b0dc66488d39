//! Durable state for elections, candidates and votes.
//!
//! The engine only talks to the [`ElectionStore`] trait. Two adapters exist:
//! [`MemoryStore`] for a single process and [`MongoStore`] for real
//! deployments where several server instances share one database.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{
    Candidate, CandidateId, Election, ElectionId, ElectionStatus, UniquenessKey, Vote, VoterId,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// How fresh a read must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadConsistency {
    /// Must reflect every committed write (read-after-write).
    Strong,
    /// A recent committed state is good enough, e.g. from a replica.
    Relaxed,
}

/// Outcome of a conditional vote insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteInsert {
    Inserted,
    /// Another vote already occupies the key.
    Occupied,
    /// The election is missing or not active, so it takes no votes.
    Closed,
}

#[rocket::async_trait]
pub trait ElectionStore: Send + Sync {
    async fn get(&self, id: ElectionId) -> Result<Option<Election>>;

    async fn list(&self) -> Result<Vec<Election>>;

    /// Candidates of the given election, in creation order.
    async fn candidates(&self, election: ElectionId) -> Result<Vec<Candidate>>;

    /// Insert an election and all its candidates atomically: afterwards
    /// either all rows exist or none do.
    async fn insert_election(&self, election: &Election, candidates: &[Candidate]) -> Result<()>;

    /// Compare-and-set the status. Returns false, changing nothing, if the
    /// election does not exist or its status is not `from`.
    async fn update_status(
        &self,
        id: ElectionId,
        from: ElectionStatus,
        to: ElectionStatus,
    ) -> Result<bool>;

    /// Insert `vote` unless another vote already occupies `key` or its
    /// election is no longer active. This is the source of truth for vote
    /// uniqueness and must hold across processes. The status check is atomic
    /// with the insert, so no vote commits after [`update_status`] has moved
    /// the election out of `active`.
    ///
    /// [`update_status`]: ElectionStore::update_status
    async fn insert_vote_if_absent(&self, vote: &Vote, key: &UniquenessKey)
        -> Result<VoteInsert>;

    /// The vote occupying `key`, if any.
    async fn find_vote(&self, key: &UniquenessKey) -> Result<Option<Vote>>;

    async fn votes_by_voter(&self, election: ElectionId, voter: &VoterId) -> Result<Vec<Vote>>;

    /// Every vote of an election. Only used for auditing.
    async fn votes(&self, election: ElectionId) -> Result<Vec<Vote>>;

    /// Vote counts keyed by candidate. Candidates without votes may be absent.
    async fn count_votes_by_candidate(
        &self,
        election: ElectionId,
        consistency: ReadConsistency,
    ) -> Result<HashMap<CandidateId, u64>>;
}

pub type SharedStore = Arc<dyn ElectionStore>;
