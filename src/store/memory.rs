use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, StorageError};
use crate::model::{
    Candidate, CandidateId, Election, ElectionId, ElectionStatus, UniquenessKey, Vote, VoterId,
};

use super::{ElectionStore, ReadConsistency, VoteInsert};

#[derive(Debug, Default)]
struct Tables {
    elections: HashMap<ElectionId, Election>,
    candidates: HashMap<ElectionId, Vec<Candidate>>,
    /// Append-only.
    votes: Vec<Vote>,
    /// Uniqueness index: occupied key -> position in `votes`.
    keys: HashMap<UniquenessKey, usize>,
}

/// A store held entirely in process memory.
///
/// All tables sit behind one lock, so every operation is atomic and reads
/// are always strongly consistent. Not shared between processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

#[rocket::async_trait]
impl ElectionStore for MemoryStore {
    async fn get(&self, id: ElectionId) -> Result<Option<Election>> {
        Ok(self.lock()?.elections.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Election>> {
        Ok(self.lock()?.elections.values().cloned().collect())
    }

    async fn candidates(&self, election: ElectionId) -> Result<Vec<Candidate>> {
        Ok(self
            .lock()?
            .candidates
            .get(&election)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_election(&self, election: &Election, candidates: &[Candidate]) -> Result<()> {
        // Check everything before writing anything.
        if let Some(orphan) = candidates.iter().find(|c| c.election_id != election.id) {
            return Err(StorageError::Corrupt(format!(
                "candidate {} belongs to election {}, not {}",
                orphan.id, orphan.election_id, election.id
            ))
            .into());
        }
        let mut tables = self.lock()?;
        if tables.elections.contains_key(&election.id) {
            return Err(
                StorageError::Corrupt(format!("election {} already exists", election.id)).into(),
            );
        }
        tables.elections.insert(election.id, election.clone());
        tables.candidates.insert(election.id, candidates.to_vec());
        Ok(())
    }

    async fn update_status(
        &self,
        id: ElectionId,
        from: ElectionStatus,
        to: ElectionStatus,
    ) -> Result<bool> {
        let mut tables = self.lock()?;
        match tables.elections.get_mut(&id) {
            Some(election) if election.status == from => {
                election.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_vote_if_absent(
        &self,
        vote: &Vote,
        key: &UniquenessKey,
    ) -> Result<VoteInsert> {
        if !key.matches(vote) {
            return Err(StorageError::Corrupt(format!(
                "vote {} does not occupy key {key}",
                vote.id
            ))
            .into());
        }
        let mut tables = self.lock()?;
        let active = tables
            .elections
            .get(&vote.election_id)
            .map_or(false, |e| e.status == ElectionStatus::Active);
        if !active {
            return Ok(VoteInsert::Closed);
        }
        if tables.keys.contains_key(key) {
            return Ok(VoteInsert::Occupied);
        }
        let position = tables.votes.len();
        tables.votes.push(vote.clone());
        tables.keys.insert(key.clone(), position);
        Ok(VoteInsert::Inserted)
    }

    async fn find_vote(&self, key: &UniquenessKey) -> Result<Option<Vote>> {
        let tables = self.lock()?;
        Ok(tables
            .keys
            .get(key)
            .and_then(|&position| tables.votes.get(position))
            .cloned())
    }

    async fn votes_by_voter(&self, election: ElectionId, voter: &VoterId) -> Result<Vec<Vote>> {
        Ok(self
            .lock()?
            .votes
            .iter()
            .filter(|v| v.election_id == election && &v.voter_id == voter)
            .cloned()
            .collect())
    }

    async fn votes(&self, election: ElectionId) -> Result<Vec<Vote>> {
        Ok(self
            .lock()?
            .votes
            .iter()
            .filter(|v| v.election_id == election)
            .cloned()
            .collect())
    }

    async fn count_votes_by_candidate(
        &self,
        election: ElectionId,
        _consistency: ReadConsistency,
    ) -> Result<HashMap<CandidateId, u64>> {
        let tables = self.lock()?;
        let mut counts = HashMap::new();
        for vote in tables.votes.iter().filter(|v| v.election_id == election) {
            *counts.entry(vote.candidate_id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

impl MemoryStore {
    /// Total number of stored votes across all elections.
    #[cfg(test)]
    pub(crate) fn vote_count(&self) -> Result<usize> {
        Ok(self.lock()?.votes.len())
    }

    #[cfg(test)]
    pub(crate) fn vote_ids(&self) -> Vec<crate::model::VoteId> {
        self.lock()
            .map(|t| t.votes.iter().map(|v| v.id).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::error::Error;
    use crate::model::{ElectionSpec, Id};

    fn vote_for(election: &Election, candidate: &Candidate, voter: &str) -> (Vote, UniquenessKey) {
        let voter = VoterId::from(voter);
        let key = UniquenessKey::for_vote(election, &voter, candidate.id);
        let vote = Vote {
            id: Id::new(),
            election_id: election.id,
            candidate_id: candidate.id,
            voter_id: voter,
            cast_at: Utc::now(),
        };
        (vote, key)
    }

    #[rocket::async_test]
    async fn orphan_candidates_write_nothing() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (election, mut candidates) = ElectionSpec::example(now).into_election(now);
        candidates[1].election_id = Id::new();
        let result = store.insert_election(&election, &candidates).await;
        assert!(matches!(result, Err(Error::Storage(StorageError::Corrupt(_)))));
        assert!(store.get(election.id).await.unwrap().is_none());
        assert!(store.candidates(election.id).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn status_update_is_compare_and_set() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (election, candidates) = ElectionSpec::example(now).into_election(now);
        store.insert_election(&election, &candidates).await.unwrap();

        use ElectionStatus::*;
        assert!(!store.update_status(election.id, Active, Completed).await.unwrap());
        assert!(store.update_status(election.id, Draft, Active).await.unwrap());
        assert!(!store.update_status(election.id, Draft, Active).await.unwrap());
        assert!(!store.update_status(Id::new(), Draft, Active).await.unwrap());
        assert_eq!(store.get(election.id).await.unwrap().unwrap().status, Active);
    }

    /// Store an election and open it for voting.
    async fn active_election(store: &MemoryStore) -> (Election, Vec<Candidate>) {
        let now = Utc::now();
        let (mut election, candidates) = ElectionSpec::example(now).into_election(now);
        store.insert_election(&election, &candidates).await.unwrap();
        assert!(store
            .update_status(election.id, ElectionStatus::Draft, ElectionStatus::Active)
            .await
            .unwrap());
        election.status = ElectionStatus::Active;
        (election, candidates)
    }

    #[rocket::async_test]
    async fn second_vote_on_same_key_is_refused_and_original_kept() {
        let store = MemoryStore::new();
        let (election, candidates) = active_election(&store).await;

        let (first, key) = vote_for(&election, &candidates[0], "v1");
        let (second, second_key) = vote_for(&election, &candidates[1], "v1");
        assert_eq!(key, second_key);
        assert_eq!(
            store.insert_vote_if_absent(&first, &key).await.unwrap(),
            VoteInsert::Inserted
        );
        assert_eq!(
            store.insert_vote_if_absent(&second, &key).await.unwrap(),
            VoteInsert::Occupied
        );

        assert_eq!(store.find_vote(&key).await.unwrap(), Some(first.clone()));
        assert_eq!(store.vote_ids(), vec![first.id]);
        let counts = store
            .count_votes_by_candidate(election.id, ReadConsistency::Strong)
            .await
            .unwrap();
        assert_eq!(counts.get(&candidates[0].id), Some(&1));
        assert_eq!(counts.get(&candidates[1].id), None);
    }

    #[rocket::async_test]
    async fn mismatched_key_is_rejected() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (election, candidates) = ElectionSpec::example(now).into_election(now);
        let (vote, _) = vote_for(&election, &candidates[0], "v1");
        let (_, other_key) = vote_for(&election, &candidates[0], "v2");
        assert!(store.insert_vote_if_absent(&vote, &other_key).await.is_err());
        assert_eq!(store.vote_count().unwrap(), 0);
    }

    #[rocket::async_test]
    async fn votes_are_refused_unless_election_is_active() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (draft, draft_candidates) = ElectionSpec::example(now).into_election(now);
        store.insert_election(&draft, &draft_candidates).await.unwrap();
        let (vote, key) = vote_for(&draft, &draft_candidates[0], "v1");
        assert_eq!(
            store.insert_vote_if_absent(&vote, &key).await.unwrap(),
            VoteInsert::Closed
        );

        let (election, candidates) = active_election(&store).await;
        let (early, early_key) = vote_for(&election, &candidates[0], "v1");
        assert_eq!(
            store.insert_vote_if_absent(&early, &early_key).await.unwrap(),
            VoteInsert::Inserted
        );
        assert!(store
            .update_status(election.id, ElectionStatus::Active, ElectionStatus::Completed)
            .await
            .unwrap());
        let (late, late_key) = vote_for(&election, &candidates[1], "v2");
        assert_eq!(
            store.insert_vote_if_absent(&late, &late_key).await.unwrap(),
            VoteInsert::Closed
        );
        assert_eq!(store.vote_ids(), vec![early.id]);
    }
}
