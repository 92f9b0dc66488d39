use std::collections::HashMap;
use std::time::Duration as StdDuration;

use mongodb::{
    bson::{doc, Bson, Document},
    error::{Error as DbError, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{
        Acknowledgment, AggregateOptions, FindOneOptions, FindOptions, ReadConcern,
        ReadPreference, ReadPreferenceOptions, SelectionCriteria, TransactionOptions,
        WriteConcern,
    },
    Client, Database,
};
use rocket::{futures::TryStreamExt, tokio::time::sleep};

use crate::error::{Result, StorageError};
use crate::model::{
    mongodb::{
        ensure_indexes_exist, is_duplicate_key_error, CandidateDoc, Coll, ElectionDoc, VoteDoc,
    },
    Candidate, CandidateId, Election, ElectionId, ElectionStatus, UniquenessKey, Vote, VoterId,
};

use super::{ElectionStore, ReadConsistency, VoteInsert};

/// Attempts at a vote transaction before a write conflict is given up on.
/// Votes in one election all write its document, so they conflict with each
/// other under load.
const VOTE_TRANSACTION_ATTEMPTS: u64 = 32;

/// A store backed by MongoDB, safe to share between many server processes.
///
/// Vote uniqueness is enforced by a unique index on
/// `(election_id, uniqueness_key)`, and status changes are conditional
/// updates, so no in-process coordination is needed for correctness.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Connect to `uri`, use database `db_name`, and make sure the indexes exist.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Self::from_client(client, db_name).await
    }

    pub async fn from_client(client: Client, db_name: &str) -> Result<Self> {
        let db = client.database(db_name);
        ensure_indexes_exist(&db).await?;
        Ok(Self { client, db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn elections(&self) -> Coll<ElectionDoc> {
        Coll::from_db(&self.db)
    }

    fn candidate_docs(&self) -> Coll<CandidateDoc> {
        Coll::from_db(&self.db)
    }

    fn vote_docs(&self) -> Coll<VoteDoc> {
        Coll::from_db(&self.db)
    }

    fn primary() -> SelectionCriteria {
        SelectionCriteria::ReadPreference(ReadPreference::Primary)
    }

    /// One run of the vote transaction. Driver errors are returned as they
    /// are so the caller can retry transient ones.
    async fn try_insert_vote(
        &self,
        vote: &Vote,
        key: &UniquenessKey,
    ) -> std::result::Result<VoteInsert, DbError> {
        // The ledger is the source of truth, so only report success once the
        // write is durable on a majority.
        let options = TransactionOptions::builder()
            .write_concern(
                WriteConcern::builder()
                    .w(Acknowledgment::Majority)
                    .journal(true)
                    .build(),
            )
            .build();
        // Dropping the session before commit aborts the transaction.
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(options).await?;

        // Writing the election document makes this transaction conflict with
        // a concurrent status change, so a vote cannot commit once the
        // election has left `active`.
        let gate = self
            .elections()
            .update_one_with_session(
                doc! {
                    "_id": vote.election_id.oid(),
                    "status": ElectionStatus::Active,
                },
                doc! { "$inc": { "vote_seq": 1_i64 } },
                None,
                &mut session,
            )
            .await?;
        if gate.matched_count == 0 {
            session.abort_transaction().await?;
            return Ok(VoteInsert::Closed);
        }

        match self
            .vote_docs()
            .insert_one_with_session(VoteDoc::new(vote, key), None, &mut session)
            .await
        {
            Ok(_) => {}
            Err(e) if is_duplicate_key_error(&e) => return Ok(VoteInsert::Occupied),
            Err(e) => return Err(e),
        }

        loop {
            match session.commit_transaction().await {
                Err(e) if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) => {
                    trace!("Retrying commit of vote {}: {e}", vote.id);
                }
                result => return result.map(|_| VoteInsert::Inserted),
            }
        }
    }
}

/// Read settings for the requested consistency level.
fn read_settings(consistency: ReadConsistency) -> (SelectionCriteria, ReadConcern) {
    match consistency {
        ReadConsistency::Strong => (MongoStore::primary(), ReadConcern::majority()),
        ReadConsistency::Relaxed => (
            SelectionCriteria::ReadPreference(ReadPreference::SecondaryPreferred {
                options: ReadPreferenceOptions::default(),
            }),
            ReadConcern::local(),
        ),
    }
}

fn count_from_bson(value: Option<&Bson>) -> Result<u64> {
    let count = match value {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        other => {
            return Err(StorageError::Corrupt(format!("bad vote count {other:?}")).into());
        }
    };
    u64::try_from(count).map_err(|_| StorageError::Corrupt(format!("negative count {count}")).into())
}

#[rocket::async_trait]
impl ElectionStore for MongoStore {
    async fn get(&self, id: ElectionId) -> Result<Option<Election>> {
        let options = FindOneOptions::builder()
            .selection_criteria(Self::primary())
            .build();
        let election = self
            .elections()
            .find_one(doc! { "_id": id.oid() }, options)
            .await?;
        Ok(election.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<Election>> {
        let elections: Vec<ElectionDoc> = self
            .elections()
            .find(None, None)
            .await?
            .try_collect()
            .await?;
        Ok(elections.into_iter().map(Into::into).collect())
    }

    async fn candidates(&self, election: ElectionId) -> Result<Vec<Candidate>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let candidates: Vec<CandidateDoc> = self
            .candidate_docs()
            .find(doc! { "election_id": election.oid() }, options)
            .await?
            .try_collect()
            .await?;
        Ok(candidates.into_iter().map(Into::into).collect())
    }

    async fn insert_election(&self, election: &Election, candidates: &[Candidate]) -> Result<()> {
        if let Some(orphan) = candidates.iter().find(|c| c.election_id != election.id) {
            return Err(StorageError::Corrupt(format!(
                "candidate {} belongs to election {}, not {}",
                orphan.id, orphan.election_id, election.id
            ))
            .into());
        }

        // Atomically insert the election and its candidates. Dropping the
        // session before commit aborts the transaction.
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        self.elections()
            .insert_one_with_session(ElectionDoc::from(election), None, &mut session)
            .await?;
        if !candidates.is_empty() {
            let docs = candidates.iter().map(CandidateDoc::from).collect::<Vec<_>>();
            self.candidate_docs()
                .insert_many_with_session(docs, None, &mut session)
                .await?;
        }

        session.commit_transaction().await?;
        Ok(())
    }

    async fn update_status(
        &self,
        id: ElectionId,
        from: ElectionStatus,
        to: ElectionStatus,
    ) -> Result<bool> {
        let filter = doc! {
            "_id": id.oid(),
            "status": from,
        };
        let update = doc! {
            "$set": {
                "status": to,
            }
        };
        let result = self.elections().update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
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
        let mut attempt = 1;
        loop {
            match self.try_insert_vote(vote, key).await {
                Err(e)
                    if e.contains_label(TRANSIENT_TRANSACTION_ERROR)
                        && attempt < VOTE_TRANSACTION_ATTEMPTS =>
                {
                    trace!("Vote {} hit a write conflict (attempt {attempt}): {e}", vote.id);
                    sleep(StdDuration::from_millis(5 * attempt)).await;
                    attempt += 1;
                }
                result => return Ok(result?),
            }
        }
    }

    async fn find_vote(&self, key: &UniquenessKey) -> Result<Option<Vote>> {
        let filter = doc! {
            "election_id": key.election().oid(),
            "uniqueness_key": key.storage_key(),
        };
        let options = FindOneOptions::builder()
            .selection_criteria(Self::primary())
            .build();
        let vote = self.vote_docs().find_one(filter, options).await?;
        Ok(vote.map(Into::into))
    }

    async fn votes_by_voter(&self, election: ElectionId, voter: &VoterId) -> Result<Vec<Vote>> {
        let filter = doc! {
            "election_id": election.oid(),
            "voter_id": voter.as_str(),
        };
        let options = FindOptions::builder()
            .selection_criteria(Self::primary())
            .build();
        let votes: Vec<VoteDoc> = self
            .vote_docs()
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(votes.into_iter().map(Into::into).collect())
    }

    async fn votes(&self, election: ElectionId) -> Result<Vec<Vote>> {
        let votes: Vec<VoteDoc> = self
            .vote_docs()
            .find(doc! { "election_id": election.oid() }, None)
            .await?
            .try_collect()
            .await?;
        Ok(votes.into_iter().map(Into::into).collect())
    }

    async fn count_votes_by_candidate(
        &self,
        election: ElectionId,
        consistency: ReadConsistency,
    ) -> Result<HashMap<CandidateId, u64>> {
        let pipeline = [
            doc! { "$match": { "election_id": election.oid() } },
            doc! { "$group": { "_id": "$candidate_id", "count": { "$sum": 1 } } },
        ];
        let (selection_criteria, read_concern) = read_settings(consistency);
        let options = AggregateOptions::builder()
            .selection_criteria(selection_criteria)
            .read_concern(read_concern)
            .build();
        let groups: Vec<Document> = self
            .vote_docs()
            .aggregate(pipeline, options)
            .await?
            .try_collect()
            .await?;

        let mut counts = HashMap::with_capacity(groups.len());
        for group in groups {
            let candidate = group
                .get_object_id("_id")
                .map_err(|e| StorageError::Corrupt(format!("bad candidate id in tally: {e}")))?;
            counts.insert(candidate.into(), count_from_bson(group.get("count"))?);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use rocket::futures::future::join_all;

    use crate::model::{ElectionSpec, Id};

    /// A store on a fresh, randomly named database, or `None` when no test
    /// database is configured.
    async fn test_store() -> Option<MongoStore> {
        let uri = match std::env::var("TEST_DB_URI") {
            Ok(uri) => uri,
            Err(_) => {
                info!("TEST_DB_URI not set, skipping MongoDB test");
                return None;
            }
        };
        let db_name = format!("test{}", rand::random::<u32>());
        Some(MongoStore::connect(&uri, &db_name).await.unwrap())
    }

    async fn cleanup(store: MongoStore) {
        store.database().drop(None).await.unwrap();
    }

    #[rocket::async_test]
    async fn election_round_trips_with_candidates() {
        let Some(store) = test_store().await else { return };
        let now = Utc::now();
        let (election, candidates) = ElectionSpec::example(now).into_election(now);
        store.insert_election(&election, &candidates).await.unwrap();

        let fetched = store.get(election.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, election.title);
        assert_eq!(fetched.status, ElectionStatus::Draft);
        let fetched_candidates = store.candidates(election.id).await.unwrap();
        assert_eq!(fetched_candidates, candidates);

        cleanup(store).await;
    }

    #[rocket::async_test]
    async fn status_update_is_conditional() {
        let Some(store) = test_store().await else { return };
        let now = Utc::now();
        let (election, candidates) = ElectionSpec::example(now).into_election(now);
        store.insert_election(&election, &candidates).await.unwrap();

        use ElectionStatus::*;
        assert!(!store.update_status(election.id, Active, Completed).await.unwrap());
        assert!(store.update_status(election.id, Draft, Active).await.unwrap());
        assert!(!store.update_status(election.id, Draft, Active).await.unwrap());

        cleanup(store).await;
    }

    #[rocket::async_test]
    async fn unique_index_admits_one_concurrent_vote() {
        let Some(store) = test_store().await else { return };
        let now = Utc::now();
        let (election, candidates) = ElectionSpec::example(now).into_election(now);
        store.insert_election(&election, &candidates).await.unwrap();
        assert!(store
            .update_status(election.id, ElectionStatus::Draft, ElectionStatus::Active)
            .await
            .unwrap());

        let voter = VoterId::from("v1");
        let attempts = (0..16).map(|i| {
            let candidate = candidates[i % 2].id;
            let key = UniquenessKey::for_vote(&election, &voter, candidate);
            let vote = Vote {
                id: Id::new(),
                election_id: election.id,
                candidate_id: candidate,
                voter_id: voter.clone(),
                cast_at: now,
            };
            let store = store.clone();
            async move { store.insert_vote_if_absent(&vote, &key).await.unwrap() }
        });
        let outcomes = join_all(attempts).await;
        let inserted = outcomes.iter().filter(|&&o| o == VoteInsert::Inserted).count();
        let occupied = outcomes.iter().filter(|&&o| o == VoteInsert::Occupied).count();
        assert_eq!((inserted, occupied), (1, 15));
        assert_eq!(store.votes(election.id).await.unwrap().len(), 1);
        assert_eq!(
            store.get(election.id).await.unwrap().unwrap().status,
            ElectionStatus::Active
        );

        let counts = store
            .count_votes_by_candidate(election.id, ReadConsistency::Strong)
            .await
            .unwrap();
        assert_eq!(counts.values().sum::<u64>(), 1);

        cleanup(store).await;
    }

    #[rocket::async_test]
    async fn completed_election_takes_no_votes() {
        let Some(store) = test_store().await else { return };
        let now = Utc::now();
        let (election, candidates) = ElectionSpec::example(now).into_election(now);
        store.insert_election(&election, &candidates).await.unwrap();

        let voter = VoterId::from("v1");
        let key = UniquenessKey::for_vote(&election, &voter, candidates[0].id);
        let vote = Vote {
            id: Id::new(),
            election_id: election.id,
            candidate_id: candidates[0].id,
            voter_id: voter,
            cast_at: now,
        };
        assert_eq!(
            store.insert_vote_if_absent(&vote, &key).await.unwrap(),
            VoteInsert::Closed
        );

        use ElectionStatus::*;
        assert!(store.update_status(election.id, Draft, Active).await.unwrap());
        assert!(store.update_status(election.id, Active, Completed).await.unwrap());
        assert_eq!(
            store.insert_vote_if_absent(&vote, &key).await.unwrap(),
            VoteInsert::Closed
        );
        assert!(store.votes(election.id).await.unwrap().is_empty());

        cleanup(store).await;
    }
}
