use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use super::documents::{CandidateDoc, ElectionDoc, NotificationDoc, VoteDoc};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for ElectionDoc {
    const NAME: &'static str = "elections";
}

impl MongoCollection for CandidateDoc {
    const NAME: &'static str = "candidates";
}

impl MongoCollection for VoteDoc {
    const NAME: &'static str = "votes";
}

impl MongoCollection for NotificationDoc {
    const NAME: &'static str = "notifications";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Vote collection: the uniqueness key is what makes double voting
    // impossible across server instances.
    let vote_key_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "uniqueness_key": 1})
        .options(unique)
        .build();
    let vote_voter_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "voter_id": 1})
        .build();
    let vote_candidate_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "candidate_id": 1})
        .build();
    Coll::<VoteDoc>::from_db(db)
        .create_indexes([vote_key_index, vote_voter_index, vote_candidate_index], None)
        .await?;

    // Candidate collection.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"election_id": 1})
        .build();
    Coll::<CandidateDoc>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Election collection.
    let election_index = IndexModel::builder()
        .keys(doc! {"status": 1, "start_date": 1})
        .build();
    Coll::<ElectionDoc>::from_db(db)
        .create_index(election_index, None)
        .await?;

    Ok(())
}
