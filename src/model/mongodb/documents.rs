//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in a DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.

use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};

use crate::model::{Candidate, Election, ElectionStatus, UniquenessKey, Vote, VoterId};

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        Bson::String(status.as_str().to_string())
    }
}

/// An election, as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_date: DateTime<Utc>,
    pub status: ElectionStatus,
    pub allow_multiple_votes: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<&Election> for ElectionDoc {
    fn from(election: &Election) -> Self {
        Self {
            id: election.id.oid(),
            title: election.title.clone(),
            description: election.description.clone(),
            start_date: election.start_date,
            end_date: election.end_date,
            status: election.status,
            allow_multiple_votes: election.allow_multiple_votes,
            created_at: election.created_at,
        }
    }
}

impl From<ElectionDoc> for Election {
    fn from(doc: ElectionDoc) -> Self {
        Self {
            id: doc.id.into(),
            title: doc.title,
            description: doc.description,
            start_date: doc.start_date,
            end_date: doc.end_date,
            status: doc.status,
            allow_multiple_votes: doc.allow_multiple_votes,
            created_at: doc.created_at,
        }
    }
}

/// A candidate, as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub election_id: ObjectId,
    pub name: String,
    pub platform: String,
    pub image_url: Option<String>,
}

impl From<&Candidate> for CandidateDoc {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id.oid(),
            election_id: candidate.election_id.oid(),
            name: candidate.name.clone(),
            platform: candidate.platform.clone(),
            image_url: candidate.image_url.clone(),
        }
    }
}

impl From<CandidateDoc> for Candidate {
    fn from(doc: CandidateDoc) -> Self {
        Self {
            id: doc.id.into(),
            election_id: doc.election_id.into(),
            name: doc.name,
            platform: doc.platform,
            image_url: doc.image_url,
        }
    }
}

/// A vote, as stored in the database, carrying the uniqueness key it occupies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub election_id: ObjectId,
    pub candidate_id: ObjectId,
    pub voter_id: String,
    /// Unique per election; see [`UniquenessKey::storage_key`].
    pub uniqueness_key: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl VoteDoc {
    pub fn new(vote: &Vote, key: &UniquenessKey) -> Self {
        Self {
            id: vote.id.oid(),
            election_id: vote.election_id.oid(),
            candidate_id: vote.candidate_id.oid(),
            voter_id: vote.voter_id.to_string(),
            uniqueness_key: key.storage_key(),
            cast_at: vote.cast_at,
        }
    }
}

impl From<VoteDoc> for Vote {
    fn from(doc: VoteDoc) -> Self {
        Self {
            id: doc.id.into(),
            election_id: doc.election_id.into(),
            candidate_id: doc.candidate_id.into(),
            voter_id: VoterId::from(doc.voter_id),
            cast_at: doc.cast_at,
        }
    }
}

/// The category a notification is shown under.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Result,
    Info,
}

/// A broadcast notification, as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub election_id: ObjectId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}
