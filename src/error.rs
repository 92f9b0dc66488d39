use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder, serde::json::Json, Request};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ElectionId, ElectionStatus, VoteId, VoterId};

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the engine can fail with. Every variant is recoverable at the
/// request boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range input; the caller should correct it.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// The caller's role does not permit the operation. Never retried.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// The election is not in a state that permits the operation yet.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    /// An illegal lifecycle move. Never retried.
    #[error("Invalid transition for election {election}: {from} -> {to}")]
    InvalidTransition {
        election: ElectionId,
        from: ElectionStatus,
        to: ElectionStatus,
    },
    /// The voter already holds the uniqueness key; `existing` is the vote holding it.
    #[error("Voter {voter} has already voted in election {election} (vote {existing})")]
    DuplicateVote {
        election: ElectionId,
        voter: VoterId,
        existing: VoteId,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    /// Transient persistence failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("In-memory store lock was poisoned")]
    LockPoisoned,
    #[error("Stored data is inconsistent: {0}")]
    Corrupt(String),
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        Self::Storage(StorageError::Db(err))
    }
}

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Stable tag for this kind of error, used by callers instead of
    /// matching on messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::DuplicateVote { .. } => "duplicate_vote",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage_failure",
        }
    }

    /// Only storage failures are worth retrying; the vote uniqueness
    /// constraint makes a retried `cast_vote` safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Validation(_) => Status::BadRequest,
            Self::Unauthorized(_) => Status::Forbidden,
            Self::PreconditionFailed(_) => Status::PreconditionFailed,
            Self::InvalidTransition { .. } | Self::DuplicateVote { .. } => Status::Conflict,
            Self::NotFound(_) => Status::NotFound,
            Self::Storage(_) => Status::ServiceUnavailable,
        }
    }
}

/// JSON error body returned by the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        match &self {
            Self::Storage(_) => error!("{self}"),
            // Expected under races, not an anomaly.
            Self::DuplicateVote { .. } => debug!("{self}"),
            _ => info!("{self}"),
        }
        let body = ErrorBody::new(self.kind(), self.to_string());
        (self.status(), Json(body)).respond_to(req)
    }
}
