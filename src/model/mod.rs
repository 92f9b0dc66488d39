//! Domain types shared by the engine, the stores and the API.
//!
//! The types at this level are serialised in an API-friendly way (hex string
//! IDs, RFC 3339 datetimes, camelCase fields). Their database counterparts
//! live in [`mongodb`].

pub mod election;
pub mod id;
pub mod identity;
pub mod mongodb;
pub mod tally;
pub mod vote;

pub use election::{
    Candidate, CandidateSpec, Election, ElectionDetails, ElectionSpec, ElectionStatus,
    ScheduleEntry,
};
pub use id::{CandidateId, ElectionId, Id, VoteId, VoterId};
pub use identity::{Identity, Role};
pub use tally::{ElectionResult, Tally};
pub use vote::{UniquenessKey, Vote, VoteReceipt};
