mod collection;
mod documents;
mod errors;

pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use documents::{CandidateDoc, ElectionDoc, NotificationDoc, NotificationType, VoteDoc};
pub use errors::{is_duplicate_key_error, DUPLICATE_KEY};
