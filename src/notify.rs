//! Lifecycle notifications.
//!
//! The engine tells a [`NotificationDispatcher`] about lifecycle events and
//! moves on: dispatch is best-effort, and a failure is the dispatcher's to
//! log, never the caller's to handle.

use std::fmt::Display;

use chrono::Utc;
use mongodb::{bson::oid::ObjectId, Database};
use serde::{Deserialize, Serialize};

use crate::model::{
    mongodb::{Coll, NotificationDoc, NotificationType},
    Election, ElectionId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    ElectionActivated,
    ElectionCompleted,
}

impl Display for LifecycleEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ElectionActivated => "election_activated",
            Self::ElectionCompleted => "election_completed",
        })
    }
}

/// Something that happened to an election that others may want to know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub kind: LifecycleEventKind,
    pub election_id: ElectionId,
    pub title: String,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleEventKind, election: &Election) -> Self {
        Self {
            kind,
            election_id: election.id,
            title: election.title.clone(),
        }
    }
}

#[rocket::async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Fire-and-forget. Implementations log their own failures.
    async fn notify(&self, event: LifecycleEvent);
}

/// Writes events to the log and nowhere else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[rocket::async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify(&self, event: LifecycleEvent) {
        info!(
            "Lifecycle event {} for election {} ({})",
            event.kind, event.election_id, event.title
        );
    }
}

/// Appends a broadcast notification document per event, for clients to poll.
pub struct MongoDispatcher {
    notifications: Coll<NotificationDoc>,
}

impl MongoDispatcher {
    pub fn new(db: &Database) -> Self {
        Self {
            notifications: Coll::from_db(db),
        }
    }

    fn to_doc(event: &LifecycleEvent) -> NotificationDoc {
        let (kind, title, message) = match event.kind {
            LifecycleEventKind::ElectionActivated => (
                NotificationType::Info,
                format!("Voting is open: {}", event.title),
                format!("Voting for \"{}\" is now open. Cast your vote!", event.title),
            ),
            LifecycleEventKind::ElectionCompleted => (
                NotificationType::Result,
                format!("Results are in: {}", event.title),
                format!("\"{}\" has closed and its results are available.", event.title),
            ),
        };
        NotificationDoc {
            id: ObjectId::new(),
            election_id: event.election_id.oid(),
            kind,
            title,
            message,
            action_url: Some(format!("/elections/{}", event.election_id)),
            created_at: Utc::now(),
        }
    }
}

#[rocket::async_trait]
impl NotificationDispatcher for MongoDispatcher {
    async fn notify(&self, event: LifecycleEvent) {
        let doc = Self::to_doc(&event);
        match self.notifications.insert_one(doc, None).await {
            Ok(_) => debug!("Stored {} notification for election {}", event.kind, event.election_id),
            Err(e) => warn!(
                "Failed to store {} notification for election {}: {e}",
                event.kind, event.election_id
            ),
        }
    }
}

/// Records every event it receives, for inspection in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: std::sync::Mutex<Vec<LifecycleEvent>>,
}

#[cfg(test)]
impl RecordingDispatcher {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[rocket::async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }
}
