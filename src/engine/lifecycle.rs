use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{
    election::MIN_CANDIDATES, Election, ElectionDetails, ElectionId, ElectionSpec,
    ElectionStatus, Identity, ScheduleEntry,
};
use crate::notify::{LifecycleEvent, LifecycleEventKind, NotificationDispatcher};
use crate::store::SharedStore;

/// Owns the election state machine `draft -> active -> completed`, and is the
/// only component that creates elections or changes their status.
#[derive(Clone)]
pub struct LifecycleController {
    store: SharedStore,
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl LifecycleController {
    pub fn new(
        store: SharedStore,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Create a draft election with its candidates. Admin only.
    ///
    /// Nothing is written unless every rule passes, and the election and its
    /// candidates are written atomically.
    pub async fn create_election(
        &self,
        identity: &Identity,
        spec: ElectionSpec,
    ) -> Result<ElectionDetails> {
        identity.require_admin("create elections")?;
        let now = self.clock.now();
        spec.validate(now)?;

        let (election, candidates) = spec.into_election(now);
        self.store.insert_election(&election, &candidates).await?;
        info!(
            "Election {} '{}' created by {} with {} candidates",
            election.id,
            election.title,
            identity.voter_id,
            candidates.len()
        );
        Ok(ElectionDetails {
            election,
            candidates,
        })
    }

    /// Move an election to `target`. Admin only.
    ///
    /// Asking for the state the election is already in succeeds without
    /// effect, except for `draft` which is never a target. This includes
    /// losing a race to a concurrent identical transition: the loser neither
    /// re-validates nor re-emits the lifecycle event.
    pub async fn transition(
        &self,
        identity: &Identity,
        id: ElectionId,
        target: ElectionStatus,
    ) -> Result<Election> {
        identity.require_admin(&format!("move elections to {target}"))?;
        let election = self.store.get(id).await?.ok_or_else(|| election_not_found(id))?;

        if election.status == target && target.predecessor().is_some() {
            debug!("Election {id} is already {target}");
            return Ok(election);
        }
        if election.status.successor() != Some(target) {
            return Err(Error::InvalidTransition {
                election: id,
                from: election.status,
                to: target,
            });
        }
        if target == ElectionStatus::Active {
            let candidates = self.store.candidates(id).await?.len();
            if candidates < MIN_CANDIDATES {
                return Err(Error::PreconditionFailed(format!(
                    "election {id} needs at least {MIN_CANDIDATES} candidates to open, has {candidates}"
                )));
            }
        }

        let from = election.status;
        if !self.store.update_status(id, from, target).await? {
            // Someone else moved it first; see where it ended up.
            let current = self.store.get(id).await?.ok_or_else(|| election_not_found(id))?;
            return if current.status == target {
                debug!("Election {id} was concurrently moved to {target}");
                Ok(current)
            } else {
                Err(Error::InvalidTransition {
                    election: id,
                    from: current.status,
                    to: target,
                })
            };
        }

        let election = Election {
            status: target,
            ..election
        };
        info!(
            "Election {id} moved {from} -> {target} by {}",
            identity.voter_id
        );
        self.emit(&election).await;
        Ok(election)
    }

    pub async fn activate(&self, identity: &Identity, id: ElectionId) -> Result<Election> {
        self.transition(identity, id, ElectionStatus::Active).await
    }

    pub async fn complete(&self, identity: &Identity, id: ElectionId) -> Result<Election> {
        self.transition(identity, id, ElectionStatus::Completed).await
    }

    /// True iff the election is active and the clock is inside its voting window.
    pub fn can_accept_votes(&self, election: &Election) -> bool {
        election.status == ElectionStatus::Active
            && election.is_within_voting_window(self.clock.now())
    }

    /// Fetch an election the caller is allowed to see.
    /// Drafts do not exist as far as students are concerned.
    pub async fn visible_election(&self, identity: &Identity, id: ElectionId) -> Result<Election> {
        match self.store.get(id).await? {
            Some(election) if is_visible_to(&election, identity) => Ok(election),
            _ => Err(election_not_found(id)),
        }
    }

    pub async fn get_election(&self, identity: &Identity, id: ElectionId) -> Result<ElectionDetails> {
        let election = self.visible_election(identity, id).await?;
        let candidates = self.store.candidates(id).await?;
        Ok(ElectionDetails {
            election,
            candidates,
        })
    }

    /// Elections visible to the caller, newest first, optionally filtered by status.
    pub async fn list_elections(
        &self,
        identity: &Identity,
        status: Option<ElectionStatus>,
    ) -> Result<Vec<Election>> {
        let mut elections: Vec<_> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|e| is_visible_to(e, identity))
            .filter(|e| status.map_or(true, |s| e.status == s))
            .collect();
        elections.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(elections)
    }

    /// Elections visible to the caller, in the order they open.
    pub async fn election_schedule(&self, identity: &Identity) -> Result<Vec<ScheduleEntry>> {
        let mut elections: Vec<_> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|e| is_visible_to(e, identity))
            .collect();
        elections.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(elections.iter().map(ScheduleEntry::from).collect())
    }

    /// Tell the dispatcher about a status the election has just reached.
    async fn emit(&self, election: &Election) {
        let kind = match election.status {
            ElectionStatus::Active => LifecycleEventKind::ElectionActivated,
            ElectionStatus::Completed => LifecycleEventKind::ElectionCompleted,
            ElectionStatus::Draft => return,
        };
        self.dispatcher
            .notify(LifecycleEvent::new(kind, election))
            .await;
    }
}

fn is_visible_to(election: &Election, identity: &Identity) -> bool {
    identity.is_admin() || election.status != ElectionStatus::Draft
}

fn election_not_found(id: ElectionId) -> Error {
    Error::not_found(format!("election {id}"))
}
