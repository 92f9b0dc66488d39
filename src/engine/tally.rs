use crate::error::{Error, Result};
use crate::model::{ElectionId, ElectionResult, ElectionStatus, Identity, Tally};
use crate::store::{ReadConsistency, SharedStore};

use super::lifecycle::LifecycleController;

/// Computes tallies from the ledger, and decides who may see them.
#[derive(Clone)]
pub struct TallyEngine {
    store: SharedStore,
    lifecycle: LifecycleController,
}

impl TallyEngine {
    pub fn new(store: SharedStore, lifecycle: LifecycleController) -> Self {
        Self { store, lifecycle }
    }

    /// Per-candidate vote counts for an election, zero-filled.
    ///
    /// Admins may preview the tally at any stage. Everyone else only sees it
    /// once the election is completed. Completed tallies are always read with
    /// strong consistency, so repeated reads agree.
    pub async fn compute_tally(&self, identity: &Identity, id: ElectionId) -> Result<Tally> {
        let election = self.lifecycle.visible_election(identity, id).await?;
        let completed = election.status == ElectionStatus::Completed;
        if !completed && !identity.is_admin() {
            return Err(Error::Unauthorized(format!(
                "results of election {id} are not available until it is completed"
            )));
        }
        let consistency = if completed {
            ReadConsistency::Strong
        } else {
            ReadConsistency::Relaxed
        };

        let candidates = self.store.candidates(id).await?;
        let counts = self.store.count_votes_by_candidate(id, consistency).await?;
        Ok(Tally::from_counts(&election, &candidates, &counts))
    }

    /// Every completed election with its final tally, most recently ended first.
    pub async fn completed_results(&self, identity: &Identity) -> Result<Vec<ElectionResult>> {
        let mut elections = self
            .lifecycle
            .list_elections(identity, Some(ElectionStatus::Completed))
            .await?;
        elections.sort_by(|a, b| b.end_date.cmp(&a.end_date));

        let mut results = Vec::with_capacity(elections.len());
        for election in elections {
            let candidates = self.store.candidates(election.id).await?;
            let counts = self
                .store
                .count_votes_by_candidate(election.id, ReadConsistency::Strong)
                .await?;
            let tally = Tally::from_counts(&election, &candidates, &counts);
            results.push(ElectionResult {
                election,
                candidates,
                tally,
            });
        }
        Ok(results)
    }
}
