use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    engine::{ElectionClosers, Engine},
    error::Result,
    model::{Election, ElectionDetails, ElectionId, ElectionSpec, ElectionStatus, Identity},
};

pub fn routes() -> Vec<Route> {
    routes![create_election, activate_election, complete_election, set_status]
}

/// Body of a generic status change request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ElectionStatus,
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    identity: Identity,
    spec: Json<ElectionSpec>,
    engine: &State<Engine>,
) -> Result<Json<ElectionDetails>> {
    let details = engine
        .lifecycle
        .create_election(&identity, spec.into_inner())
        .await?;
    Ok(Json(details))
}

#[post("/elections/<election_id>/activate")]
async fn activate_election(
    identity: Identity,
    election_id: ElectionId,
    engine: &State<Engine>,
    closers: &State<ElectionClosers>,
) -> Result<Json<Election>> {
    change_status(&identity, election_id, ElectionStatus::Active, engine, closers).await
}

#[post("/elections/<election_id>/complete")]
async fn complete_election(
    identity: Identity,
    election_id: ElectionId,
    engine: &State<Engine>,
    closers: &State<ElectionClosers>,
) -> Result<Json<Election>> {
    change_status(&identity, election_id, ElectionStatus::Completed, engine, closers).await
}

#[put("/elections/<election_id>/status", data = "<change>", format = "json")]
async fn set_status(
    identity: Identity,
    election_id: ElectionId,
    change: Json<StatusChange>,
    engine: &State<Engine>,
    closers: &State<ElectionClosers>,
) -> Result<Json<Election>> {
    change_status(&identity, election_id, change.status, engine, closers).await
}

/// Run a transition and keep the automatic closer in step with it.
async fn change_status(
    identity: &Identity,
    election_id: ElectionId,
    target: ElectionStatus,
    engine: &Engine,
    closers: &ElectionClosers,
) -> Result<Json<Election>> {
    let election = engine
        .lifecycle
        .transition(identity, election_id, target)
        .await?;
    match election.status {
        ElectionStatus::Active => {
            if !closers.has_closer(election.id).await {
                closers.schedule(&election).await;
            }
        }
        ElectionStatus::Completed => closers.cancel(election.id).await,
        ElectionStatus::Draft => {}
    }
    Ok(Json(election))
}
