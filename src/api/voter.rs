use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    engine::Engine,
    error::Result,
    model::{CandidateId, ElectionId, Identity, VoteReceipt},
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, my_votes]
}

/// A ballot as submitted by a voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub candidate_id: CandidateId,
}

#[post("/elections/<election_id>/votes", data = "<ballot>", format = "json")]
async fn cast_vote(
    identity: Identity,
    election_id: ElectionId,
    ballot: Json<Ballot>,
    engine: &State<Engine>,
) -> Result<Json<VoteReceipt>> {
    let receipt = engine
        .ledger
        .cast_vote(&identity, election_id, ballot.candidate_id)
        .await?;
    Ok(Json(receipt))
}

#[get("/elections/<election_id>/votes/mine")]
async fn my_votes(
    identity: Identity,
    election_id: ElectionId,
    engine: &State<Engine>,
) -> Result<Json<Vec<CandidateId>>> {
    let candidates = engine.ledger.votes_for(&identity, election_id).await?;
    Ok(Json(candidates))
}
