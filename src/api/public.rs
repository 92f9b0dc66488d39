use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::Engine,
    error::Result,
    model::{
        Election, ElectionDetails, ElectionId, ElectionResult, ElectionStatus, Identity,
        ScheduleEntry, Tally,
    },
};

pub fn routes() -> Vec<Route> {
    routes![list_elections, get_election, get_tally, get_schedule, get_results]
}

#[get("/elections?<status>")]
async fn list_elections(
    identity: Identity,
    status: Option<ElectionStatus>,
    engine: &State<Engine>,
) -> Result<Json<Vec<Election>>> {
    let elections = engine.lifecycle.list_elections(&identity, status).await?;
    Ok(Json(elections))
}

#[get("/elections/<election_id>")]
async fn get_election(
    identity: Identity,
    election_id: ElectionId,
    engine: &State<Engine>,
) -> Result<Json<ElectionDetails>> {
    let details = engine.lifecycle.get_election(&identity, election_id).await?;
    Ok(Json(details))
}

#[get("/elections/<election_id>/tally")]
async fn get_tally(
    identity: Identity,
    election_id: ElectionId,
    engine: &State<Engine>,
) -> Result<Json<Tally>> {
    let tally = engine.tally.compute_tally(&identity, election_id).await?;
    Ok(Json(tally))
}

#[get("/schedule")]
async fn get_schedule(
    identity: Identity,
    engine: &State<Engine>,
) -> Result<Json<Vec<ScheduleEntry>>> {
    let schedule = engine.lifecycle.election_schedule(&identity).await?;
    Ok(Json(schedule))
}

#[get("/results")]
async fn get_results(
    identity: Identity,
    engine: &State<Engine>,
) -> Result<Json<Vec<ElectionResult>>> {
    let results = engine.tally.completed_results(&identity).await?;
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, local::asynchronous::Client};

    use crate::{
        api::auth::AuthCookie,
        clock::{Clock, ManualClock},
        model::{ElectionSpec, Role},
    };

    use super::*;

    /// Create one draft and one active election, returning their IDs.
    async fn draft_and_active(engine: &Engine, clock: &ManualClock) -> (ElectionId, ElectionId) {
        let admin = Identity::admin_example();
        let draft = engine
            .lifecycle
            .create_election(&admin, ElectionSpec::example(clock.now()))
            .await
            .unwrap()
            .election
            .id;
        let active = engine
            .lifecycle
            .create_election(&admin, ElectionSpec::multi_vote_example(clock.now()))
            .await
            .unwrap()
            .election
            .id;
        engine.lifecycle.activate(&admin, active).await.unwrap();
        (draft, active)
    }

    #[backend_test(student)]
    async fn students_list_only_published(
        client: Client,
        auth: AuthCookie,
        engine: Engine,
        clock: ManualClock,
    ) {
        let (draft, active) = draft_and_active(&engine, &clock).await;

        let response = client
            .get(uri!(list_elections(_)))
            .cookie(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let elections: Vec<Election> = response.into_json().await.unwrap();
        let ids: Vec<_> = elections.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![active]);

        let response = client
            .get(uri!(get_election(draft)))
            .cookie(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());

        let response = client
            .get(uri!(get_schedule))
            .cookie(auth.clone())
            .dispatch()
            .await;
        let schedule: Vec<ScheduleEntry> = response.into_json().await.unwrap();
        assert_eq!(schedule.len(), 1);
    }

    #[backend_test(admin)]
    async fn admins_filter_by_status(
        client: Client,
        auth: AuthCookie,
        engine: Engine,
        clock: ManualClock,
    ) {
        let (draft, _) = draft_and_active(&engine, &clock).await;

        let response = client
            .get("/elections?status=draft")
            .cookie(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let elections: Vec<Election> = response.into_json().await.unwrap();
        assert_eq!(elections.len(), 1);
        assert_eq!(elections[0].id, draft);

        let response = client
            .get(uri!(get_election(draft)))
            .cookie(auth.clone())
            .dispatch()
            .await;
        let details: ElectionDetails = response.into_json().await.unwrap();
        assert_eq!(details.candidates.len(), 2);
    }

    #[backend_test(student)]
    async fn tally_hidden_until_completed(
        client: Client,
        auth: AuthCookie,
        engine: Engine,
        clock: ManualClock,
    ) {
        let (_, active) = draft_and_active(&engine, &clock).await;
        let response = client
            .get(uri!(get_tally(active)))
            .cookie(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        engine
            .lifecycle
            .complete(&Identity::admin_example(), active)
            .await
            .unwrap();
        let response = client
            .get(uri!(get_tally(active)))
            .cookie(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let tally: Tally = response.into_json().await.unwrap();
        assert_eq!(tally.counts.len(), 3);
        assert_eq!(tally.total, 0);
        assert!(tally.is_final());

        let response = client
            .get(uri!(get_results))
            .cookie(auth.clone())
            .dispatch()
            .await;
        let results: Vec<ElectionResult> = response.into_json().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].election.id, active);
    }

    #[backend_test(admin)]
    async fn admins_preview_running_tally(
        client: Client,
        auth: AuthCookie,
        engine: Engine,
        clock: ManualClock,
    ) {
        let (_, active) = draft_and_active(&engine, &clock).await;
        let details = engine
            .lifecycle
            .get_election(&Identity::admin_example(), active)
            .await
            .unwrap();
        clock.set(details.election.start_date);
        let voter = Identity::new("v1", Role::Student);
        engine
            .ledger
            .cast_vote(&voter, active, details.candidates[2].id)
            .await
            .unwrap();

        let response = client
            .get(uri!(get_tally(active)))
            .cookie(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let tally: Tally = response.into_json().await.unwrap();
        assert_eq!(tally.count_for(details.candidates[2].id), Some(1));
        assert!(!tally.is_final());
    }
}
