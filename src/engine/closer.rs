use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::future::{BoxFuture, FutureExt},
    tokio::sync::Mutex,
    Build, Rocket,
};

use crate::{
    config::Config,
    error::Result,
    model::{Election, ElectionId, ElectionStatus, Identity},
    scheduled_task::ScheduledTask,
};

use super::{Engine, LifecycleController};

/// Map from election IDs to closer tasks.
type TaskMap = HashMap<ElectionId, ScheduledTask<()>>;

/// Election closers: scheduled tasks that complete active elections when
/// their voting window ends.
pub struct ElectionClosers {
    lifecycle: LifecycleController,
    retry_interval: Duration,
    tasks: Arc<Mutex<TaskMap>>,
}

impl ElectionClosers {
    pub fn new(lifecycle: LifecycleController, retry_interval: Duration) -> Self {
        Self {
            lifecycle,
            retry_interval,
            tasks: Default::default(),
        }
    }

    /// Does the given election have a closer scheduled?
    pub async fn has_closer(&self, election: ElectionId) -> bool {
        self.tasks.lock().await.contains_key(&election)
    }

    /// Schedule a closer for every active election.
    pub async fn schedule_active(&self) -> Result<usize> {
        let active = self
            .lifecycle
            .list_elections(&Identity::system(), Some(ElectionStatus::Active))
            .await?;
        for election in &active {
            self.schedule(election).await;
        }
        Ok(active.len())
    }

    /// Schedule a closer for the given election at its end date.
    /// If one already exists, it is rescheduled.
    pub async fn schedule(&self, election: &Election) {
        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.remove(&election.id) {
            task.cancel().await;
        }
        let task = Self::closer(
            election.id,
            self.lifecycle.clone(),
            self.retry_interval,
            self.tasks.clone(),
        );
        tasks.insert(
            election.id,
            ScheduledTask::new(task, election.end_date, self.lifecycle.clock()),
        );
        debug!(
            "Election {} will be closed at {}",
            election.id, election.end_date
        );
    }

    /// Drop the closer for an election that was completed by hand.
    /// Does nothing if there is none.
    pub async fn cancel(&self, election: ElectionId) {
        if let Some(task) = self.tasks.lock().await.remove(&election) {
            task.cancel().await;
            trace!("Cancelled closer for election {election}");
        }
    }

    /// Complete the given election, rescheduling itself on a transient failure.
    /// Recursive, hence the `BoxFuture`.
    fn closer(
        election_id: ElectionId,
        lifecycle: LifecycleController,
        retry_interval: Duration,
        tasks: Arc<Mutex<TaskMap>>,
    ) -> BoxFuture<'static, ()> {
        async move {
            debug!("Running closer for election {election_id}");
            let result = lifecycle.complete(&Identity::system(), election_id).await;
            let mut tasks_locked = tasks.lock().await;
            match result {
                Ok(_) => {
                    tasks_locked.remove(&election_id);
                    info!("Election {election_id} closed at the end of its voting window");
                }
                Err(e) if e.is_retryable() => {
                    error!("Closer for election {election_id} failed: {e}");
                    let retry_at: DateTime<Utc> = lifecycle.clock().now() + retry_interval;
                    let retry = Self::closer(
                        election_id,
                        lifecycle.clone(),
                        retry_interval,
                        tasks.clone(),
                    );
                    let task = ScheduledTask::new(retry, retry_at, lifecycle.clock());
                    tasks_locked.insert(election_id, task);
                    warn!(
                        "Failed closer will be retried in {} seconds",
                        retry_interval.num_seconds()
                    );
                }
                Err(e) => {
                    // Deleted, or moved on by someone else; nothing left to do.
                    tasks_locked.remove(&election_id);
                    warn!("Closer for election {election_id} gave up: {e}");
                }
            }
        }
        .boxed()
    }
}

/// A fairing that schedules closers for all active elections during Rocket
/// ignition, and places an `ElectionClosers` into managed state.
/// Depends on the `Engine` and `Config` being in managed state already.
pub struct ElectionCloserFairing;

#[rocket::async_trait]
impl Fairing for ElectionCloserFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Closers",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        info!("Scheduling election closers...");
        let (engine, config) = match (rocket.state::<Engine>(), rocket.state::<Config>()) {
            (Some(engine), Some(config)) => (engine, config),
            _ => {
                error!("Engine and config must be available before scheduling closers");
                return Err(rocket);
            }
        };
        let closers = ElectionClosers::new(engine.lifecycle.clone(), config.close_retry());
        match closers.schedule_active().await {
            Ok(n) => info!("...{n} election closers scheduled!"),
            Err(e) => {
                error!("Failed to schedule election closers: {e}");
                return Err(rocket);
            }
        }
        Ok(rocket.manage(closers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rocket::tokio::time::{sleep, Duration as StdDuration};

    use crate::clock::{Clock, ManualClock};
    use crate::error::Error;
    use crate::model::ElectionSpec;
    use crate::notify::LogDispatcher;
    use crate::store::{ElectionStore, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, ManualClock, Engine) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::default();
        let engine = Engine::new(store.clone(), Arc::new(LogDispatcher), Arc::new(clock.clone()));
        (store, clock, engine)
    }

    async fn wait_for_status(store: &MemoryStore, id: ElectionId, status: ElectionStatus) -> bool {
        for _ in 0..200 {
            if store.get(id).await.unwrap().map(|e| e.status) == Some(status) {
                return true;
            }
            sleep(StdDuration::from_millis(10)).await;
        }
        false
    }

    #[rocket::async_test]
    async fn overdue_election_is_closed() {
        let (store, clock, engine) = setup();
        let admin = Identity::admin_example();
        let details = engine
            .lifecycle
            .create_election(&admin, ElectionSpec::example(clock.now()))
            .await
            .unwrap();
        let election = engine.lifecycle.activate(&admin, details.election.id).await.unwrap();

        let closers = ElectionClosers::new(engine.lifecycle.clone(), Duration::seconds(300));
        clock.set(election.end_date + Duration::seconds(1));
        assert_eq!(closers.schedule_active().await.unwrap(), 1);

        assert!(wait_for_status(&store, election.id, ElectionStatus::Completed).await);
        // The closer removes itself once done.
        for _ in 0..200 {
            if !closers.has_closer(election.id).await {
                break;
            }
            sleep(StdDuration::from_millis(10)).await;
        }
        assert!(!closers.has_closer(election.id).await);
    }

    #[rocket::async_test]
    async fn cancelled_closer_leaves_election_alone() {
        let (store, clock, engine) = setup();
        let admin = Identity::admin_example();
        let details = engine
            .lifecycle
            .create_election(&admin, ElectionSpec::example(clock.now()))
            .await
            .unwrap();
        let election = engine.lifecycle.activate(&admin, details.election.id).await.unwrap();

        let closers = ElectionClosers::new(engine.lifecycle.clone(), Duration::seconds(300));
        closers.schedule(&election).await;
        assert!(closers.has_closer(election.id).await);
        closers.cancel(election.id).await;
        assert!(!closers.has_closer(election.id).await);

        let stored = store.get(election.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ElectionStatus::Active);
    }

    #[rocket::async_test]
    async fn closer_on_completed_election_gives_up_quietly() {
        let (store, clock, engine) = setup();
        let admin = Identity::admin_example();
        let details = engine
            .lifecycle
            .create_election(&admin, ElectionSpec::example(clock.now()))
            .await
            .unwrap();
        let id = details.election.id;
        let closers = ElectionClosers::new(engine.lifecycle.clone(), Duration::seconds(300));

        // A draft cannot be completed, so the closer must not retry.
        clock.set(details.election.end_date + Duration::seconds(1));
        closers.schedule(&details.election).await;
        for _ in 0..200 {
            if !closers.has_closer(id).await {
                break;
            }
            sleep(StdDuration::from_millis(10)).await;
        }
        assert!(!closers.has_closer(id).await);
        assert_eq!(
            store.get(id).await.unwrap().unwrap().status,
            ElectionStatus::Draft
        );
        assert!(matches!(
            engine.lifecycle.complete(&admin, id).await,
            Err(Error::InvalidTransition { .. })
        ));
    }
}
