use std::future::Future;

use chrono::{DateTime, Utc};
use rocket::tokio::{
    self,
    task::JoinHandle,
    time::Duration,
};

use crate::clock::Clock;

/// A task that runs once, at a given point in the future, unless cancelled first.
pub struct ScheduledTask<T> {
    handle: JoinHandle<T>,
}

impl<T> ScheduledTask<T>
where
    T: Send + 'static,
{
    /// Schedule `task` to run at `run_at`, as measured by `clock`.
    /// If `run_at` is in the past, the task runs immediately.
    pub fn new<Fut>(task: Fut, run_at: DateTime<Utc>, clock: &dyn Clock) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let delay = delay_until(run_at, clock.now());
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await
        });
        Self { handle }
    }

    /// Cancel the task. Returns true iff it had already completed before we could cancel it.
    pub async fn cancel(self) -> bool {
        self.handle.abort();
        self.handle.await.is_ok()
    }
}

/// Time from `now` until `run_at`; zero if `run_at` has passed.
fn delay_until(run_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (run_at - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration as ChronoDuration;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use crate::clock::ManualClock;

    #[test]
    fn past_times_have_no_delay() {
        let now = Utc::now();
        assert_eq!(delay_until(now - ChronoDuration::hours(1), now), Duration::ZERO);
        assert_eq!(
            delay_until(now + ChronoDuration::seconds(3), now),
            Duration::from_secs(3)
        );
    }

    #[rocket::async_test]
    async fn overdue_task_runs_immediately() {
        let clock = ManualClock::default();
        let task = ScheduledTask::new(async { 42 }, clock.now() - ChronoDuration::days(1), &clock);
        let ran = task.join().await;
        assert_eq!(ran, Some(42));
    }

    #[rocket::async_test]
    async fn cancelled_task_never_runs() {
        let clock = ManualClock::default();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task = ScheduledTask::new(
            async move { flag.store(true, Ordering::SeqCst) },
            clock.now() + ChronoDuration::hours(1),
            &clock,
        );
        assert!(!task.cancel().await);
        assert!(!ran.load(Ordering::SeqCst));
    }

    impl<T: Send + 'static> ScheduledTask<T> {
        async fn join(self) -> Option<T> {
            self.handle.await.ok()
        }
    }
}
