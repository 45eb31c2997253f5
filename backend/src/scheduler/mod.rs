//! Scheduler (§4.8): a fixed set of named jobs, each on its own
//! crontab schedule, run through a cooperative worker pool with
//! at-most-one-instance-per-job locking, cancellation, and crash
//! isolation.
//!
//! Grounded on the teacher's `jobs::start_scheduler`
//! (`tokio_cron_scheduler::JobScheduler` + `Job::new_async`), extended
//! with the per-job overlap lock and `JobRunStore` persistence §4.8
//! requires that the teacher's fire-and-forget jobs don't need.

pub mod jobs;

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Result, TcmError};
use crate::store::{JobOutcome, JobRunStore};

/// One named job's unit of work. `cancel` must be checked between
/// Series and between Episodes (§5 suspension points) so a long job
/// exits cleanly rather than completing a cancelled run.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, cancel: CancellationToken) -> Result<()>;
}

#[derive(Default)]
struct JobLocks {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl JobLocks {
    fn lock_for(&self, job_name: &str) -> Arc<AsyncMutex<()>> {
        self.locks.lock().unwrap().entry(job_name.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

pub struct Scheduler {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    locks: JobLocks,
    job_runs: Arc<dyn JobRunStore>,
    cancel_tokens: SyncMutex<HashMap<String, CancellationToken>>,
}

impl Scheduler {
    pub fn new(job_runs: Arc<dyn JobRunStore>) -> Self {
        Self { handlers: HashMap::new(), locks: JobLocks::default(), job_runs, cancel_tokens: SyncMutex::new(HashMap::new()) }
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    /// Run `job_name` out-of-band right now, sharing the same
    /// at-most-one lock a cron firing would use (§4.8 manual triggers).
    pub async fn trigger(&self, job_name: &str) -> Result<JobOutcome> {
        let handler = self.handlers.get(job_name).cloned().ok_or_else(|| TcmError::NotFound(format!("job {job_name}")))?;
        self.run_once(handler).await
    }

    /// Ask the currently running instance of `job_name`, if any, to
    /// stop at its next cancellation checkpoint.
    pub fn cancel(&self, job_name: &str) {
        if let Some(token) = self.cancel_tokens.lock().unwrap().get(job_name) {
            token.cancel();
        }
    }

    async fn run_once(&self, handler: Arc<dyn JobHandler>) -> Result<JobOutcome> {
        let job_name = handler.name();
        let lock = self.locks.lock_for(job_name);

        let _guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(job = job_name, "previous run still in flight, recording overlap");
                let now = Utc::now();
                self.job_runs.record_start(job_name, now).await?;
                self.job_runs.record_end(job_name, now, now, JobOutcome::Overlap).await?;
                return Ok(JobOutcome::Overlap);
            }
        };

        let cancel = CancellationToken::new();
        self.cancel_tokens.lock().unwrap().insert(job_name.to_string(), cancel.clone());

        let started_at = Utc::now();
        self.job_runs.record_start(job_name, started_at).await?;

        let outcome = match handler.run(cancel.clone()).await {
            _ if cancel.is_cancelled() => JobOutcome::Cancelled,
            Ok(()) => JobOutcome::Ok,
            Err(err) => {
                error!(job = job_name, error = %err, "job failed");
                JobOutcome::Error
            }
        };

        self.cancel_tokens.lock().unwrap().remove(job_name);
        let ended_at = Utc::now();
        self.job_runs.record_end(job_name, started_at, ended_at, outcome).await?;
        Ok(outcome)
    }

    /// Install every `(job_name, cron_expression)` pair from `schedules`
    /// whose name has a registered handler, and start the cron driver.
    /// Missed firings while the process was down are never replayed —
    /// only the next scheduled firing runs (§4.8).
    pub async fn start(self: Arc<Self>, schedules: &[(&'static str, &str)]) -> Result<JobScheduler> {
        let cron_scheduler = JobScheduler::new().await.map_err(|e| TcmError::Other(e.into()))?;

        for (job_name, cron_expr) in schedules {
            let Some(handler) = self.handlers.get(job_name).cloned() else {
                warn!(job = *job_name, "no handler registered for scheduled job, skipping");
                continue;
            };

            let scheduler = self.clone();
            let job = Job::new_async(*cron_expr, move |uuid, mut locked| {
                let scheduler = scheduler.clone();
                let handler = handler.clone();
                Box::pin(async move {
                    if let Err(err) = scheduler.run_once(handler.clone()).await {
                        error!(job = handler.name(), error = %err, "job runner error");
                    }
                    if let Ok(Some(next)) = locked.next_tick_for_job(uuid).await {
                        if let Err(err) = scheduler.job_runs.set_next_fire(handler.name(), next).await {
                            error!(job = handler.name(), error = %err, "failed to persist next fire time");
                        }
                    }
                })
            })
            .map_err(|e| TcmError::Other(e.into()))?;

            cron_scheduler.add(job).await.map_err(|e| TcmError::Other(e.into()))?;
        }

        cron_scheduler.start().await.map_err(|e| TcmError::Other(e.into()))?;
        info!("scheduler started");
        Ok(cron_scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct FakeJobRunStore(SyncMutex<Vec<(String, JobOutcome)>>);

    #[async_trait]
    impl JobRunStore for FakeJobRunStore {
        async fn last_run(&self, _job_name: &str) -> Result<Option<crate::store::JobRun>> {
            Ok(None)
        }
        async fn record_start(&self, _job_name: &str, _started_at: chrono::DateTime<Utc>) -> Result<()> {
            Ok(())
        }
        async fn record_end(&self, job_name: &str, _started_at: chrono::DateTime<Utc>, _ended_at: chrono::DateTime<Utc>, outcome: JobOutcome) -> Result<()> {
            self.0.lock().unwrap().push((job_name.to_string(), outcome));
            Ok(())
        }
        async fn set_next_fire(&self, _job_name: &str, _next_fire_at: chrono::DateTime<Utc>) -> Result<()> {
            Ok(())
        }
    }

    struct SlowJob {
        started: Arc<tokio::sync::Notify>,
        finish: Arc<tokio::sync::Notify>,
        runs: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for SlowJob {
        fn name(&self) -> &'static str {
            "slow"
        }
        async fn run(&self, _cancel: CancellationToken) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.finish.notified().await;
            Ok(())
        }
    }

    struct OkJob;

    #[async_trait]
    impl JobHandler for OkJob {
        fn name(&self) -> &'static str {
            "ok"
        }
        async fn run(&self, _cancel: CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    struct FailingJob;

    #[async_trait]
    impl JobHandler for FailingJob {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn run(&self, _cancel: CancellationToken) -> Result<()> {
            Err(TcmError::Other(anyhow::anyhow!("boom")))
        }
    }

    #[tokio::test]
    async fn trigger_runs_a_registered_job_and_records_ok() {
        let job_runs = Arc::new(FakeJobRunStore::default());
        let mut scheduler = Scheduler::new(job_runs.clone());
        scheduler.register(Arc::new(OkJob));

        let outcome = scheduler.trigger("ok").await.unwrap();
        assert_eq!(outcome, JobOutcome::Ok);
        assert_eq!(job_runs.0.lock().unwrap()[0], ("ok".to_string(), JobOutcome::Ok));
    }

    #[tokio::test]
    async fn failing_job_is_isolated_and_recorded_as_error() {
        let job_runs = Arc::new(FakeJobRunStore::default());
        let mut scheduler = Scheduler::new(job_runs.clone());
        scheduler.register(Arc::new(FailingJob));

        let outcome = scheduler.trigger("failing").await.unwrap();
        assert_eq!(outcome, JobOutcome::Error);
    }

    #[tokio::test]
    async fn unknown_job_name_is_not_found() {
        let scheduler = Scheduler::new(Arc::new(FakeJobRunStore::default()));
        let err = scheduler.trigger("does-not-exist").await.unwrap_err();
        assert!(matches!(err, TcmError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_trigger_of_the_same_job_records_overlap() {
        let job_runs = Arc::new(FakeJobRunStore::default());
        let mut scheduler = Scheduler::new(job_runs.clone());
        let started = Arc::new(tokio::sync::Notify::new());
        let finish = Arc::new(tokio::sync::Notify::new());
        scheduler.register(Arc::new(SlowJob { started: started.clone(), finish: finish.clone(), runs: AtomicU32::new(0) }));
        let scheduler = Arc::new(scheduler);

        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger("slow").await.unwrap() }
        });
        started.notified().await;

        let second_outcome = scheduler.trigger("slow").await.unwrap();
        assert_eq!(second_outcome, JobOutcome::Overlap);

        finish.notify_one();
        let first_outcome = first.await.unwrap();
        assert_eq!(first_outcome, JobOutcome::Ok);
    }
}
