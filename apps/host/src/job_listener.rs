use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keeper_application::{FunctionSingletonGuard, JobDefinition, Listener, ListenerFactory};
use keeper_core::{AppError, AppResult};
use keeper_domain::RouteValues;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything one tick needs to run a job invocation.
#[derive(Clone)]
pub struct TickingJob {
    pub definition: JobDefinition,
    pub route_values: RouteValues,
    pub guard: FunctionSingletonGuard,
    pub tick_interval: Duration,
}

pub struct TickingListenerFactory {
    job: TickingJob,
}

impl TickingListenerFactory {
    pub fn new(job: TickingJob) -> Self {
        Self { job }
    }
}

#[async_trait]
impl ListenerFactory for TickingListenerFactory {
    async fn create(&self) -> AppResult<Arc<dyn Listener>> {
        Ok(Arc::new(TickingListener::new(self.job.clone())))
    }
}

/// Fires the job on a fixed interval while started.
///
/// Function-mode jobs go through the invocation guard on every tick, so a tick
/// that loses the race is skipped rather than queued.
pub struct TickingListener {
    job: TickingJob,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TickingListener {
    pub fn new(job: TickingJob) -> Self {
        Self {
            job,
            shutdown: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Listener for TickingListener {
    async fn start(&self, cancel: CancellationToken) -> AppResult<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Ok(());
        }
        if self.shutdown.is_cancelled() {
            return Err(AppError::Cancelled(format!(
                "job listener for '{}' was stopped",
                self.job.definition.owner()
            )));
        }

        let tick_interval_ms =
            u64::try_from(self.job.tick_interval.as_millis()).unwrap_or(u64::MAX);
        *worker = Some(tokio::spawn(run_ticks(
            self.job.clone(),
            self.shutdown.clone(),
            cancel,
        )));
        info!(
            job = %self.job.definition.owner(),
            tick_interval_ms,
            "job listener started"
        );
        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        self.shutdown.cancel();

        let Some(worker) = self.worker.lock().await.take() else {
            return Ok(());
        };
        worker.await.map_err(|error| {
            AppError::Internal(format!(
                "job listener task for '{}' failed: {error}",
                self.job.definition.owner()
            ))
        })?;

        info!(job = %self.job.definition.owner(), "job listener stopped");
        Ok(())
    }

    fn cancel(&self) {
        self.shutdown.cancel();
    }
}

async fn run_ticks(job: TickingJob, shutdown: CancellationToken, cancel: CancellationToken) {
    let mut ticks = tokio::time::interval(job.tick_interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }

        let owner = job.definition.owner().to_string();
        let result = job
            .guard
            .invoke_job(&job.definition, &job.route_values, &shutdown, move || async move {
                info!(job = %owner, "job tick executed");
                Ok(())
            })
            .await;

        match result {
            Ok(()) => {}
            Err(AppError::Conflict(message)) => {
                debug!(job = %job.definition.owner(), reason = %message, "job tick skipped");
            }
            Err(error) if error.is_cancelled() => break,
            Err(error) => {
                warn!(job = %job.definition.owner(), error = %error, "job tick failed");
            }
        }
    }
}
