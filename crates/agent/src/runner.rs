//! Worker loop and the tool runner seam.
//!
//! The worker heartbeats on its own task, claims the queue head whenever
//! it is woken (poll tick or channel push), runs the job through a
//! [`ToolRunner`] and reports the outcome. Analysis tools themselves are
//! opaque to the queue, so the shipped runner only simulates them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use toolq_core::job::Job;

use crate::client::QueueApi;

/// Why a run did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The tool never started; the job goes back to the queue.
    NotStarted(String),
    /// The tool ran and failed; the message is stored on the job.
    Failed(String),
}

/// Forwards progress of the job being run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: serde_json::Value);
}

/// Executes one analysis job.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Returns the result reference on success.
    async fn run(&self, job: &Job, progress: &dyn ProgressSink) -> Result<String, RunError>;
}

/// Stand-in runner: walks through `steps` stages, reporting each one.
#[derive(Debug, Clone)]
pub struct SimulatedRunner {
    pub steps: u32,
    pub step_duration: Duration,
}

impl Default for SimulatedRunner {
    fn default() -> Self {
        Self {
            steps: 4,
            step_duration: Duration::from_millis(500),
        }
    }
}

#[async_trait]
impl ToolRunner for SimulatedRunner {
    async fn run(&self, job: &Job, progress: &dyn ProgressSink) -> Result<String, RunError> {
        for step in 1..=self.steps {
            tokio::time::sleep(self.step_duration).await;
            progress
                .report(serde_json::json!({
                    "step": step,
                    "total": self.steps,
                    "percent": step * 100 / self.steps.max(1),
                }))
                .await;
        }
        Ok(format!("{}/{}/{}", job.tool, job.target, job.id))
    }
}

struct JobProgress<'a, A: QueueApi> {
    api: &'a A,
    job: &'a Job,
    agent_id: &'a str,
}

#[async_trait]
impl<'a, A: QueueApi> ProgressSink for JobProgress<'a, A> {
    async fn report(&self, progress: serde_json::Value) {
        if let Err(e) = self
            .api
            .report_progress(self.job.id, self.agent_id, progress)
            .await
        {
            tracing::warn!(job_id = %self.job.id, error = %e, "Failed to report progress");
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub heartbeat_interval: Duration,
    pub claim_poll_interval: Duration,
}

pub struct Worker<A: QueueApi, R: ToolRunner> {
    api: Arc<A>,
    runner: R,
    config: WorkerConfig,
    wake: Arc<Notify>,
}

impl<A: QueueApi + 'static, R: ToolRunner> Worker<A, R> {
    pub fn new(api: Arc<A>, runner: R, config: WorkerConfig) -> Self {
        Self {
            api,
            runner,
            config,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Handle that makes the worker try a claim right away.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Run until cancelled. A job in flight is finished before returning.
    pub async fn run(&self, cancel: CancellationToken) {
        let heartbeat = spawn_heartbeat(
            Arc::clone(&self.api),
            self.config.clone(),
            cancel.clone(),
        );

        let mut poll = tokio::time::interval(self.config.claim_poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = poll.tick() => {}
                _ = self.wake.notified() => {}
            }
            // Drain the queue head by head while work is available.
            while !cancel.is_cancelled() && self.claim_and_run().await {}
        }

        let _ = heartbeat.await;
        tracing::info!(agent_id = %self.config.agent_id, "Worker stopped");
    }

    /// Claim one job and run it. Returns whether a job was run.
    pub async fn claim_and_run(&self) -> bool {
        let agent_id = self.config.agent_id.as_str();
        let job = match self.api.claim(agent_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(agent_id, error = %e, "Claim failed");
                return false;
            }
        };

        tracing::info!(job_id = %job.id, resource_key = %job.resource_key, "Running job");
        let sink = JobProgress {
            api: self.api.as_ref(),
            job: &job,
            agent_id,
        };
        let outcome = self.runner.run(&job, &sink).await;

        let reported = match outcome {
            Ok(result_ref) => self.api.complete(job.id, agent_id, result_ref).await,
            Err(RunError::Failed(message)) => self.api.fail(job.id, agent_id, message).await,
            Err(RunError::NotStarted(reason)) => {
                tracing::warn!(job_id = %job.id, reason = %reason, "Tool did not start, releasing job");
                self.api.release(job.id, agent_id).await
            }
        };

        match reported {
            Ok(job) => {
                tracing::info!(job_id = %job.id, status = %job.status, "Job reported");
                true
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to report job outcome");
                false
            }
        }
    }
}

fn spawn_heartbeat<A: QueueApi + 'static>(
    api: Arc<A>,
    config: WorkerConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match api.heartbeat(&config.agent_id, config.agent_name.clone()).await {
                        Ok(view) => tracing::debug!(agent_id = %view.id, online = view.online, "Heartbeat sent"),
                        Err(e) => tracing::warn!(agent_id = %config.agent_id, error = %e, "Heartbeat failed"),
                    }
                }
            }
        }
    })
}
