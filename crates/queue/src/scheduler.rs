//! Queue scheduler: the only component that mutates job state.
//!
//! Every public operation locks [`QueueState`] once, applies its change
//! through the [`JobStore`], and publishes the resulting [`QueueEvent`]s
//! before the lock is released. A cancel racing a claim therefore resolves
//! with exactly one winner, and events for one job reach the bus in the
//! order the transitions happened.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use toolq_core::error::CoreError;
use toolq_core::job::{Job, JobStatus, SubmitJob};
use toolq_core::pool::{AgentView, PoolStatus, QueueStatus, DEFAULT_AGENT_OFFLINE_SECS};
use toolq_core::types::{JobId, Timestamp};
use toolq_events::{EventBus, QueueEvent};

use crate::admission;
use crate::agents::{validate_agent_id, AgentRegistry};
use crate::store::JobStore;

/// Source of "now". Swapped out in tests.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Global cap on running jobs.
    pub max_concurrent_jobs: usize,
    /// Heartbeat age after which an agent counts as offline.
    pub agent_offline_after: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            agent_offline_after: Duration::seconds(DEFAULT_AGENT_OFFLINE_SECS as i64),
        }
    }
}

struct QueueState {
    jobs: JobStore,
    agents: AgentRegistry,
    /// Last pool snapshot published on the bus.
    last_pool: Option<PoolStatus>,
}

pub struct Scheduler {
    state: Mutex<QueueState>,
    bus: Arc<EventBus>,
    config: SchedulerConfig,
    clock: Clock,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, bus: Arc<EventBus>) -> Self {
        Self::with_clock(config, bus, Arc::new(Utc::now))
    }

    pub fn with_clock(config: SchedulerConfig, bus: Arc<EventBus>, clock: Clock) -> Self {
        let agents = AgentRegistry::new(config.agent_offline_after);
        Self {
            state: Mutex::new(QueueState {
                jobs: JobStore::new(),
                agents,
                last_pool: None,
            }),
            bus,
            config,
            clock,
        }
    }

    fn now(&self) -> Timestamp {
        (self.clock)()
    }

    // -----------------------------------------------------------------------
    // Client operations
    // -----------------------------------------------------------------------

    /// Admit a new job. Fails with `DuplicateJob` when another active job
    /// holds the same resource key.
    pub async fn submit(&self, request: SubmitJob) -> Result<Job, CoreError> {
        request.validate()?;
        let key = request.resource_key();
        let now = self.now();

        let mut state = self.state.lock().await;
        admission::admit(&state.jobs, &key)?;

        let deferred = request.scheduled_for.filter(|at| *at > now);
        let job = Job {
            id: uuid::Uuid::now_v7(),
            resource_key: key,
            target: request.target,
            tool: request.tool,
            mode: request.mode,
            status: if deferred.is_some() {
                JobStatus::Scheduled
            } else {
                JobStatus::Queued
            },
            position: None,
            scheduled_for: request.scheduled_for,
            created_at: now,
            queued_at: if deferred.is_some() { None } else { Some(now) },
            started_at: None,
            completed_at: None,
            progress: None,
            error_message: None,
            result_ref: None,
            agent_id: None,
        };
        let job = state.jobs.insert(job)?.clone();

        tracing::info!(
            job_id = %job.id,
            resource_key = %job.resource_key,
            status = %job.status,
            position = ?job.position,
            "Job submitted",
        );
        self.bus.publish(QueueEvent::JobCreated { job: job.clone() });
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Job, CoreError> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    /// Jobs in submission order, optionally filtered by status.
    pub async fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        self.state.lock().await.jobs.list(status)
    }

    /// Cancel a scheduled or queued job.
    pub async fn cancel(&self, id: JobId) -> Result<Job, CoreError> {
        let now = self.now();
        let mut state = self.state.lock().await;
        let status = state
            .jobs
            .get(id)
            .map(|j| j.status)
            .ok_or_else(|| CoreError::job_not_found(id))?;
        if !status.is_cancellable() {
            return Err(CoreError::PreconditionFailed(format!(
                "Job {id} is {status} and cannot be cancelled"
            )));
        }

        let job = self.transition(&mut state, id, JobStatus::Cancelled, now)?;
        tracing::info!(job_id = %id, from = %status, "Job cancelled");
        Ok(job)
    }

    pub async fn queue_status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        let jobs = &state.jobs;
        QueueStatus {
            queued_count: jobs.count(JobStatus::Queued) as u32,
            running_count: jobs.count(JobStatus::Running) as u32,
            scheduled_count: jobs.count(JobStatus::Scheduled) as u32,
            completed_count: jobs.count(JobStatus::Completed) as u32,
            failed_count: jobs.count(JobStatus::Failed) as u32,
            cancelled_count: jobs.count(JobStatus::Cancelled) as u32,
            current_job_id: jobs.running().first().map(|j| j.id),
        }
    }

    pub async fn pool_status(&self) -> PoolStatus {
        let now = self.now();
        let state = self.state.lock().await;
        derive_pool(&state, now)
    }

    // -----------------------------------------------------------------------
    // Agent operations
    // -----------------------------------------------------------------------

    /// Register or refresh an agent.
    pub async fn heartbeat(
        &self,
        agent_id: &str,
        name: Option<String>,
    ) -> Result<AgentView, CoreError> {
        let now = self.now();
        let mut state = self.state.lock().await;
        let is_new = !state.agents.contains(agent_id);
        let view = state.agents.heartbeat(agent_id, name, now)?;
        if is_new {
            tracing::info!(agent_id, name = %view.name, "Agent registered");
        }
        self.publish_pool_if_changed(&mut state, now);
        Ok(view)
    }

    pub async fn agents(&self) -> Vec<AgentView> {
        let now = self.now();
        self.state.lock().await.agents.views(now)
    }

    pub async fn agent(&self, agent_id: &str) -> Result<AgentView, CoreError> {
        let now = self.now();
        self.state
            .lock()
            .await
            .agents
            .view(agent_id, now)
            .ok_or_else(|| CoreError::NotFound {
                entity: "Agent",
                id: agent_id.to_string(),
            })
    }

    /// Re-derive agent liveness and publish the pool snapshot if it moved.
    /// Liveness is time-based, so this must run periodically.
    pub async fn sweep_agents(&self) -> Option<PoolStatus> {
        let now = self.now();
        let mut state = self.state.lock().await;
        self.publish_pool_if_changed(&mut state, now)
    }

    /// Hand the queue head to `agent_id`.
    ///
    /// Returns `None` when the queue is empty, the global running limit is
    /// reached, or the agent already holds a job. Claiming counts as a
    /// heartbeat.
    pub async fn claim(&self, agent_id: &str) -> Result<Option<Job>, CoreError> {
        validate_agent_id(agent_id)?;
        let now = self.now();
        let mut state = self.state.lock().await;
        state.agents.heartbeat(agent_id, None, now)?;

        if let Some(held) = state.agents.current_job(agent_id) {
            tracing::debug!(agent_id, job_id = %held, "Agent already holds a job");
            self.publish_pool_if_changed(&mut state, now);
            return Ok(None);
        }
        let running = state.jobs.count(JobStatus::Running);
        let head = state.jobs.queue_head();
        let Some(id) = head.filter(|_| running < self.config.max_concurrent_jobs) else {
            self.publish_pool_if_changed(&mut state, now);
            return Ok(None);
        };

        state.jobs.transition(id, JobStatus::Running, now)?;
        state.jobs.set_agent(id, Some(agent_id.to_string()));
        state.agents.set_current_job(agent_id, Some(id));
        let job = self.emit_transition(&mut state, id, JobStatus::Queued, now)?;

        tracing::info!(job_id = %id, agent_id, resource_key = %job.resource_key, "Job claimed");
        Ok(Some(job))
    }

    /// Store the latest progress payload of a running job.
    pub async fn report_progress(
        &self,
        id: JobId,
        agent_id: &str,
        progress: serde_json::Value,
    ) -> Result<Job, CoreError> {
        let mut state = self.state.lock().await;
        ensure_claimed(&state.jobs, id, agent_id)?;
        state.jobs.set_progress(id, progress);

        let job = state
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(id))?;
        tracing::debug!(job_id = %id, agent_id, "Job progress reported");
        self.bus.publish(QueueEvent::JobProgress { job: job.clone() });
        Ok(job)
    }

    pub async fn complete(
        &self,
        id: JobId,
        agent_id: &str,
        result_ref: String,
    ) -> Result<Job, CoreError> {
        let now = self.now();
        let mut state = self.state.lock().await;
        ensure_claimed(&state.jobs, id, agent_id)?;

        state.jobs.set_result_ref(id, result_ref);
        state.agents.set_current_job(agent_id, None);
        let job = self.transition(&mut state, id, JobStatus::Completed, now)?;
        tracing::info!(job_id = %id, agent_id, "Job completed");
        Ok(job)
    }

    /// Record a worker-reported execution failure. The message is stored
    /// on the job; it is not an error of this call.
    pub async fn fail(
        &self,
        id: JobId,
        agent_id: &str,
        error_message: String,
    ) -> Result<Job, CoreError> {
        let now = self.now();
        let mut state = self.state.lock().await;
        ensure_claimed(&state.jobs, id, agent_id)?;

        state.jobs.set_error_message(id, error_message);
        state.agents.set_current_job(agent_id, None);
        let job = self.transition(&mut state, id, JobStatus::Failed, now)?;
        tracing::warn!(
            job_id = %id,
            agent_id,
            error = job.error_message.as_deref().unwrap_or_default(),
            "Job failed",
        );
        Ok(job)
    }

    /// Return a claimed job to the queue at its original place.
    ///
    /// Only accepted before the worker reported any progress.
    pub async fn release(&self, id: JobId, agent_id: &str) -> Result<Job, CoreError> {
        let now = self.now();
        let mut state = self.state.lock().await;
        let job = ensure_claimed(&state.jobs, id, agent_id)?;
        if job.progress.is_some() {
            return Err(CoreError::PreconditionFailed(format!(
                "Job {id} already reported progress and cannot be released"
            )));
        }

        state.agents.set_current_job(agent_id, None);
        let job = self.transition(&mut state, id, JobStatus::Queued, now)?;
        tracing::info!(job_id = %id, agent_id, position = ?job.position, "Job released");
        Ok(job)
    }

    // -----------------------------------------------------------------------
    // Engine operations
    // -----------------------------------------------------------------------

    /// Move every scheduled job whose time has come into the queue.
    pub async fn promote_due(&self) -> Vec<Job> {
        let now = self.now();
        let mut state = self.state.lock().await;
        let due = state.jobs.due_scheduled(now);

        let mut promoted = Vec::with_capacity(due.len());
        for id in due {
            match self.transition(&mut state, id, JobStatus::Queued, now) {
                Ok(job) => {
                    tracing::info!(job_id = %id, position = ?job.position, "Scheduled job promoted");
                    promoted.push(job);
                }
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Failed to promote scheduled job");
                }
            }
        }
        promoted
    }

    /// Rebuild state from archived snapshots. Claims do not survive a
    /// restart, so jobs archived as running go back to the queue.
    pub async fn restore(&self, jobs: Vec<Job>) -> Result<usize, CoreError> {
        let mut requeued = Vec::new();
        let jobs: Vec<Job> = jobs
            .into_iter()
            .map(|mut job| {
                if job.status == JobStatus::Running {
                    job.status = JobStatus::Queued;
                    job.started_at = None;
                    job.agent_id = None;
                    job.progress = None;
                    requeued.push(job.id);
                }
                job
            })
            .collect();

        let mut state = self.state.lock().await;
        let skipped = state.jobs.restore(jobs)?;
        for job in &skipped {
            tracing::warn!(
                job_id = %job.id,
                resource_key = %job.resource_key,
                "Skipped archived job holding an already active key",
            );
        }

        for id in requeued {
            if let Some(job) = state.jobs.get(id).cloned() {
                tracing::info!(job_id = %id, position = ?job.position, "Interrupted job requeued");
                self.bus.publish(QueueEvent::JobTransitioned {
                    from: JobStatus::Running,
                    job,
                });
            }
        }
        Ok(state.jobs.len())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Apply a transition and publish it (plus the pool snapshot if the
    /// running set changed).
    fn transition(
        &self,
        state: &mut QueueState,
        id: JobId,
        to: JobStatus,
        now: Timestamp,
    ) -> Result<Job, CoreError> {
        let from = state.jobs.transition(id, to, now)?;
        self.emit_transition(state, id, from, now)
    }

    fn emit_transition(
        &self,
        state: &mut QueueState,
        id: JobId,
        from: JobStatus,
        now: Timestamp,
    ) -> Result<Job, CoreError> {
        let job = state
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(id))?;
        self.bus.publish(QueueEvent::JobTransitioned {
            from,
            job: job.clone(),
        });
        self.publish_pool_if_changed(state, now);
        Ok(job)
    }

    fn publish_pool_if_changed(&self, state: &mut QueueState, now: Timestamp) -> Option<PoolStatus> {
        let status = derive_pool(state, now);
        if state.last_pool.as_ref() == Some(&status) {
            return None;
        }
        state.last_pool = Some(status.clone());
        self.bus.publish(QueueEvent::PoolStatus {
            status: status.clone(),
        });
        Some(status)
    }
}

fn derive_pool(state: &QueueState, now: Timestamp) -> PoolStatus {
    PoolStatus::derive(
        &state.agents.views(now),
        state.jobs.count(JobStatus::Running),
    )
}

/// The job must be running and held by `agent_id`.
fn ensure_claimed<'a>(jobs: &'a JobStore, id: JobId, agent_id: &str) -> Result<&'a Job, CoreError> {
    let job = jobs.get(id).ok_or_else(|| CoreError::job_not_found(id))?;
    if job.status != JobStatus::Running {
        return Err(CoreError::PreconditionFailed(format!(
            "Job {id} is {} and not running",
            job.status
        )));
    }
    if job.agent_id.as_deref() != Some(agent_id) {
        return Err(CoreError::PreconditionFailed(format!(
            "Job {id} is not claimed by agent {agent_id}"
        )));
    }
    Ok(job)
}
