//! Job record store: the single source of truth for job state.
//!
//! Plain data structure with no locking of its own; the
//! [`Scheduler`](crate::Scheduler) serializes access. All status changes go
//! through [`JobStore::transition`], which validates the move against the
//! state machine and maintains the derived indexes (queue order, positions,
//! active resource keys) in the same step.

use std::collections::HashMap;

use toolq_core::error::CoreError;
use toolq_core::job::{state_machine, Job, JobStatus, ResourceKey};
use toolq_core::types::{AgentId, JobId, Timestamp};

/// A job plus the bookkeeping the public view does not expose.
#[derive(Debug)]
struct JobRecord {
    job: Job,
    /// Order of admission, used for listing and tie-breaking.
    submit_seq: u64,
    /// Assigned the first time the job enters `queued` and kept for life,
    /// so a released job goes back to its original place.
    queue_seq: Option<u64>,
}

#[derive(Debug, Default)]
pub struct JobStore {
    records: HashMap<JobId, JobRecord>,
    submission_order: Vec<JobId>,
    /// Queued jobs, sorted by `queue_seq`.
    queue: Vec<(u64, JobId)>,
    /// Resource key -> the job currently holding it.
    active_keys: HashMap<ResourceKey, JobId>,
    next_seq: u64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly admitted (or restored) job.
    ///
    /// The caller is expected to have run admission; a second active job
    /// for the same key is still refused here.
    pub fn insert(&mut self, mut job: Job) -> Result<&Job, CoreError> {
        let id = job.id;
        if self.records.contains_key(&id) {
            return Err(CoreError::Internal(format!("Job {id} already exists")));
        }
        if job.status.is_active() {
            if let Some(existing) = self.active_keys.get(&job.resource_key) {
                return Err(CoreError::DuplicateJob {
                    resource_key: job.resource_key.to_string(),
                    existing_job_id: *existing,
                });
            }
            self.active_keys.insert(job.resource_key.clone(), id);
        }

        job.position = None;
        let submit_seq = self.take_seq();
        let queue_seq = if job.status == JobStatus::Queued {
            let seq = self.take_seq();
            self.queue.push((seq, id));
            Some(seq)
        } else {
            None
        };

        self.submission_order.push(id);
        self.records.insert(
            id,
            JobRecord {
                job,
                submit_seq,
                queue_seq,
            },
        );
        self.reindex();

        self.get(id)
            .ok_or_else(|| CoreError::Internal(format!("Job {id} vanished after insert")))
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.records.get(&id).map(|r| &r.job)
    }

    /// Jobs in submission order, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        self.submission_order
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|r| status.map_or(true, |s| r.job.status == s))
            .map(|r| r.job.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The active job holding `key`, if any.
    pub fn active_job_for(&self, key: &ResourceKey) -> Option<JobId> {
        self.active_keys.get(key).copied()
    }

    /// Next job to hand to a worker.
    pub fn queue_head(&self) -> Option<JobId> {
        self.queue.first().map(|(_, id)| *id)
    }

    /// Queued job ids in serving order.
    pub fn queued_ids(&self) -> Vec<JobId> {
        self.queue.iter().map(|(_, id)| *id).collect()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.records
            .values()
            .filter(|r| r.job.status == status)
            .count()
    }

    /// Running jobs, earliest started first.
    pub fn running(&self) -> Vec<&Job> {
        let mut jobs: Vec<&JobRecord> = self
            .records
            .values()
            .filter(|r| r.job.status == JobStatus::Running)
            .collect();
        jobs.sort_by_key(|r| (r.job.started_at, r.submit_seq));
        jobs.into_iter().map(|r| &r.job).collect()
    }

    /// Scheduled jobs whose time has come, in the order they should be
    /// enqueued: by `scheduled_for`, then by submission.
    pub fn due_scheduled(&self, now: Timestamp) -> Vec<JobId> {
        let mut due: Vec<&JobRecord> = self
            .records
            .values()
            .filter(|r| r.job.status == JobStatus::Scheduled)
            .filter(|r| r.job.scheduled_for.map_or(true, |at| at <= now))
            .collect();
        due.sort_by_key(|r| (r.job.scheduled_for, r.submit_seq));
        due.into_iter().map(|r| r.job.id).collect()
    }

    /// Move a job to `to`, returning the status it left.
    ///
    /// Maintains timestamps, queue membership, positions and the active
    /// key index. Invalid moves fail with `PreconditionFailed` and leave
    /// the store untouched.
    pub fn transition(
        &mut self,
        id: JobId,
        to: JobStatus,
        now: Timestamp,
    ) -> Result<JobStatus, CoreError> {
        let from = self
            .get(id)
            .map(|job| job.status)
            .ok_or_else(|| CoreError::job_not_found(id))?;
        state_machine::validate_transition(from, to).map_err(CoreError::PreconditionFailed)?;

        if from == JobStatus::Queued {
            self.queue.retain(|(_, queued)| *queued != id);
        }
        let fresh_seq = self.next_seq;

        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| CoreError::job_not_found(id))?;
        let job = &mut record.job;
        job.status = to;
        job.position = None;

        match (from, to) {
            (JobStatus::Scheduled, JobStatus::Queued) => {
                job.queued_at = Some(now);
            }
            (JobStatus::Running, JobStatus::Queued) => {
                job.started_at = None;
                job.agent_id = None;
                job.progress = None;
            }
            (_, JobStatus::Running) => {
                job.started_at = Some(now);
            }
            _ => {}
        }
        if to.is_terminal() {
            job.completed_at = Some(now);
        }

        let key = job.resource_key.clone();
        let queue_seq = if to == JobStatus::Queued {
            Some(*record.queue_seq.get_or_insert(fresh_seq))
        } else {
            None
        };

        if let Some(seq) = queue_seq {
            if seq == fresh_seq {
                self.next_seq += 1;
            }
            let idx = self.queue.partition_point(|(s, _)| *s < seq);
            self.queue.insert(idx, (seq, id));
        }
        if to.is_terminal() && self.active_keys.get(&key) == Some(&id) {
            self.active_keys.remove(&key);
        }

        self.reindex();
        Ok(from)
    }

    /// Bulk-load archived jobs into an empty store.
    ///
    /// Submission order follows `created_at`; queue order follows
    /// `queued_at` (falling back to `created_at`). Jobs that would be a
    /// second active holder of a key are skipped and returned.
    pub fn restore(&mut self, mut jobs: Vec<Job>) -> Result<Vec<Job>, CoreError> {
        if !self.is_empty() {
            return Err(CoreError::Internal(
                "Cannot restore into a non-empty job store".to_string(),
            ));
        }
        jobs.sort_by_key(|j| (j.created_at, j.id));

        let mut skipped = Vec::new();
        for job in jobs {
            match self.insert(job.clone()) {
                Ok(_) => {}
                Err(CoreError::DuplicateJob { .. }) => skipped.push(job),
                Err(e) => return Err(e),
            }
        }

        let mut queued = std::mem::take(&mut self.queue)
            .into_iter()
            .map(|(_, id)| id)
            .collect::<Vec<_>>();
        queued.sort_by_key(|id| {
            self.records
                .get(id)
                .map(|r| (r.job.queued_at.unwrap_or(r.job.created_at), r.submit_seq))
        });
        for id in queued {
            let seq = self.take_seq();
            if let Some(record) = self.records.get_mut(&id) {
                record.queue_seq = Some(seq);
            }
            self.queue.push((seq, id));
        }
        self.reindex();
        Ok(skipped)
    }

    pub(crate) fn set_agent(&mut self, id: JobId, agent_id: Option<AgentId>) {
        if let Some(record) = self.records.get_mut(&id) {
            record.job.agent_id = agent_id;
        }
    }

    pub(crate) fn set_progress(&mut self, id: JobId, progress: serde_json::Value) {
        if let Some(record) = self.records.get_mut(&id) {
            record.job.progress = Some(progress);
        }
    }

    pub(crate) fn set_error_message(&mut self, id: JobId, message: String) {
        if let Some(record) = self.records.get_mut(&id) {
            record.job.error_message = Some(message);
        }
    }

    pub(crate) fn set_result_ref(&mut self, id: JobId, result_ref: String) {
        if let Some(record) = self.records.get_mut(&id) {
            record.job.result_ref = Some(result_ref);
        }
    }

    /// Verify the structural invariants. Used by tests.
    ///
    /// - queued jobs carry positions `1..=N` in queue order, nobody else
    ///   has a position;
    /// - every active job is indexed under its key, one per key.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (idx, (_, id)) in self.queue.iter().enumerate() {
            let job = self.get(*id).ok_or(format!("queued job {id} missing"))?;
            if job.status != JobStatus::Queued {
                return Err(format!("job {id} in queue with status {}", job.status));
            }
            if job.position != Some(idx as u32 + 1) {
                return Err(format!(
                    "job {id} at index {idx} has position {:?}",
                    job.position
                ));
            }
        }
        if self.queue.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err("queue not strictly ordered".into());
        }

        let queued = self.count(JobStatus::Queued);
        if queued != self.queue.len() {
            return Err(format!("{queued} queued jobs but queue holds {}", self.queue.len()));
        }

        let mut active = HashMap::new();
        for record in self.records.values() {
            let job = &record.job;
            if job.status != JobStatus::Queued && job.position.is_some() {
                return Err(format!("non-queued job {} has a position", job.id));
            }
            if job.status.is_active() && active.insert(job.resource_key.clone(), job.id).is_some() {
                return Err(format!("two active jobs for {}", job.resource_key));
            }
        }
        if active != self.active_keys {
            return Err("active key index out of sync".into());
        }
        Ok(())
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Recompute positions for every queued job. O(queued).
    fn reindex(&mut self) {
        for (idx, (_, id)) in self.queue.iter().enumerate() {
            if let Some(record) = self.records.get_mut(id) {
                record.job.position = Some(idx as u32 + 1);
            }
        }
    }
}
