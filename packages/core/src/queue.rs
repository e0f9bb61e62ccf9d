//! Queue domain types: options, counters and the pending/processing state
//! machine for a single named queue.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::job::{Job, JobId, JobState};
use crate::pending::PendingList;

/// Current operational state of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Queue dispatches jobs to its workers.
    #[default]
    Running,
    /// Queue accepts jobs but dispatches none.
    Paused,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueState::Running => write!(f, "running"),
            QueueState::Paused => write!(f, "paused"),
        }
    }
}

/// Configuration for queue behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Maximum number of jobs executing at once, across all workers.
    pub concurrency: usize,
    /// Default maximum attempts for jobs in this queue.
    pub retry_attempts: u32,
    /// Wait between a failed attempt and re-admission.
    pub retry_delay_ms: u64,
    /// Default processor timeout for jobs in this queue.
    pub timeout_ms: u64,
    /// Maximum number of jobs that can be pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queue_size: Option<usize>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            timeout_ms: 30_000,
            max_queue_size: None,
        }
    }
}

impl QueueOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = Some(max_queue_size);
        self
    }

    /// Reject options the scheduler cannot honor.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.concurrency == 0 {
            return Err(QueueError::InvalidOptions(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(QueueError::InvalidOptions(
                "retry_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Counters for a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Failed attempts that were scheduled for another try.
    pub retried: u64,
    pub cancelled: u64,
    /// Jobs ever admitted.
    pub total: u64,
}

impl QueueStats {
    /// Jobs waiting or executing.
    pub fn active(&self) -> u64 {
        self.pending + self.processing
    }

    /// Jobs that reached Completed or Failed.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.processed();
        if total == 0 {
            None
        } else {
            Some((self.completed as f64 / total as f64) * 100.0)
        }
    }
}

/// Serializable snapshot of a queue for dashboards and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub name: String,
    pub state: QueueState,
    pub options: QueueOptions,
    pub stats: QueueStats,
    pub created_at: DateTime<Utc>,
}

/// What happened to a job whose attempt failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// The job is in Retry and should be requeued after `delay_ms`.
    Retry { job: Job, delay_ms: u64 },
    /// Attempts are exhausted; the job is terminal.
    Failed(Job),
}

/// A named queue: its jobs, pending order and in-flight set.
///
/// All mutation goes through methods that keep `processing.len()` within
/// `options.concurrency` and drive jobs through their state machine.
#[derive(Debug, Clone)]
pub struct Queue {
    name: String,
    state: QueueState,
    options: QueueOptions,
    stats: QueueStats,
    created_at: DateTime<Utc>,
    pending: PendingList,
    processing: HashSet<JobId>,
    jobs: HashMap<JobId, Job>,
}

impl Queue {
    /// Create an empty queue.
    pub fn new(name: impl Into<String>, options: QueueOptions) -> Self {
        Self {
            name: name.into(),
            state: QueueState::Running,
            options,
            stats: QueueStats::default(),
            created_at: Utc::now(),
            pending: PendingList::new(),
            processing: HashSet::new(),
            jobs: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    pub fn info(&self) -> QueueInfo {
        QueueInfo {
            name: self.name.clone(),
            state: self.state,
            options: self.options.clone(),
            stats: self.stats.clone(),
            created_at: self.created_at,
        }
    }

    /// Change the operational state, returning the previous one.
    pub fn set_state(&mut self, state: QueueState) -> QueueState {
        std::mem::replace(&mut self.state, state)
    }

    /// Free execution slots.
    pub fn capacity(&self) -> usize {
        self.options.concurrency.saturating_sub(self.processing.len())
    }

    pub fn processing_len(&self) -> usize {
        self.processing.len()
    }

    pub fn is_processing(&self, id: JobId) -> bool {
        self.processing.contains(&id)
    }

    /// No job is executing.
    pub fn is_drained(&self) -> bool {
        self.processing.is_empty()
    }

    /// Pending ids in dispatch order.
    pub fn pending_ids(&self) -> Vec<JobId> {
        self.pending.ids().collect()
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// Jobs of this queue, oldest first, optionally filtered by state.
    pub fn jobs(&self, state: Option<JobState>, limit: usize) -> Vec<Job> {
        let mut jobs: Vec<&Job> = self
            .jobs
            .values()
            .filter(|j| state.is_none_or(|s| j.state == s))
            .collect();
        jobs.sort_by_key(|j| (j.created_at, j.id.0));
        jobs.into_iter().take(limit).cloned().collect()
    }

    /// Admit a new pending job.
    pub fn admit(&mut self, job: Job) -> Result<(), QueueError> {
        if job.state != JobState::Pending {
            return Err(QueueError::InvalidStateTransition {
                job_id: job.id,
                from: job.state,
                to: JobState::Pending,
            });
        }
        if let Some(max_size) = self.options.max_queue_size
            && self.pending.len() >= max_size
        {
            return Err(QueueError::QueueFull(self.name.clone()));
        }

        self.pending.admit(job.id, job.priority);
        self.jobs.insert(job.id, job);
        self.stats.total += 1;
        self.refresh_stats();
        Ok(())
    }

    /// Take up to `limit` eligible jobs from the head of the pending list,
    /// bounded by free capacity, and mark them Processing.
    pub fn dispatch(&mut self, now: DateTime<Utc>, limit: usize) -> Vec<Job> {
        let take = limit.min(self.capacity());
        if take == 0 || self.state == QueueState::Paused {
            return Vec::new();
        }

        let ready: Vec<JobId> = self
            .pending
            .ids()
            .filter(|id| self.jobs.get(id).is_some_and(|j| j.is_eligible(now)))
            .take(take)
            .collect();

        let mut started = Vec::with_capacity(ready.len());
        for id in ready {
            let Some(job) = self.jobs.get_mut(&id) else {
                continue;
            };
            if job.transition(JobState::Processing).is_err() {
                continue;
            }
            job.started_at = Some(now);
            job.attempts.current = (job.attempts.current + 1).min(job.attempts.max);
            self.pending.remove(id);
            self.processing.insert(id);
            started.push(job.clone());
        }

        self.refresh_stats();
        started
    }

    /// Record a successful attempt.
    pub fn complete(
        &mut self,
        id: JobId,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Job, QueueError> {
        let job = self.jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;
        job.transition(JobState::Completed)?;
        job.result = Some(result);
        job.completed_at = Some(now);
        let job = job.clone();

        self.processing.remove(&id);
        self.stats.completed += 1;
        self.refresh_stats();
        Ok(job)
    }

    /// Record a failed attempt: schedule a retry while attempts remain,
    /// otherwise fail the job for good.
    pub fn fail(
        &mut self,
        id: JobId,
        error: &QueueError,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, QueueError> {
        let retry_delay_ms = self.options.retry_delay_ms;
        let job = self.jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;

        let outcome = if job.attempts.exhausted() {
            job.transition(JobState::Failed)?;
            job.error = Some(error.to_string());
            job.completed_at = Some(now);
            self.stats.failed += 1;
            FailureOutcome::Failed(job.clone())
        } else {
            job.transition(JobState::Retry)?;
            job.error = Some(error.to_string());
            self.stats.retried += 1;
            FailureOutcome::Retry {
                job: job.clone(),
                delay_ms: retry_delay_ms,
            }
        };

        self.processing.remove(&id);
        self.refresh_stats();
        Ok(outcome)
    }

    /// Return a job waiting in Retry to the tail of the pending list.
    pub fn requeue(&mut self, id: JobId) -> Result<Job, QueueError> {
        let job = self.jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;
        job.transition(JobState::Pending)?;
        self.pending.requeue(id, job.priority);
        let job = job.clone();
        self.refresh_stats();
        Ok(job)
    }

    /// Cancel a job that is still pending.
    pub fn cancel(&mut self, id: JobId, now: DateTime<Utc>) -> Result<Job, QueueError> {
        let job = self.jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;
        job.transition(JobState::Cancelled)?;
        job.completed_at = Some(now);
        let job = job.clone();

        self.pending.remove(id);
        self.stats.cancelled += 1;
        self.refresh_stats();
        Ok(job)
    }

    fn refresh_stats(&mut self) {
        self.stats.pending = self.pending.len() as u64;
        self.stats.processing = self.processing.len() as u64;
    }
}
