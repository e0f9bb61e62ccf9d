//! Lifecycle events published by the job queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId, QueueInfo, QueueState};

/// How loudly an audit sink should treat an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    High,
}

/// Events emitted by the job queue system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Queue events
    /// A new queue was created (or replaced).
    QueueCreated {
        queue: QueueInfo,
        timestamp: DateTime<Utc>,
    },
    /// A queue was paused or resumed.
    QueueStateChanged {
        queue_name: String,
        old_state: QueueState,
        new_state: QueueState,
        timestamp: DateTime<Utc>,
    },
    /// A processor was registered on a queue.
    WorkerRegistered {
        worker_id: String,
        queue_name: String,
        timestamp: DateTime<Utc>,
    },

    // Job events
    /// A job was admitted to its queue.
    JobAdded { job: Job, timestamp: DateTime<Utc> },
    /// A job attempt started.
    JobStarted {
        job_id: JobId,
        queue_name: String,
        worker_id: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        queue_name: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// An attempt failed and the job will run again after `retry_in_ms`.
    JobRetrying {
        job_id: JobId,
        queue_name: String,
        error: String,
        attempt: u32,
        retry_in_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job exhausted its attempts.
    JobFailed {
        job_id: JobId,
        queue_name: String,
        error: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    /// A pending job was cancelled.
    JobCancelled {
        job_id: JobId,
        queue_name: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::QueueCreated { timestamp, .. } => *timestamp,
            JobEvent::QueueStateChanged { timestamp, .. } => *timestamp,
            JobEvent::WorkerRegistered { timestamp, .. } => *timestamp,
            JobEvent::JobAdded { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobRetrying { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::JobCancelled { timestamp, .. } => *timestamp,
        }
    }

    /// Get the queue name associated with this event.
    pub fn queue_name(&self) -> &str {
        match self {
            JobEvent::QueueCreated { queue, .. } => &queue.name,
            JobEvent::JobAdded { job, .. } => &job.queue_name,
            JobEvent::QueueStateChanged { queue_name, .. }
            | JobEvent::WorkerRegistered { queue_name, .. }
            | JobEvent::JobStarted { queue_name, .. }
            | JobEvent::JobCompleted { queue_name, .. }
            | JobEvent::JobRetrying { queue_name, .. }
            | JobEvent::JobFailed { queue_name, .. }
            | JobEvent::JobCancelled { queue_name, .. } => queue_name,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobAdded { job, .. } => Some(job.id),
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            JobEvent::JobRetrying { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            JobEvent::JobCancelled { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Audit severity. Terminal failures are high severity.
    pub fn severity(&self) -> Severity {
        match self {
            JobEvent::JobFailed { .. } => Severity::High,
            JobEvent::JobRetrying { .. } => Severity::Warning,
            JobEvent::JobStarted { .. } => Severity::Debug,
            _ => Severity::Info,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::QueueCreated { queue, .. } => format!("Queue '{}' created", queue.name),
            JobEvent::QueueStateChanged {
                queue_name,
                new_state,
                ..
            } => format!("Queue '{}' -> {}", queue_name, new_state),
            JobEvent::WorkerRegistered {
                worker_id,
                queue_name,
                ..
            } => format!("Worker {} registered on '{}'", worker_id, queue_name),
            JobEvent::JobAdded { job, .. } => {
                format!("Job {} added to '{}' ({})", job.id, job.queue_name, job.priority)
            }
            JobEvent::JobStarted {
                job_id,
                worker_id,
                attempt,
                ..
            } => format!("Job {} started by {} (attempt {})", job_id, worker_id, attempt),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobRetrying {
                job_id,
                error,
                retry_in_ms,
                ..
            } => format!("Job {} failed: {} (retry in {}ms)", job_id, error, retry_in_ms),
            JobEvent::JobFailed {
                job_id,
                error,
                attempts,
                ..
            } => format!("Job {} failed after {} attempts: {}", job_id, attempts, error),
            JobEvent::JobCancelled { job_id, .. } => format!("Job {} cancelled", job_id),
        }
    }
}
