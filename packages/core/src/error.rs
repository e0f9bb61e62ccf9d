//! Error taxonomy shared by the queue core and the actor runtime.

use thiserror::Error;

use crate::{JobId, JobState};

/// Errors raised by the control API and captured during job execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Queue already exists: {0}")]
    QueueAlreadyExists(String),

    #[error("Queue is full: {0}")]
    QueueFull(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        job_id: JobId,
        from: JobState,
        to: JobState,
    },

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Error returned by a processor function.
    #[error("Processor error: {0}")]
    Processor(String),

    /// The processor did not settle within the job's timeout.
    #[error("Job timed out after {0}ms")]
    Timeout(u64),

    #[error("Actor error: {0}")]
    Actor(String),
}

impl QueueError {
    /// Whether this error came out of job execution rather than the control API.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, QueueError::Processor(_) | QueueError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
