//! Job domain types for deferred work items.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::QueueError;
use crate::queue::QueueOptions;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority level for dispatch order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Urgent = 3,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

/// Position of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the queue's pending list.
    #[default]
    Pending,
    /// Currently executing on a worker.
    Processing,
    Completed,
    Failed,
    /// Failed an attempt, waiting out the retry delay.
    Retry,
    Cancelled,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Retry)
                | (Retry, Pending)
        )
    }

    /// Get a simple state string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Retry => "retry",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempt accounting for a job. `current` never exceeds `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempts {
    pub max: u32,
    #[serde(default)]
    pub current: u32,
}

impl Attempts {
    pub fn new(max: u32) -> Self {
        Self { max, current: 0 }
    }

    /// True once no further attempt may be made.
    pub fn exhausted(&self) -> bool {
        self.current >= self.max
    }

    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.current)
    }
}

/// Per-job overrides supplied to `add_job`. Unset fields fall back to the
/// queue's options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    pub priority: Priority,
    /// Milliseconds after creation before the job becomes eligible.
    pub delay_ms: u64,
    /// Maximum number of execution attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Build a pending job for `queue_name`, filling gaps from the queue defaults.
    pub fn build_job(
        &self,
        queue_name: impl Into<String>,
        payload: serde_json::Value,
        defaults: &QueueOptions,
    ) -> Result<Job, QueueError> {
        let max_attempts = self.attempts.unwrap_or(defaults.retry_attempts);
        if max_attempts == 0 {
            return Err(QueueError::InvalidOptions(
                "a job needs at least one attempt".into(),
            ));
        }

        Ok(Job::new(queue_name, payload)
            .with_priority(self.priority)
            .with_delay_ms(self.delay_ms)
            .with_max_attempts(max_attempts)
            .with_timeout_ms(self.timeout_ms.unwrap_or(defaults.timeout_ms)))
    }
}

/// A job represents a unit of deferred work owned by exactly one queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// The queue this job belongs to.
    pub queue_name: String,
    /// Opaque payload handed to the processor.
    pub payload: serde_json::Value,
    pub state: JobState,
    pub priority: Priority,
    pub attempts: Attempts,
    /// Upper bound on a single processor invocation.
    pub timeout_ms: u64,
    pub delay_ms: u64,
    pub created_at: DateTime<Utc>,
    /// Start of the most recent attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Last error recorded by a failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Create a new pending job with default settings.
    pub fn new(queue_name: impl Into<String>, payload: serde_json::Value) -> Self {
        let defaults = QueueOptions::default();
        Self {
            id: JobId::new(),
            queue_name: queue_name.into(),
            payload,
            state: JobState::Pending,
            priority: Priority::default(),
            attempts: Attempts::new(defaults.retry_attempts),
            timeout_ms: defaults.timeout_ms,
            delay_ms: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.attempts = Attempts::new(max);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Earliest instant at which the job may be dispatched.
    pub fn available_at(&self) -> DateTime<Utc> {
        // Delays past chrono's range never become eligible.
        i64::try_from(self.delay_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .and_then(|delay| self.created_at.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Pending and past its delay.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.available_at() <= now
    }

    /// Move to `next`, rejecting transitions outside the state machine.
    pub fn transition(&mut self, next: JobState) -> Result<(), QueueError> {
        if !self.state.can_transition_to(next) {
            return Err(QueueError::InvalidStateTransition {
                job_id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Wall-clock time spent in the latest attempt, if it has finished.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.completed_at?;
        u64::try_from((finished - started).num_milliseconds()).ok()
    }
}

/// Read-only view of a job handed to processors alongside the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: JobId,
    pub queue_name: String,
    pub priority: Priority,
    /// 1-based number of the attempt being executed.
    pub attempt: u32,
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for JobMetadata {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            queue_name: job.queue_name.clone(),
            priority: job.priority,
            attempt: job.attempts.current,
            max_attempts: job.attempts.max,
            timeout_ms: job.timeout_ms,
            created_at: job.created_at,
        }
    }
}
