//! Core domain types for the job queue system.
//!
//! This crate contains the runtime-agnostic pieces:
//! - Job, JobState and Priority for work items
//! - Queue with its pending ordering and concurrency bound
//! - Events and errors shared with the actor runtime

mod error;
mod events;
mod job;
mod pending;
mod queue;

pub use error::{QueueError, Result};
pub use events::{JobEvent, Severity};
pub use job::{Attempts, Job, JobId, JobMetadata, JobOptions, JobState, Priority};
pub use pending::PendingList;
pub use queue::{FailureOutcome, Queue, QueueInfo, QueueOptions, QueueState, QueueStats};
