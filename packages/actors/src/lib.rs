//! Actor runtime for the job queue.
//!
//! This crate provides the Ractor-based actors that schedule and execute
//! jobs, and the [`JobManager`] handle that exposes them.
//!
//! # Architecture
//!
//! - `Supervisor` - Owns queues, workers, the job index and event fan-out
//! - `QueueActor` - Owns a single queue; every job transition happens here
//! - `WorkerActor` - Ticks, pulls eligible jobs and runs their processor
//!
//! # Usage
//!
//! ```ignore
//! use jobq_actors::{FnProcessor, JobManager, ManagerConfig};
//! use jobq_core::{JobOptions, QueueOptions};
//!
//! let manager = JobManager::new(ManagerConfig::default()).await?;
//! manager.create_queue("email", QueueOptions::default()).await?;
//! manager
//!     .process_queue("email", FnProcessor::new("smtp", |payload, _meta| async move {
//!         Ok(payload)
//!     }))
//!     .await?;
//! manager.start();
//! let job_id = manager.add_job("email", serde_json::json!({"to": "a@x.com"}), JobOptions::new()).await?;
//! ```

mod config;
mod manager;
mod messages;
mod processor;
mod queue_actor;
mod sink;
mod supervisor;
mod worker_actor;

pub use config::{ConfigError, ManagerConfig};
pub use manager::JobManager;
pub use messages::{ManagerStats, QueueMessage, SupervisorMessage, WorkerMessage};
pub use processor::{FnProcessor, Processor, ProcessorFuture, ProcessorResult};
pub use queue_actor::{QueueActor, QueueActorState};
pub use sink::{EventSink, TracingSink};
pub use supervisor::{Supervisor, SupervisorArgs, start_supervisor};
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};
