//! Message types for actor communication.

use std::sync::Arc;
use std::time::Duration;

use jobq_core::{
    Job, JobEvent, JobId, JobOptions, JobState, QueueError, QueueInfo, QueueOptions, QueueState,
    QueueStats,
};
use ractor::rpc::CallResult;
use ractor::{ActorRef, RpcReplyPort};
use serde::{Deserialize, Serialize};

use crate::processor::Processor;
use crate::sink::EventSink;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Build and admit a new job.
    Enqueue {
        payload: serde_json::Value,
        options: JobOptions,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Hand out as many eligible jobs as free capacity allows.
    RequestJobs {
        worker_id: String,
        reply: RpcReplyPort<Vec<Job>>,
    },

    /// A worker finished an attempt.
    JobFinished {
        job_id: JobId,
        outcome: Result<serde_json::Value, QueueError>,
    },

    /// The retry delay of a job elapsed.
    RetryDue { job_id: JobId },

    /// Cancel a pending job.
    CancelJob {
        job_id: JobId,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Get a job by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// List jobs in this queue.
    ListJobs {
        state: Option<JobState>,
        limit: usize,
        reply: RpcReplyPort<Vec<Job>>,
    },

    /// Pause or resume dispatching.
    SetState {
        state: QueueState,
        reply: RpcReplyPort<QueueState>,
    },

    /// Get queue info.
    GetInfo { reply: RpcReplyPort<QueueInfo> },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Reply once no job of this queue is executing.
    AwaitDrain { reply: RpcReplyPort<()> },

    /// Stop the queue actor.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Scan the queue for eligible jobs.
    Tick,

    /// Shutdown the worker.
    Shutdown,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Create a new queue.
    CreateQueue {
        name: String,
        options: QueueOptions,
        reply: RpcReplyPort<Result<QueueInfo, QueueError>>,
    },

    /// Attach a processor to a queue by spawning a worker.
    ProcessQueue {
        queue_name: String,
        processor: Arc<dyn Processor>,
        reply: RpcReplyPort<Result<String, QueueError>>,
    },

    /// Enqueue a job to a named queue.
    AddJob {
        queue_name: String,
        payload: serde_json::Value,
        options: JobOptions,
        reply: RpcReplyPort<Result<JobId, QueueError>>,
    },

    /// Get a job from any queue.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Cancel a pending job.
    CancelJob {
        job_id: JobId,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// List jobs of one queue.
    ListJobs {
        queue_name: String,
        state: Option<JobState>,
        limit: usize,
        reply: RpcReplyPort<Result<Vec<Job>, QueueError>>,
    },

    /// Pause or resume a queue.
    SetQueueState {
        queue_name: String,
        state: QueueState,
        reply: RpcReplyPort<Result<(), QueueError>>,
    },

    /// Get a queue's stats.
    GetQueueStats {
        queue_name: String,
        reply: RpcReplyPort<Result<QueueStats, QueueError>>,
    },

    /// List all queues.
    ListQueues { reply: RpcReplyPort<Vec<QueueInfo>> },

    /// Aggregate stats across queues.
    GetStats { reply: RpcReplyPort<ManagerStats> },

    /// References to every queue actor, for draining.
    QueueRefs {
        reply: RpcReplyPort<Vec<ActorRef<QueueMessage>>>,
    },

    /// Drop every queue, worker and indexed job.
    Clear { reply: RpcReplyPort<()> },

    /// Register an event sink.
    AddSink { sink: Arc<dyn EventSink> },

    /// Publish an event to the channel and all sinks.
    BroadcastEvent { event: JobEvent },

    /// Shutdown all queues and workers.
    Shutdown,
}

/// Manager-wide counters, summed over every queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerStats {
    pub running: bool,
    pub queues: usize,
    pub workers: usize,
    /// Jobs added since start or the last `clear`.
    pub total_jobs: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub cancelled: u64,
}

impl ManagerStats {
    pub(crate) fn absorb(&mut self, stats: &QueueStats) {
        self.pending += stats.pending;
        self.processing += stats.processing;
        self.completed += stats.completed;
        self.failed += stats.failed;
        self.retried += stats.retried;
        self.cancelled += stats.cancelled;
    }
}

/// Request/reply against an actor, folding mailbox failures into
/// [`QueueError::Actor`].
pub(crate) async fn ask<M, T, F>(
    actor: &ActorRef<M>,
    build: F,
    timeout: Option<Duration>,
) -> Result<T, QueueError>
where
    M: ractor::Message,
    T: Send + 'static,
    F: FnOnce(RpcReplyPort<T>) -> M,
{
    match ractor::rpc::call(actor, build, timeout).await {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(QueueError::Actor(format!(
            "no reply from {} within {:?}",
            actor.get_id(),
            timeout
        ))),
        Ok(CallResult::SenderError) => Err(QueueError::Actor(format!(
            "{} dropped the reply",
            actor.get_id()
        ))),
        Err(_) => Err(QueueError::Actor(format!(
            "{} is not accepting messages",
            actor.get_id()
        ))),
    }
}
