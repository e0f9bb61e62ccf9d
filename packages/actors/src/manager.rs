//! Public control API over the supervisor actor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::join_all;
use jobq_core::{
    Job, JobEvent, JobId, JobOptions, JobState, QueueError, QueueInfo, QueueOptions, QueueState,
    QueueStats,
};
use ractor::{ActorRef, RpcReplyPort};
use tokio::sync::broadcast;

use crate::config::ManagerConfig;
use crate::messages::{ManagerStats, QueueMessage, SupervisorMessage, ask};
use crate::processor::Processor;
use crate::sink::{EventSink, TracingSink};
use crate::supervisor::{SupervisorArgs, start_supervisor};

/// Handle to a running job queue system.
///
/// Cheap to clone; every clone talks to the same supervisor. Construct one at
/// application start and pass it to whatever needs to submit or manage jobs.
#[derive(Clone)]
pub struct JobManager {
    supervisor: ActorRef<SupervisorMessage>,
    running: Arc<AtomicBool>,
    event_tx: broadcast::Sender<JobEvent>,
    config: ManagerConfig,
}

impl JobManager {
    /// Spawn the supervisor. Workers stay idle until [`JobManager::start`].
    pub async fn new(config: ManagerConfig) -> Result<Self, QueueError> {
        config
            .validate()
            .map_err(|e| QueueError::InvalidOptions(e.to_string()))?;
        let running = Arc::new(AtomicBool::new(false));
        let (event_tx, _) = broadcast::channel(config.event_capacity);

        let (supervisor, _handle) = start_supervisor(SupervisorArgs {
            config: config.clone(),
            running: running.clone(),
            event_tx: event_tx.clone(),
        })
        .await
        .map_err(|e| QueueError::Actor(format!("Failed to start supervisor: {}", e)))?;

        let manager = Self {
            supervisor,
            running,
            event_tx,
            config,
        };
        if manager.config.log_events {
            manager.add_sink(TracingSink)?;
        }
        Ok(manager)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    async fn call<T, F>(&self, build: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> SupervisorMessage,
    {
        ask(&self.supervisor, build, Some(self.config.rpc_timeout)).await
    }

    /// Create a named queue.
    pub async fn create_queue(
        &self,
        name: impl Into<String>,
        options: QueueOptions,
    ) -> Result<QueueInfo, QueueError> {
        let name = name.into();
        self.call(|reply| SupervisorMessage::CreateQueue {
            name,
            options,
            reply,
        })
        .await?
    }

    /// Register a processor for a queue, returning the new worker's id.
    ///
    /// Several processors may serve the same queue; they share its
    /// concurrency limit.
    pub async fn process_queue(
        &self,
        queue_name: impl Into<String>,
        processor: impl Processor,
    ) -> Result<String, QueueError> {
        let queue_name = queue_name.into();
        let processor: Arc<dyn Processor> = Arc::new(processor);
        self.call(|reply| SupervisorMessage::ProcessQueue {
            queue_name,
            processor,
            reply,
        })
        .await?
    }

    /// Submit a job.
    pub async fn add_job(
        &self,
        queue_name: impl Into<String>,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId, QueueError> {
        let queue_name = queue_name.into();
        self.call(|reply| SupervisorMessage::AddJob {
            queue_name,
            payload,
            options,
            reply,
        })
        .await?
    }

    /// Look up a job in any queue.
    pub async fn get_job(&self, job_id: JobId) -> Result<Job, QueueError> {
        self.call(|reply| SupervisorMessage::GetJob { job_id, reply })
            .await?
    }

    /// Cancel a pending job. Jobs already executing cannot be cancelled.
    pub async fn cancel_job(&self, job_id: JobId) -> Result<Job, QueueError> {
        self.call(|reply| SupervisorMessage::CancelJob { job_id, reply })
            .await?
    }

    /// Jobs of a queue, oldest first.
    pub async fn list_jobs(
        &self,
        queue_name: impl Into<String>,
        state: Option<JobState>,
        limit: usize,
    ) -> Result<Vec<Job>, QueueError> {
        let queue_name = queue_name.into();
        self.call(|reply| SupervisorMessage::ListJobs {
            queue_name,
            state,
            limit,
            reply,
        })
        .await?
    }

    pub async fn pause_queue(&self, queue_name: impl Into<String>) -> Result<(), QueueError> {
        self.set_queue_state(queue_name.into(), QueueState::Paused)
            .await
    }

    pub async fn resume_queue(&self, queue_name: impl Into<String>) -> Result<(), QueueError> {
        self.set_queue_state(queue_name.into(), QueueState::Running)
            .await
    }

    async fn set_queue_state(&self, queue_name: String, state: QueueState) -> Result<(), QueueError> {
        self.call(|reply| SupervisorMessage::SetQueueState {
            queue_name,
            state,
            reply,
        })
        .await?
    }

    pub async fn get_queue_stats(
        &self,
        queue_name: impl Into<String>,
    ) -> Result<QueueStats, QueueError> {
        let queue_name = queue_name.into();
        self.call(|reply| SupervisorMessage::GetQueueStats { queue_name, reply })
            .await?
    }

    pub async fn list_queues(&self) -> Result<Vec<QueueInfo>, QueueError> {
        self.call(|reply| SupervisorMessage::ListQueues { reply })
            .await
    }

    pub async fn get_stats(&self) -> Result<ManagerStats, QueueError> {
        self.call(|reply| SupervisorMessage::GetStats { reply })
            .await
    }

    /// Let workers dispatch jobs.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Job manager started");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop dispatching and wait until no job is executing in any queue.
    ///
    /// Jobs waiting out a retry delay are requeued as usual but not
    /// dispatched until the next `start`.
    pub async fn stop(&self) -> Result<(), QueueError> {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Job manager stopping, draining in-flight jobs");

        let queues: Vec<ActorRef<QueueMessage>> = self
            .call(|reply| SupervisorMessage::QueueRefs { reply })
            .await?;

        let drains = queues
            .iter()
            .map(|queue| ask(queue, |reply| QueueMessage::AwaitDrain { reply }, None));
        for result in join_all(drains).await {
            if let Err(e) = result {
                // A queue that went away has nothing left to drain.
                tracing::debug!("Drain skipped: {}", e);
            }
        }

        tracing::info!("Job manager stopped");
        Ok(())
    }

    /// Drop every queue, worker, job and counter.
    pub async fn clear(&self) -> Result<(), QueueError> {
        self.call(|reply| SupervisorMessage::Clear { reply }).await
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Register an observer for lifecycle events.
    pub fn add_sink(&self, sink: impl EventSink) -> Result<(), QueueError> {
        self.supervisor
            .send_message(SupervisorMessage::AddSink {
                sink: Arc::new(sink),
            })
            .map_err(|_| QueueError::Actor("supervisor is not running".into()))
    }

    /// Drain, then stop the supervisor and every queue and worker actor.
    pub async fn shutdown(self) -> Result<(), QueueError> {
        self.stop().await?;
        self.supervisor
            .send_message(SupervisorMessage::Shutdown)
            .map_err(|_| QueueError::Actor("supervisor is not running".into()))
    }
}
