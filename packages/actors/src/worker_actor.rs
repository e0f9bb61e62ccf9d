//! Worker actor for executing jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use jobq_core::{Job, JobMetadata, QueueError};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::{QueueMessage, WorkerMessage, ask};
use crate::processor::Processor;

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    /// Name of the queue this worker is bound to.
    pub queue_name: String,
    /// Queue actor reference.
    pub queue: ActorRef<QueueMessage>,
    /// The processor run for every job.
    pub processor: Arc<dyn Processor>,
    /// Manager running flag.
    running: Arc<AtomicBool>,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub queue_name: String,
    pub queue: ActorRef<QueueMessage>,
    pub processor: Arc<dyn Processor>,
    pub running: Arc<AtomicBool>,
    pub tick_interval: Duration,
}

/// Worker actor that pulls eligible jobs from its queue and executes them.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting worker {} on queue '{}' with processor {}",
            args.worker_id,
            args.queue_name,
            args.processor.name()
        );

        // Start the scan loop
        let myself_clone = myself.clone();
        let tick_interval = args.tick_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if myself_clone.send_message(WorkerMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            queue_name: args.queue_name,
            queue: args.queue,
            processor: args.processor,
            running: args.running,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Tick => {
                if !state.running.load(Ordering::SeqCst) {
                    return Ok(());
                }

                // No timeout: the queue actor always answers, and a reply
                // dropped after dispatch would strand jobs in `processing`.
                let jobs = match ask(
                    &state.queue,
                    |reply| QueueMessage::RequestJobs {
                        worker_id: state.worker_id.clone(),
                        reply,
                    },
                    None,
                )
                .await
                {
                    Ok(jobs) => jobs,
                    Err(e) => {
                        tracing::warn!(
                            "Worker {} lost its queue '{}': {}",
                            state.worker_id,
                            state.queue_name,
                            e
                        );
                        myself.stop(None);
                        return Ok(());
                    }
                };

                for job in jobs {
                    let processor = state.processor.clone();
                    let queue = state.queue.clone();
                    tokio::spawn(async move {
                        let job_id = job.id;
                        let outcome = execute(processor, job).await;
                        let _ = queue.send_message(QueueMessage::JobFinished { job_id, outcome });
                    });
                }
            }

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.worker_id);
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }
}

/// Run one attempt, racing the processor against the job's timeout.
///
/// The processor runs on its own task so that a panic is reported as a
/// processor error and a timed-out attempt can be aborted.
async fn execute(
    processor: Arc<dyn Processor>,
    job: Job,
) -> Result<serde_json::Value, QueueError> {
    let meta = JobMetadata::from(&job);
    let timeout = Duration::from_millis(job.timeout_ms);
    let payload = job.payload;
    let runner = processor.clone();
    // Built inside the task so a panic while creating the future is caught too.
    let mut task = tokio::spawn(async move { runner.process(payload, meta).await });

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(result))) => Ok(result),
        Ok(Ok(Err(error))) => Err(QueueError::Processor(error)),
        Ok(Err(join_error)) => Err(QueueError::Processor(format!(
            "processor {} crashed: {}",
            processor.name(),
            join_error
        ))),
        Err(_) => {
            task.abort();
            Err(QueueError::Timeout(job.timeout_ms))
        }
    }
}
