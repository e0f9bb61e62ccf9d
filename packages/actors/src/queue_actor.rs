//! Queue actor owning a single queue's jobs.
//!
//! Every state transition of a job happens inside this actor's message
//! handler, so dispatch, completion and cancellation never race each other.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use jobq_core::{FailureOutcome, JobEvent, JobId, Queue, QueueError};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};

use crate::messages::{QueueMessage, SupervisorMessage};

/// State for the queue actor.
pub struct QueueActorState {
    /// The queue and its jobs.
    pub queue: Queue,
    /// Supervisor reference for event forwarding.
    supervisor: Option<ActorRef<SupervisorMessage>>,
    /// Manager running flag; nothing is dispatched while it is false.
    running: Arc<AtomicBool>,
    /// Callers waiting for `processing` to empty.
    drain_waiters: Vec<RpcReplyPort<()>>,
}

impl QueueActorState {
    /// Create a new queue actor state.
    pub fn new(queue: Queue) -> Self {
        Self {
            queue,
            supervisor: None,
            running: Arc::new(AtomicBool::new(true)),
            drain_waiters: Vec::new(),
        }
    }

    /// Set the supervisor reference.
    pub fn with_supervisor(mut self, supervisor: ActorRef<SupervisorMessage>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Share the manager's running flag.
    pub fn with_running(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Forward an event to the supervisor for publication.
    fn broadcast(&self, event: JobEvent) {
        if let Some(ref supervisor) = self.supervisor {
            let _ = supervisor.send_message(SupervisorMessage::BroadcastEvent { event });
        }
    }

    /// Release drain waiters once nothing is executing.
    fn notify_drained(&mut self) {
        if self.queue.is_drained() {
            for waiter in self.drain_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn finish(
        &mut self,
        myself: &ActorRef<QueueMessage>,
        job_id: JobId,
        outcome: Result<serde_json::Value, QueueError>,
    ) {
        let now = Utc::now();
        let name = self.queue.name().to_string();

        match outcome {
            Ok(result) => match self.queue.complete(job_id, result, now) {
                Ok(job) => self.broadcast(JobEvent::JobCompleted {
                    job_id,
                    queue_name: name,
                    duration_ms: job.duration_ms().unwrap_or_default(),
                    timestamp: now,
                }),
                Err(e) => tracing::warn!("Dropping completion of job {}: {}", job_id, e),
            },
            Err(error) => match self.queue.fail(job_id, &error, now) {
                Ok(FailureOutcome::Retry { job, delay_ms }) => {
                    tracing::warn!(
                        "Job {} attempt {}/{} failed: {}",
                        job_id,
                        job.attempts.current,
                        job.attempts.max,
                        error
                    );
                    schedule_retry(myself.clone(), job_id, delay_ms);
                    self.broadcast(JobEvent::JobRetrying {
                        job_id,
                        queue_name: name,
                        error: error.to_string(),
                        attempt: job.attempts.current,
                        retry_in_ms: delay_ms,
                        timestamp: now,
                    });
                }
                Ok(FailureOutcome::Failed(job)) => self.broadcast(JobEvent::JobFailed {
                    job_id,
                    queue_name: name,
                    error: error.to_string(),
                    attempts: job.attempts.current,
                    timestamp: now,
                }),
                Err(e) => tracing::warn!("Dropping failure of job {}: {}", job_id, e),
            },
        }

        self.notify_drained();
    }
}

/// Send `RetryDue` to the queue once `delay_ms` has elapsed.
fn schedule_retry(queue: ActorRef<QueueMessage>, job_id: JobId, delay_ms: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        // The queue may have been cleared in the meantime.
        let _ = queue.send_message(QueueMessage::RetryDue { job_id });
    });
}

/// Queue actor that manages a single queue.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueActorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue actor: {}", args.queue.name());
        Ok(args)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // Waiters would otherwise block forever on a queue that no longer exists.
        for waiter in state.drain_waiters.drain(..) {
            let _ = waiter.send(());
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Enqueue {
                payload,
                options,
                reply,
            } => {
                let admitted = options
                    .build_job(state.queue.name(), payload, state.queue.options())
                    .and_then(|job| {
                        state.queue.admit(job.clone())?;
                        Ok(job)
                    });

                if let Ok(ref job) = admitted {
                    state.broadcast(JobEvent::JobAdded {
                        job: job.clone(),
                        timestamp: Utc::now(),
                    });
                }
                let _ = reply.send(admitted);
            }

            QueueMessage::RequestJobs { worker_id, reply } => {
                // Checked here as well as in the worker: once `stop` has
                // queued its drain request, no later request may dispatch.
                if !state.running.load(Ordering::SeqCst) {
                    let _ = reply.send(Vec::new());
                    return Ok(());
                }

                let now = Utc::now();
                let jobs = state.queue.dispatch(now, usize::MAX);

                for job in &jobs {
                    tracing::debug!(
                        "Dispatching job {} to {} (attempt {})",
                        job.id,
                        worker_id,
                        job.attempts.current
                    );
                    state.broadcast(JobEvent::JobStarted {
                        job_id: job.id,
                        queue_name: job.queue_name.clone(),
                        worker_id: worker_id.clone(),
                        attempt: job.attempts.current,
                        timestamp: now,
                    });
                }

                let _ = reply.send(jobs);
            }

            QueueMessage::JobFinished { job_id, outcome } => {
                state.finish(&myself, job_id, outcome);
            }

            QueueMessage::RetryDue { job_id } => {
                if let Err(e) = state.queue.requeue(job_id) {
                    tracing::warn!("Cannot requeue job {}: {}", job_id, e);
                }
            }

            QueueMessage::CancelJob { job_id, reply } => {
                let cancelled = state.queue.cancel(job_id, Utc::now());
                if let Ok(ref job) = cancelled {
                    state.broadcast(JobEvent::JobCancelled {
                        job_id,
                        queue_name: job.queue_name.clone(),
                        timestamp: job.completed_at.unwrap_or_else(Utc::now),
                    });
                }
                let _ = reply.send(cancelled);
            }

            QueueMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.queue.get(job_id).cloned());
            }

            QueueMessage::ListJobs {
                state: filter,
                limit,
                reply,
            } => {
                let _ = reply.send(state.queue.jobs(filter, limit));
            }

            QueueMessage::SetState {
                state: new_state,
                reply,
            } => {
                let old_state = state.queue.set_state(new_state);
                if old_state != new_state {
                    state.broadcast(JobEvent::QueueStateChanged {
                        queue_name: state.queue.name().to_string(),
                        old_state,
                        new_state,
                        timestamp: Utc::now(),
                    });
                }
                let _ = reply.send(old_state);
            }

            QueueMessage::GetInfo { reply } => {
                let _ = reply.send(state.queue.info());
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.queue.stats().clone());
            }

            QueueMessage::AwaitDrain { reply } => {
                state.drain_waiters.push(reply);
                state.notify_drained();
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue: {}", state.queue.name());
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }
}
