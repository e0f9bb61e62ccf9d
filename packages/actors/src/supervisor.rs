//! Supervisor actor for managing all queues and workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use jobq_core::{JobEvent, JobId, Queue, QueueError, QueueOptions};
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;

use crate::config::ManagerConfig;
use crate::messages::{ManagerStats, QueueMessage, SupervisorMessage, WorkerMessage, ask};
use crate::processor::Processor;
use crate::queue_actor::{QueueActor, QueueActorState};
use crate::sink::EventSink;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// A registered processor and the worker actor running it.
struct WorkerEntry {
    worker_id: String,
    actor: ActorRef<WorkerMessage>,
    processor: Arc<dyn Processor>,
}

/// Supervisor actor arguments.
pub struct SupervisorArgs {
    pub config: ManagerConfig,
    pub running: Arc<AtomicBool>,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    /// All queue actors by name.
    queues: HashMap<String, ActorRef<QueueMessage>>,
    /// Workers by queue name.
    workers: HashMap<String, Vec<WorkerEntry>>,
    /// Global job index: which queue owns each job.
    job_index: HashMap<JobId, String>,
    /// Jobs added since the last clear.
    total_jobs: u64,
    /// Event broadcaster.
    event_tx: broadcast::Sender<JobEvent>,
    /// Observers notified of every event.
    sinks: Vec<Arc<dyn EventSink>>,
    running: Arc<AtomicBool>,
    config: ManagerConfig,
    /// Worker counter for unique IDs.
    worker_counter: u64,
}

impl SupervisorState {
    /// Create a new supervisor state.
    pub fn new(args: SupervisorArgs) -> Self {
        Self {
            queues: HashMap::new(),
            workers: HashMap::new(),
            job_index: HashMap::new(),
            total_jobs: 0,
            event_tx: args.event_tx,
            sinks: Vec::new(),
            running: args.running,
            config: args.config,
            worker_counter: 0,
        }
    }

    /// Generate a unique worker ID.
    fn next_worker_id(&mut self, queue_name: &str) -> String {
        self.worker_counter += 1;
        format!("{}-worker-{}", queue_name, self.worker_counter)
    }

    fn queue(&self, name: &str) -> Result<&ActorRef<QueueMessage>, QueueError> {
        self.queues
            .get(name)
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    /// Resolve the queue actor owning `job_id` through the job index.
    fn queue_of(&self, job_id: JobId) -> Result<&ActorRef<QueueMessage>, QueueError> {
        self.job_index
            .get(&job_id)
            .and_then(|name| self.queues.get(name))
            .ok_or(QueueError::JobNotFound(job_id))
    }

    fn publish(&self, event: JobEvent) {
        for sink in &self.sinks {
            sink.record(&event);
        }
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Stop the queue actor and workers registered under `name`, returning
    /// the processors so they can be re-attached.
    fn retire_queue(&mut self, name: &str) -> Vec<Arc<dyn Processor>> {
        if let Some(queue_ref) = self.queues.remove(name) {
            let _ = queue_ref.send_message(QueueMessage::Shutdown);
        }
        self.job_index.retain(|_, queue_name| queue_name != name);
        self.workers
            .remove(name)
            .unwrap_or_default()
            .into_iter()
            .map(|entry| {
                let _ = entry.actor.send_message(WorkerMessage::Shutdown);
                entry.processor
            })
            .collect()
    }
}

async fn spawn_queue_actor(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    name: &str,
    options: QueueOptions,
) -> Result<ActorRef<QueueMessage>, QueueError> {
    let queue_state = QueueActorState::new(Queue::new(name, options))
        .with_supervisor(myself.clone())
        .with_running(state.running.clone());

    let (actor, _handle) = Actor::spawn_linked(None, QueueActor, queue_state, myself.get_cell())
        .await
        .map_err(|e| QueueError::Actor(format!("Failed to spawn queue: {}", e)))?;

    state.queues.insert(name.to_string(), actor.clone());
    Ok(actor)
}

async fn spawn_worker(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    queue_name: &str,
    processor: Arc<dyn Processor>,
) -> Result<String, QueueError> {
    let queue = state.queue(queue_name)?.clone();
    let worker_id = state.next_worker_id(queue_name);
    let args = WorkerArgs {
        worker_id: worker_id.clone(),
        queue_name: queue_name.to_string(),
        queue,
        processor: processor.clone(),
        running: state.running.clone(),
        tick_interval: state.config.tick_interval,
    };

    let (actor, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
        .await
        .map_err(|e| QueueError::Actor(format!("Failed to spawn worker: {}", e)))?;

    state
        .workers
        .entry(queue_name.to_string())
        .or_default()
        .push(WorkerEntry {
            worker_id: worker_id.clone(),
            actor,
            processor,
        });

    Ok(worker_id)
}

/// Supervisor actor that manages all queues.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting job queue supervisor");
        Ok(SupervisorState::new(args))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let rpc_timeout = Some(state.config.rpc_timeout);

        match message {
            SupervisorMessage::CreateQueue {
                name,
                options,
                reply,
            } => {
                if let Err(e) = options.validate() {
                    let _ = reply.send(Err(e));
                    return Ok(());
                }

                let mut processors = Vec::new();
                if state.queues.contains_key(&name) {
                    if !state.config.replace_existing_queues {
                        let _ = reply.send(Err(QueueError::QueueAlreadyExists(name)));
                        return Ok(());
                    }
                    tracing::warn!("Replacing queue '{}', dropping its pending jobs", name);
                    processors = state.retire_queue(&name);
                }

                let actor = match spawn_queue_actor(&myself, state, &name, options).await {
                    Ok(actor) => actor,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        return Ok(());
                    }
                };

                for processor in processors {
                    if let Err(e) = spawn_worker(&myself, state, &name, processor).await {
                        tracing::warn!("Failed to re-attach worker to '{}': {}", name, e);
                    }
                }

                let info = ask(&actor, |reply| QueueMessage::GetInfo { reply }, rpc_timeout).await;
                if let Ok(ref queue) = info {
                    state.publish(JobEvent::QueueCreated {
                        queue: queue.clone(),
                        timestamp: Utc::now(),
                    });
                }
                let _ = reply.send(info);
            }

            SupervisorMessage::ProcessQueue {
                queue_name,
                processor,
                reply,
            } => {
                let result = spawn_worker(&myself, state, &queue_name, processor).await;
                if let Ok(ref worker_id) = result {
                    state.publish(JobEvent::WorkerRegistered {
                        worker_id: worker_id.clone(),
                        queue_name,
                        timestamp: Utc::now(),
                    });
                }
                let _ = reply.send(result);
            }

            SupervisorMessage::AddJob {
                queue_name,
                payload,
                options,
                reply,
            } => {
                let result = match state.queue(&queue_name) {
                    Ok(queue_ref) => {
                        ask(
                            queue_ref,
                            |reply| QueueMessage::Enqueue {
                                payload,
                                options,
                                reply,
                            },
                            rpc_timeout,
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };

                match result {
                    Ok(Ok(job)) => {
                        state.job_index.insert(job.id, queue_name);
                        state.total_jobs += 1;
                        let _ = reply.send(Ok(job.id));
                    }
                    Ok(Err(e)) | Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            SupervisorMessage::GetJob { job_id, reply } => {
                let result = match state.queue_of(job_id) {
                    Ok(queue_ref) => {
                        ask(
                            queue_ref,
                            |reply| QueueMessage::GetJob { job_id, reply },
                            rpc_timeout,
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result.and_then(|job| job.ok_or(QueueError::JobNotFound(job_id))));
            }

            SupervisorMessage::CancelJob { job_id, reply } => {
                let result = match state.queue_of(job_id) {
                    Ok(queue_ref) => {
                        ask(
                            queue_ref,
                            |reply| QueueMessage::CancelJob { job_id, reply },
                            rpc_timeout,
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result.and_then(|cancelled| cancelled));
            }

            SupervisorMessage::ListJobs {
                queue_name,
                state: filter,
                limit,
                reply,
            } => {
                let result = match state.queue(&queue_name) {
                    Ok(queue_ref) => {
                        ask(
                            queue_ref,
                            |reply| QueueMessage::ListJobs {
                                state: filter,
                                limit,
                                reply,
                            },
                            rpc_timeout,
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }

            SupervisorMessage::SetQueueState {
                queue_name,
                state: new_state,
                reply,
            } => {
                let result = match state.queue(&queue_name) {
                    Ok(queue_ref) => ask(
                        queue_ref,
                        |reply| QueueMessage::SetState {
                            state: new_state,
                            reply,
                        },
                        rpc_timeout,
                    )
                    .await
                    .map(|_| ()),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }

            SupervisorMessage::GetQueueStats { queue_name, reply } => {
                let result = match state.queue(&queue_name) {
                    Ok(queue_ref) => {
                        ask(queue_ref, |reply| QueueMessage::GetStats { reply }, rpc_timeout).await
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }

            SupervisorMessage::ListQueues { reply } => {
                let mut queues = Vec::new();
                for queue_ref in state.queues.values() {
                    match ask(queue_ref, |reply| QueueMessage::GetInfo { reply }, rpc_timeout)
                        .await
                    {
                        Ok(queue) => queues.push(queue),
                        Err(e) => tracing::warn!("Skipping unresponsive queue: {}", e),
                    }
                }
                queues.sort_by(|a, b| a.name.cmp(&b.name));
                let _ = reply.send(queues);
            }

            SupervisorMessage::GetStats { reply } => {
                let mut stats = ManagerStats {
                    running: state.running.load(Ordering::SeqCst),
                    queues: state.queues.len(),
                    workers: state.workers.values().map(Vec::len).sum(),
                    total_jobs: state.total_jobs,
                    ..ManagerStats::default()
                };
                for queue_ref in state.queues.values() {
                    match ask(queue_ref, |reply| QueueMessage::GetStats { reply }, rpc_timeout)
                        .await
                    {
                        Ok(queue_stats) => stats.absorb(&queue_stats),
                        Err(e) => tracing::warn!("Skipping unresponsive queue: {}", e),
                    }
                }
                let _ = reply.send(stats);
            }

            SupervisorMessage::QueueRefs { reply } => {
                let _ = reply.send(state.queues.values().cloned().collect());
            }

            SupervisorMessage::Clear { reply } => {
                tracing::info!("Clearing {} queues", state.queues.len());
                let names: Vec<String> = state.queues.keys().cloned().collect();
                for name in names {
                    state.retire_queue(&name);
                }
                state.workers.clear();
                state.job_index.clear();
                state.total_jobs = 0;
                let _ = reply.send(());
            }

            SupervisorMessage::AddSink { sink } => {
                state.sinks.push(sink);
            }

            SupervisorMessage::BroadcastEvent { event } => {
                state.publish(event);
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                let names: Vec<String> = state.queues.keys().cloned().collect();
                for name in names {
                    state.retire_queue(&name);
                }
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, error) => {
                tracing::error!("Child actor {} failed: {}", cell.get_id(), error);
                // Forget the dead actor so callers get QueueNotFound instead of timeouts.
                state.queues.retain(|_, queue_ref| queue_ref.get_id() != cell.get_id());
                for workers in state.workers.values_mut() {
                    workers.retain(|entry| entry.actor.get_id() != cell.get_id());
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::debug!("Child actor {} terminated: {:?}", cell.get_id(), reason);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start the supervisor.
pub async fn start_supervisor(
    args: SupervisorArgs,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(None, Supervisor, args).await
}
