#![allow(dead_code)]

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use jobq_actors::{FnProcessor, JobManager, ManagerConfig, Processor, ProcessorResult};
use jobq_core::{Job, JobId, JobMetadata, JobState};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// A manager with a fast tick so tests do not wait on the default interval.
pub async fn manager() -> TestResult<JobManager> {
    // Set RUST_LOG to see actor logs; repeated init across tests is ignored.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let config = ManagerConfig::default()
        .with_tick_interval(Duration::from_millis(10))
        .with_log_events(false);
    Ok(JobManager::new(config).await?)
}

/// Poll until the job reaches `state`, failing after a few seconds.
pub async fn wait_for_state(manager: &JobManager, id: JobId, state: JobState) -> TestResult<Job> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let job = manager.get_job(id).await?;
        if job.state == state {
            return Ok(job);
        }
        if Instant::now() > deadline {
            return Err(format!("job {} stuck in {} waiting for {}", id, job.state, state).into());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Always fails, counting invocations.
pub fn failing(calls: Arc<AtomicUsize>) -> impl Processor {
    FnProcessor::new("failing", move |_payload: Value, _meta: JobMetadata| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let result: ProcessorResult = Err("smtp unavailable".to_string());
            result
        }
    })
}

/// Sleeps for `millis`, then echoes the payload.
pub fn sleeping(millis: u64) -> impl Processor {
    FnProcessor::new("sleeping", move |payload: Value, meta: JobMetadata| async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        let result: ProcessorResult = Ok(json!({ "echo": payload, "attempt": meta.attempt }));
        result
    })
}
