//! Boots the job queue with demo processors, runs a batch of jobs and drains.

mod processors;

use jobq_actors::{JobManager, ManagerConfig};
use jobq_core::{JobEvent, JobOptions, Priority, QueueOptions};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = ManagerConfig::from_env()?;
    tracing::info!("Initializing job queue system: {:?}", config);
    let manager = JobManager::new(config).await?;

    manager
        .create_queue(
            "email",
            QueueOptions::default()
                .with_concurrency(2)
                .with_retry_attempts(2)
                .with_retry_delay_ms(200),
        )
        .await?;
    manager
        .create_queue("export", QueueOptions::default().with_concurrency(1))
        .await?;
    manager
        .create_queue(
            "images",
            QueueOptions::default()
                .with_concurrency(4)
                .with_retry_attempts(1)
                .with_timeout_ms(500),
        )
        .await?;

    manager.process_queue("email", processors::email()).await?;
    manager.process_queue("export", processors::export()).await?;
    manager.process_queue("images", processors::images()).await?;

    let mut events = manager.subscribe();
    manager.start();

    let mut submitted = Vec::new();
    for to in ["a@x.com", "b@x.com", "c@bounce.test"] {
        submitted.push(
            manager
                .add_job("email", json!({ "to": to }), JobOptions::new())
                .await?,
        );
    }
    submitted.push(
        manager
            .add_job(
                "email",
                json!({ "to": "vip@x.com" }),
                JobOptions::new().with_priority(Priority::Urgent),
            )
            .await?,
    );
    submitted.push(
        manager
            .add_job(
                "export",
                json!({ "rows": 120 }),
                JobOptions::new().with_delay_ms(250),
            )
            .await?,
    );
    for megapixels in [2, 8, 40] {
        submitted.push(
            manager
                .add_job("images", json!({ "megapixels": megapixels }), JobOptions::new())
                .await?,
        );
    }

    // Wait until every submitted job reached a terminal state.
    let mut remaining = submitted.len();
    while remaining > 0 {
        match events.recv().await {
            Ok(JobEvent::JobCompleted { .. } | JobEvent::JobFailed { .. }) => remaining -= 1,
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event stream lagged by {} events", skipped);
                break;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    for job_id in &submitted {
        let job = manager.get_job(*job_id).await?;
        tracing::info!(
            "{} [{}] {} after {} attempt(s)",
            job.id,
            job.queue_name,
            job.state,
            job.attempts.current
        );
    }

    let stats = manager.get_stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    manager.shutdown().await?;
    Ok(())
}
