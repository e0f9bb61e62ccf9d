//! Demo processors for the storefront's background queues.

use std::time::Duration;

use jobq_actors::{FnProcessor, Processor};
use jobq_core::JobMetadata;
use serde_json::{Value, json};

/// Pretend to send an order confirmation email.
pub fn email() -> impl Processor {
    FnProcessor::new("smtp", |payload: Value, meta: JobMetadata| async move {
        let Some(to) = payload.get("to").and_then(Value::as_str).map(str::to_string) else {
            return Err("payload has no recipient".to_string());
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        if to.ends_with("@bounce.test") {
            return Err(format!("mailbox {} rejected the message", to));
        }

        tracing::info!("Sent email to {} (attempt {})", to, meta.attempt);
        Ok(json!({ "delivered_to": to }))
    })
}

/// Pretend to export orders to CSV.
pub fn export() -> impl Processor {
    FnProcessor::new("csv-export", |payload: Value, _meta: JobMetadata| async move {
        let rows = payload.get("rows").and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(rows.min(500))).await;
        Ok::<_, String>(json!({ "rows_written": rows, "file": format!("orders-{}.csv", rows) }))
    })
}

/// Pretend to resize a product image. Large images exceed the queue timeout.
pub fn images() -> impl Processor {
    FnProcessor::new("thumbnailer", |payload: Value, _meta: JobMetadata| async move {
        let megapixels = payload.get("megapixels").and_then(Value::as_u64).unwrap_or(1);
        tokio::time::sleep(Duration::from_millis(megapixels * 20)).await;
        Ok::<_, String>(json!({ "thumbnail": true }))
    })
}
