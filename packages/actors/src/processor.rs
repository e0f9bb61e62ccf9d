//! Processor trait and closure adapter.

use std::future::Future;
use std::pin::Pin;

use jobq_core::JobMetadata;

/// Result type for processors. The error string is recorded on the job.
pub type ProcessorResult = Result<serde_json::Value, String>;

/// Future type for async processors.
pub type ProcessorFuture = Pin<Box<dyn Future<Output = ProcessorResult> + Send>>;

/// Trait for processors.
///
/// Implement this trait to define how the jobs of a queue are executed. The
/// queue core never looks inside the payload. A processor may run more than
/// once for the same job, so side effects must be idempotent.
pub trait Processor: Send + Sync + 'static {
    /// Name used in logs and worker ids.
    fn name(&self) -> &str;

    /// Execute one attempt of a job.
    fn process(&self, payload: serde_json::Value, meta: JobMetadata) -> ProcessorFuture;
}

impl std::fmt::Debug for dyn Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor").field("name", &self.name()).finish()
    }
}

/// A processor built from an async closure.
pub struct FnProcessor<F> {
    name: String,
    handler: F,
}

impl<F, Fut> FnProcessor<F>
where
    F: Fn(serde_json::Value, JobMetadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessorResult> + Send + 'static,
{
    /// Create a new function-based processor.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(serde_json::Value, JobMetadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessorResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, payload: serde_json::Value, meta: JobMetadata) -> ProcessorFuture {
        Box::pin((self.handler)(payload, meta))
    }
}
