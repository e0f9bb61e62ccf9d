//! Event sinks: observers that receive every lifecycle event.

use jobq_core::{JobEvent, Severity};

/// An audit/observability consumer of job events.
///
/// Sinks are invoked from the supervisor actor, one event at a time and in
/// publication order. Implementations must not block.
pub trait EventSink: Send + Sync + 'static {
    fn record(&self, event: &JobEvent);
}

impl std::fmt::Debug for dyn EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EventSink")
    }
}

impl<F> EventSink for F
where
    F: Fn(&JobEvent) + Send + Sync + 'static,
{
    fn record(&self, event: &JobEvent) {
        self(event)
    }
}

/// Logs events through `tracing` at a level derived from their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &JobEvent) {
        let queue = event.queue_name();
        match event.severity() {
            Severity::High => tracing::error!(queue, "{}", event.description()),
            Severity::Warning => tracing::warn!(queue, "{}", event.description()),
            Severity::Info => tracing::info!(queue, "{}", event.description()),
            Severity::Debug => tracing::debug!(queue, "{}", event.description()),
        }
    }
}
