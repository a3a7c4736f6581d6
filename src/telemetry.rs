//! Telemetry utilities for pipeline step timing and span conventions.

use std::time::Instant;
use tracing::debug;

/// Guard for timing a pipeline step or plugin call.
///
/// Logs the elapsed time at debug level when dropped.
pub struct StepTimer {
    step: &'static str,
    start: Instant,
}

impl StepTimer {
    /// Start timing a step.
    pub fn new(step: &'static str) -> Self {
        Self {
            step,
            start: Instant::now(),
        }
    }
}

impl Drop for StepTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        debug!(step = self.step, elapsed_ms, "Step finished");
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one step of the startup pipeline.
    pub fn pipeline_step(step: u8, name: &str) -> Span {
        info_span!("pipeline_step", step, name = %name)
    }

    /// Span for a plugin reload request.
    pub fn reload(requested_by: Option<&str>) -> Span {
        if let Some(source) = requested_by {
            info_span!("reload", source = %source)
        } else {
            info_span!("reload")
        }
    }

    /// Span for a plugin call.
    pub fn plugin(id: &str) -> Span {
        info_span!("plugin", id = %id)
    }

    /// Span for dispatching one bot event.
    pub fn event(kind: &str, channel: Option<&str>) -> Span {
        if let Some(channel) = channel {
            info_span!("event", kind = %kind, channel = %channel)
        } else {
            info_span!("event", kind = %kind)
        }
    }
}
