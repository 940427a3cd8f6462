//! Metrics seam for the dispatch engine.
//!
//! The engine reports events through [`MetricsBackend`]; a backend decides how (or whether) to export them.

use std::sync::Arc;

/// How a dispatch attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The wrapper ran on the host.
    Launched,
    /// Admission control turned the task away.
    Rejected,
    /// Any other failure.
    Failed,
}

impl DispatchOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchOutcome::Launched => "launched",
            DispatchOutcome::Rejected => "rejected",
            DispatchOutcome::Failed => "failed",
        }
    }
}

pub trait MetricsBackend: Send + Sync {
    fn dispatch_finished(&self, host: &str, outcome: DispatchOutcome);

    fn lock_acquire_failed(&self, host: &str);

    /// A lock could not be released and now blocks every dispatch to `host` until removed by hand.
    fn lock_stranded(&self, host: &str);

    fn admission_rejected(&self, host: &str, script: &str);
}

/// Backend that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {
    fn dispatch_finished(&self, _host: &str, _outcome: DispatchOutcome) {}
    fn lock_acquire_failed(&self, _host: &str) {}
    fn lock_stranded(&self, _host: &str) {}
    fn admission_rejected(&self, _host: &str, _script: &str) {}
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

pub fn noop() -> MetricsHandle {
    Arc::new(NoopMetrics)
}
