use geto_core::{DispatchOutcome, MetricsBackend};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder, proto::MetricFamily};

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    dispatch_total: IntCounterVec,
    lock_acquire_failures: IntCounterVec,
    lock_stranded: IntCounterVec,
    admission_rejections: IntCounterVec,
}

impl PrometheusMetrics {
    /// Registers every geto counter in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Registers every geto counter in `registry`. Fails if they are already registered there.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let dispatch_total = counter(
            &registry,
            "geto_dispatch_total",
            "Finished dispatches by host and outcome",
            &["host", "outcome"],
        )?;
        let lock_acquire_failures = counter(
            &registry,
            "geto_lock_acquire_failures_total",
            "Dispatches that gave up waiting for the remote lock",
            &["host"],
        )?;
        let lock_stranded = counter(
            &registry,
            "geto_lock_stranded_total",
            "Remote locks that could not be removed and need manual cleanup",
            &["host"],
        )?;
        let admission_rejections = counter(
            &registry,
            "geto_admission_rejections_total",
            "Dispatches refused because the script's concurrency ceiling was reached",
            &["host", "script"],
        )?;

        Ok(Self {
            registry,
            dispatch_total,
            lock_acquire_failures,
            lock_stranded,
            admission_rejections,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format, ready to serve on `/metrics`.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let c = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl MetricsBackend for PrometheusMetrics {
    fn dispatch_finished(&self, host: &str, outcome: DispatchOutcome) {
        self.dispatch_total
            .with_label_values(&[host, outcome.as_label()])
            .inc();
    }

    fn lock_acquire_failed(&self, host: &str) {
        self.lock_acquire_failures.with_label_values(&[host]).inc();
    }

    fn lock_stranded(&self, host: &str) {
        self.lock_stranded.with_label_values(&[host]).inc();
    }

    fn admission_rejected(&self, host: &str, script: &str) {
        self.admission_rejections
            .with_label_values(&[host, script])
            .inc();
    }
}
