//! Prometheus metrics backend for the geto dispatcher.
//!
//! [`PrometheusMetrics`] implements [`geto_core::MetricsBackend`]; hand it to [`geto_core::Dispatcher::with_metrics`].
//!
//! ## Metrics
//! - `geto_dispatch_total{host, outcome}` - Counter (`outcome` is `launched`, `rejected` or `failed`)
//! - `geto_lock_acquire_failures_total{host}` - Counter
//! - `geto_lock_stranded_total{host}` - Counter
//! - `geto_admission_rejections_total{host, script}` - Counter
//!
//! ## HTTP
//! No server lives here. [`PrometheusMetrics::encode_text`] renders the exposition format for whatever endpoint the binary serves.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
