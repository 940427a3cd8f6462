//! Dispatch engine: packages a task, coordinates with the target host through a remote lock, enforces the script's concurrency ceiling and launches it.
//!
//! Hosts are reached only through the [`Transport`] trait; the engine never assumes how commands are executed or files copied.

pub mod error;
pub use error::CoreError;

pub mod config;
pub use config::{ConfigError, DispatchConfig};

pub mod transport;
pub use transport::{CommandOutput, Transport, TransportError};

pub mod metrics;
pub use metrics::{DispatchOutcome, MetricsBackend, NoopMetrics};

pub mod task;
pub use task::{Task, generate_task_id};

pub mod lock;
pub use lock::{LockPolicy, RemoteLock};

pub mod admission;
pub mod wrapper;

pub mod dispatcher;
pub use dispatcher::{Dispatcher, RunResult};

pub mod select;
pub use select::Target;
