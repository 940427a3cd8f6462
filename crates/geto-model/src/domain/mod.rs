mod host;
pub use host::{DEFAULT_SSH_PORT, Host};

mod task_id;
pub use task_id::TaskId;

mod run_report;
pub use run_report::RunReport;

/// Timeout value in whole seconds.
///
/// `0` means "no timeout" wherever a task timeout is accepted.
pub type TimeoutSecs = u32;
