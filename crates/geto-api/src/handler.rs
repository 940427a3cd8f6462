use async_trait::async_trait;
use geto_model::{Host, RunReport};

use crate::{error::ApiError, request::DispatchRequest};

/// Dispatch API handler.
///
/// Front ends (HTTP, CLI) talk to this trait rather than to the dispatcher directly, so a deployment can put its own checks in front of [`crate::DispatcherAdapter`].
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Runs one task. Pipeline failures are reported inside the [`RunReport`]; `Err` means the request itself was unusable.
    async fn dispatch(&self, req: DispatchRequest) -> Result<RunReport, ApiError>;

    /// Configured hosts, passwords removed.
    async fn hosts(&self) -> Result<Vec<Host>, ApiError>;
}
