use std::sync::Arc;

use async_trait::async_trait;
use geto_core::{CoreError, Dispatcher, Task};
use geto_model::{Host, RunReport};
use tracing::debug;

use crate::{
    error::ApiError,
    handler::ApiHandler,
    request::{DispatchRequest, TargetSpec},
};

/// [`ApiHandler`] backed directly by a [`Dispatcher`].
pub struct DispatcherAdapter {
    dispatcher: Arc<Dispatcher>,
}

impl DispatcherAdapter {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl ApiHandler for DispatcherAdapter {
    async fn dispatch(&self, req: DispatchRequest) -> Result<RunReport, ApiError> {
        if let TargetSpec::Host(name) = &req.target {
            if self.dispatcher.config().host(name).is_none() {
                return Err(ApiError::UnknownHost(name.clone()));
            }
        }

        let task = Task::new(req.deps, req.script, req.timeout_secs).map_err(|e| match e {
            CoreError::Script(e) => ApiError::InvalidRequest(e.to_string()),
            other => ApiError::Core(other),
        })?;
        debug!(target: "geto.api", task = %task.id(), target = %req.target, "dispatch request accepted");

        let result = self.dispatcher.submit(&task, req.target.into_target()).await;
        Ok(result.into())
    }

    async fn hosts(&self) -> Result<Vec<Host>, ApiError> {
        Ok(self
            .dispatcher
            .config()
            .hosts
            .iter()
            .map(Host::redacted)
            .collect())
    }
}
