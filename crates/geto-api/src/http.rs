use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use geto_model::Host;
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, handler::ApiHandler, request::DispatchRequest};

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Routes:
    /// - POST /api/v1/dispatch - Run a task, answers with its report
    /// - GET /api/v1/hosts - Configured hosts
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/dispatch", post(dispatch::<H>))
            .route("/api/v1/hosts", get(hosts::<H>))
            .with_state(self.handler)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HostsResponse {
    hosts: Vec<Host>,
}

/// POST /api/v1/dispatch
async fn dispatch<H>(
    State(handler): State<Arc<H>>,
    Json(req): Json<DispatchRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let report = handler.dispatch(req).await?;
    Ok(Json(report))
}

/// GET /api/v1/hosts
async fn hosts<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let hosts = handler.hosts().await?;
    Ok(Json(HostsResponse { hosts }))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use geto_model::{MaxConcurrent, RunReport, Script};

    use super::*;
    use crate::TargetSpec;

    struct Fixed;

    #[async_trait]
    impl ApiHandler for Fixed {
        async fn dispatch(&self, req: DispatchRequest) -> Result<RunReport, ApiError> {
            match req.target {
                TargetSpec::Host(name) if name != "alpha" => Err(ApiError::UnknownHost(name)),
                _ => Ok(RunReport {
                    stdout: format!("ran {}", req.script.name()),
                    ..Default::default()
                }),
            }
        }

        async fn hosts(&self) -> Result<Vec<Host>, ApiError> {
            Ok(vec![Host::new("alpha", "10.0.0.1", "geto")])
        }
    }

    fn req(target: TargetSpec) -> DispatchRequest {
        DispatchRequest {
            script: Script::new("noop", MaxConcurrent::Unlimited),
            deps: vec![],
            timeout_secs: 0,
            target,
        }
    }

    #[tokio::test]
    async fn dispatch_handler_answers_with_report() {
        let resp = dispatch(State(Arc::new(Fixed)), Json(req(TargetSpec::Random)))
            .await
            .unwrap()
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_host_maps_to_not_found() {
        let err = dispatch(State(Arc::new(Fixed)), Json(req(TargetSpec::Host("zeta".into()))))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            ApiError::InvalidRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Core(geto_core::CoreError::NoHosts)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn router_builds() {
        let _ = HttpApi::new(Arc::new(Fixed)).router();
    }
}
