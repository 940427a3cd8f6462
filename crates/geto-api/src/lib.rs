mod error;
pub use error::ApiError;

mod request;
pub use request::{DispatchRequest, TargetSpec};

mod handler;
pub use handler::ApiHandler;

mod adapter;
pub use adapter::DispatcherAdapter;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpApi;

#[cfg(feature = "http")]
pub use axum;
