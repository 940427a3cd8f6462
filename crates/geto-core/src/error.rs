use std::num::ParseIntError;

use geto_model::ModelError;
use thiserror::Error;

use crate::{CommandOutput, ConfigError, TransportError};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid script: {0}")]
    Script(#[from] ModelError),

    #[error("failed to generate task id: {0}")]
    TaskId(String),

    #[error("failed to package task: {context}: {source}")]
    Packaging {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to acquire remote lock on {host}: {source}")]
    LockNotAcquired {
        host: String,
        #[source]
        source: TransportError,
    },

    #[error("running-count probe on {host} failed: {source}")]
    Probe {
        host: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to parse running count {output:?}: {source}")]
    RunningCountParse {
        output: String,
        #[source]
        source: ParseIntError,
    },

    #[error("max concurrent ({max}) \"{script}\" scripts already running ({running} running)")]
    CeilingReached { running: u32, max: u32, script: String },

    #[error("failed to create remote work directory {path}: {source}")]
    RemoteWorkDir {
        path: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to copy {local} to {host}:{remote}: {source}")]
    CopyTo {
        host: String,
        local: String,
        remote: String,
        #[source]
        source: TransportError,
    },

    #[error("remote execution failed: {0}")]
    Remote(#[source] TransportError),

    #[error("no hosts configured")]
    NoHosts,

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("host selection aborted, probe of {host} failed: {source}")]
    Selection {
        host: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error("background task failed: {0}")]
    Join(String),
}

impl CoreError {
    /// Remote output captured before the failure, when the underlying transport provided any.
    pub fn output(&self) -> Option<&CommandOutput> {
        match self {
            CoreError::LockNotAcquired { source, .. }
            | CoreError::Probe { source, .. }
            | CoreError::RemoteWorkDir { source, .. }
            | CoreError::Remote(source) => source.output(),
            _ => None,
        }
    }

    pub(crate) fn packaging(context: impl Into<String>, source: std::io::Error) -> Self {
        CoreError::Packaging {
            context: context.into(),
            source,
        }
    }
}
