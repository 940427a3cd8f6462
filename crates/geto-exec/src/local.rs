//! Transport that treats the local machine as every host.
//!
//! Commands run through `sh -c`; "remote" paths are local paths. Useful for single-box setups and for exercising the full pipeline without a network.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use geto_core::{CommandOutput, Transport, TransportError, task::copy_into};
use geto_model::{Host, TimeoutSecs};
use tokio::process::Command;
use tracing::debug;

use crate::util::run_captured;

#[derive(Debug, Clone, Default)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }

    /// `cp [-r] src dst_dir/` semantics: `src` lands inside `dst_dir` under its own name.
    async fn copy(recursive: bool, src: PathBuf, dst_dir: PathBuf) -> Result<(), TransportError> {
        tokio::task::spawn_blocking(move || {
            if !recursive && src.is_dir() {
                return Err(TransportError::Copy(format!(
                    "{} is a directory (not copied)",
                    src.display()
                )));
            }
            if !dst_dir.is_dir() {
                return Err(TransportError::Copy(format!(
                    "{} is not a directory",
                    dst_dir.display()
                )));
            }
            copy_into(&src, &dst_dir)
                .map_err(|e| TransportError::Copy(format!("{}: {e}", src.display())))
        })
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn test_connection(&self, _host: &Host) -> Result<(), TransportError> {
        Ok(())
    }

    async fn run(
        &self,
        host: &Host,
        command: &str,
        timeout_secs: TimeoutSecs,
    ) -> Result<CommandOutput, TransportError> {
        debug!(target: "geto.exec.local", host = %host.name, command, "sh -c");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        Ok(run_captured(cmd, timeout_secs).await?)
    }

    async fn copy_to(
        &self,
        _host: &Host,
        recursive: bool,
        local: &Path,
        remote: &str,
    ) -> Result<(), TransportError> {
        Self::copy(recursive, local.to_path_buf(), PathBuf::from(remote)).await
    }

    async fn copy_from(
        &self,
        _host: &Host,
        recursive: bool,
        remote: &str,
        local: &Path,
    ) -> Result<(), TransportError> {
        Self::copy(recursive, PathBuf::from(remote), local.to_path_buf()).await
    }
}
