use std::path::Path;

use async_trait::async_trait;
use geto_model::{Host, TimeoutSecs};
use thiserror::Error;

pub mod memory;

/// Captured output of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("non-zero exit code: {code}")]
    NonZeroExit { code: i32, output: CommandOutput },
    #[error("killed by signal")]
    KilledBySignal { output: CommandOutput },
    #[error("timed out after {secs}s")]
    Timeout { secs: TimeoutSecs },
    #[error("copy failed: {0}")]
    Copy(String),
}

impl TransportError {
    /// Output captured before the failure, if the command got far enough to produce any.
    pub fn output(&self) -> Option<&CommandOutput> {
        match self {
            TransportError::NonZeroExit { output, .. } | TransportError::KilledBySignal { output } => {
                Some(output)
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

/// Capability for talking to worker hosts.
///
/// The engine depends on these four operations only.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Returns an error if the host can't be communicated with.
    async fn test_connection(&self, host: &Host) -> Result<(), TransportError>;

    /// Runs `command` on `host`.
    ///
    /// `timeout_secs == 0` means no timeout. Succeeds only if the command ran, its streams were read completely and it exited with status zero.
    async fn run(
        &self,
        host: &Host,
        command: &str,
        timeout_secs: TimeoutSecs,
    ) -> Result<CommandOutput, TransportError>;

    /// Copies the local `local` into `remote` on `host`, recursively if asked.
    async fn copy_to(
        &self,
        host: &Host,
        recursive: bool,
        local: &Path,
        remote: &str,
    ) -> Result<(), TransportError>;

    /// Copies `remote` on `host` to the local `local`, recursively if asked.
    async fn copy_from(
        &self,
        host: &Host,
        recursive: bool,
        remote: &str,
        local: &Path,
    ) -> Result<(), TransportError>;
}

/// Joins a relative component onto a POSIX remote path.
pub fn remote_join(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        format!("/{rel}")
    } else {
        format!("{base}/{rel}")
    }
}

/// Quotes `s` for a POSIX shell. Strings made only of safe characters pass through unchanged.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@%+=,".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_join_handles_trailing_slash() {
        assert_eq!(remote_join("/tmp/work/", "abc"), "/tmp/work/abc");
        assert_eq!(remote_join("/tmp/work", "abc"), "/tmp/work/abc");
        assert_eq!(remote_join("/", "abc"), "/abc");
    }

    #[test]
    fn shell_quote_leaves_plain_paths() {
        assert_eq!(shell_quote("/tmp/geto/lock"), "/tmp/geto/lock");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("^/bin/bash x"), "'^/bin/bash x'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn output_is_exposed_for_exit_failures() {
        let err = TransportError::NonZeroExit {
            code: 1,
            output: CommandOutput::new("", "boom"),
        };
        assert_eq!(err.output().map(|o| o.stderr.as_str()), Some("boom"));
        assert!(TransportError::Timeout { secs: 3 }.output().is_none());
    }
}
