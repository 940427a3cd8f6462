//! Deterministic in-memory [`Transport`] for tests.
//!
//! Each host gets a simulated directory namespace. `mkdir`, `mkdir -p` and `rm -r` act on it with the same success/failure semantics as a POSIX shell, so the lock protocol behaves as it would remotely.
//! Copied script files are remembered, and running one applies its `mkdir`/`rm -r` lines; that is how a shipped wrapper releases the lock.
//! Everything else succeeds with a fixed output. All calls are recorded.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use geto_model::{Host, TimeoutSecs};

use super::{CommandOutput, Transport, TransportError, remote_join};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub host: String,
    pub command: String,
    pub timeout_secs: TimeoutSecs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    To,
    From,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCopy {
    pub host: String,
    pub direction: CopyDirection,
    pub recursive: bool,
    pub local: PathBuf,
    pub remote: String,
}

struct Failure {
    host: Option<String>,
    prefix: String,
    error: TransportError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    dirs: HashMap<String, BTreeSet<String>>,
    files: HashMap<String, HashMap<String, Vec<u8>>>,
    running: HashMap<String, Result<CommandOutput, TransportError>>,
    failures: Vec<Failure>,
    unreachable: HashSet<String>,
    script_output: CommandOutput,
    commands: Vec<RecordedCommand>,
    copies: Vec<RecordedCopy>,
}

pub struct MemoryTransport {
    state: Mutex<State>,
}

impl MemoryTransport {
    /// Script executions print `test` on stdout unless told otherwise.
    pub fn new() -> Self {
        let state = State {
            script_output: CommandOutput::new("test", ""),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_script_output(self, output: CommandOutput) -> Self {
        self.state().script_output = output;
        self
    }

    /// Number of running instances `pgrep` reports on `host`.
    pub fn set_running(&self, host: &str, count: u32) {
        self.set_running_output(host, count.to_string());
    }

    /// Raw `pgrep` stdout on `host`, newline-terminated like the real thing.
    pub fn set_running_output(&self, host: &str, raw: impl Into<String>) {
        let stdout = format!("{}\n", raw.into());
        self.set_running_stdio(host, stdout, "");
    }

    /// Exact stdout and stderr of a successful `pgrep` on `host`.
    pub fn set_running_stdio(&self, host: &str, stdout: impl Into<String>, stderr: impl Into<String>) {
        self.state()
            .running
            .insert(host.to_string(), Ok(CommandOutput::new(stdout, stderr)));
    }

    /// `pgrep` on `host` exits with `code`, printing `stderr` and nothing on stdout.
    pub fn set_pgrep_failure(&self, host: &str, code: i32, stderr: impl Into<String>) {
        let error = TransportError::NonZeroExit {
            code,
            output: CommandOutput::new("", stderr),
        };
        self.state().running.insert(host.to_string(), Err(error));
    }

    pub fn create_dir(&self, host: &str, path: &str) {
        self.state()
            .dirs
            .entry(host.to_string())
            .or_default()
            .insert(path.to_string());
    }

    pub fn dir_exists(&self, host: &str, path: &str) -> bool {
        self.state()
            .dirs
            .get(host)
            .is_some_and(|dirs| dirs.contains(path))
    }

    /// Contents of a file previously copied to `host`, lossily decoded.
    pub fn file(&self, host: &str, path: &str) -> Option<String> {
        self.file_bytes(host, path)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    pub fn file_bytes(&self, host: &str, path: &str) -> Option<Vec<u8>> {
        self.state()
            .files
            .get(host)
            .and_then(|files| files.get(path))
            .cloned()
    }

    /// Every command starting with `prefix`, on any host, fails with `error`.
    ///
    /// Copies are matched as `copy_to <local>` and `copy_from <remote>`.
    pub fn fail_on(&self, prefix: &str, error: TransportError) {
        self.push_failure(None, prefix, error, None);
    }

    pub fn fail_on_host(&self, host: &str, prefix: &str, error: TransportError) {
        self.push_failure(Some(host.to_string()), prefix, error, None);
    }

    /// Like [`MemoryTransport::fail_on`], but only for the next `times` matches.
    pub fn fail_times(&self, prefix: &str, error: TransportError, times: usize) {
        self.push_failure(None, prefix, error, Some(times));
    }

    pub fn set_unreachable(&self, host: &str) {
        self.state().unreachable.insert(host.to_string());
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state().commands.clone()
    }

    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.state()
            .commands
            .iter()
            .filter(|c| c.host == host)
            .map(|c| c.command.clone())
            .collect()
    }

    pub fn copies(&self) -> Vec<RecordedCopy> {
        self.state().copies.clone()
    }

    fn push_failure(
        &self,
        host: Option<String>,
        prefix: &str,
        error: TransportError,
        remaining: Option<usize>,
    ) {
        self.state().failures.push(Failure {
            host,
            prefix: prefix.to_string(),
            error,
            remaining,
        });
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn check(&mut self, host: &str, op: &str) -> Result<(), TransportError> {
        if self.unreachable.contains(host) {
            return Err(TransportError::Connection(format!("{host} is unreachable")));
        }
        let hit = self.failures.iter_mut().find(|f| {
            f.host.as_deref().is_none_or(|h| h == host)
                && op.starts_with(&f.prefix)
                && f.remaining != Some(0)
        });
        match hit {
            Some(failure) => {
                if let Some(n) = failure.remaining.as_mut() {
                    *n -= 1;
                }
                Err(failure.error.clone())
            }
            None => Ok(()),
        }
    }

    fn execute(&mut self, host: &str, command: &str) -> Result<CommandOutput, TransportError> {
        let words: Vec<&str> = command.split_whitespace().collect();
        if let Some(result) = self.builtin(host, &words) {
            return result;
        }

        if let [path] = words.as_slice() {
            let script = self
                .files
                .get(host)
                .and_then(|f| f.get(*path))
                .map(|b| String::from_utf8_lossy(b).into_owned());
            if let Some(body) = script {
                for line in body.lines() {
                    let words: Vec<&str> = line.split_whitespace().collect();
                    let _ = self.builtin(host, &words);
                }
            }
        }
        Ok(self.script_output.clone())
    }

    fn builtin(
        &mut self,
        host: &str,
        words: &[&str],
    ) -> Option<Result<CommandOutput, TransportError>> {
        let dirs = self.dirs.entry(host.to_string()).or_default();
        let result = match words {
            ["mkdir", "-p", path] => {
                dirs.insert(unquote(path));
                Ok(CommandOutput::default())
            }
            ["mkdir", path] => {
                let path = unquote(path);
                if dirs.insert(path.clone()) {
                    Ok(CommandOutput::default())
                } else {
                    Err(exit_failure(format!(
                        "mkdir: cannot create directory '{path}': File exists"
                    )))
                }
            }
            ["rm", "-r", path] => {
                let path = unquote(path);
                if dirs.remove(&path) {
                    let nested = format!("{path}/");
                    dirs.retain(|d| !d.starts_with(&nested));
                    Ok(CommandOutput::default())
                } else {
                    Err(exit_failure(format!(
                        "rm: cannot remove '{path}': No such file or directory"
                    )))
                }
            }
            ["pgrep", ..] => self
                .running
                .get(host)
                .cloned()
                .unwrap_or_else(|| Ok(CommandOutput::new("0\n", ""))),
            _ => return None,
        };
        Some(result)
    }

    fn store_tree(&mut self, host: &str, local: &Path, remote: &str) -> std::io::Result<()> {
        if local.is_dir() {
            self.dirs
                .entry(host.to_string())
                .or_default()
                .insert(remote.to_string());
            for entry in fs::read_dir(local)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                self.store_tree(host, &entry.path(), &remote_join(remote, &name))?;
            }
        } else {
            let body = fs::read(local)?;
            self.files
                .entry(host.to_string())
                .or_default()
                .insert(remote.to_string(), body);
        }
        Ok(())
    }
}

fn unquote(word: &str) -> String {
    word.trim_matches('\'').to_string()
}

fn exit_failure(stderr: String) -> TransportError {
    TransportError::NonZeroExit {
        code: 1,
        output: CommandOutput::new("", stderr),
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn test_connection(&self, host: &Host) -> Result<(), TransportError> {
        self.state().check(&host.name, "true")
    }

    async fn run(
        &self,
        host: &Host,
        command: &str,
        timeout_secs: TimeoutSecs,
    ) -> Result<CommandOutput, TransportError> {
        let mut st = self.state();
        st.commands.push(RecordedCommand {
            host: host.name.clone(),
            command: command.to_string(),
            timeout_secs,
        });
        st.check(&host.name, command)?;
        st.execute(&host.name, command)
    }

    async fn copy_to(
        &self,
        host: &Host,
        recursive: bool,
        local: &Path,
        remote: &str,
    ) -> Result<(), TransportError> {
        let mut st = self.state();
        st.copies.push(RecordedCopy {
            host: host.name.clone(),
            direction: CopyDirection::To,
            recursive,
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        st.check(&host.name, &format!("copy_to {}", local.display()))?;

        if local.is_dir() && !recursive {
            return Err(TransportError::Copy(format!(
                "{} is a directory (not copied)",
                local.display()
            )));
        }
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransportError::Copy(format!("{} has no file name", local.display())))?;
        st.store_tree(&host.name, local, &remote_join(remote, &name))
            .map_err(|e| TransportError::Copy(e.to_string()))
    }

    async fn copy_from(
        &self,
        host: &Host,
        recursive: bool,
        remote: &str,
        local: &Path,
    ) -> Result<(), TransportError> {
        let mut st = self.state();
        st.copies.push(RecordedCopy {
            host: host.name.clone(),
            direction: CopyDirection::From,
            recursive,
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        st.check(&host.name, &format!("copy_from {remote}"))
    }
}
