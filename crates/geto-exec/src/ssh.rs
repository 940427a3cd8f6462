//! OpenSSH transport.
//!
//! Shells out to the `ssh` and `scp` binaries. Key-authenticated hosts run in batch mode so a missing key fails fast instead of prompting.
//! Hosts with a password are driven through `sshpass -e`; the password travels in the child's environment, never on its command line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use geto_core::{CommandOutput, DispatchConfig, Transport, TransportError};
use geto_model::{Host, TimeoutSecs};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::util::run_captured;

const SSH: &str = "ssh";
const SCP: &str = "scp";
const SSHPASS: &str = "sshpass";
const SSHPASS_ENV: &str = "SSHPASS";

const DEFAULT_CONNECT_TIMEOUT_SECS: u32 = 10;

#[derive(Debug, Clone)]
pub struct SshTransport {
    private_key: Option<PathBuf>,
    connect_timeout_secs: u32,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self {
            private_key: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl SshTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the private key named in `config`, if any.
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            private_key: config.private_key_path.clone(),
            ..Self::default()
        }
    }

    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    pub fn with_connect_timeout(mut self, secs: u32) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Options shared by `ssh` and `scp`. `port_flag` is `-p` for ssh and `-P` for scp.
    fn common_args(&self, host: &Host, port_flag: &str) -> Vec<String> {
        let mut args = Vec::new();
        if host.password.is_none() {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }
        args.extend([
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            port_flag.to_string(),
            host.port.to_string(),
        ]);
        if let (None, Some(key)) = (&host.password, &self.private_key) {
            args.extend(["-i".to_string(), key.display().to_string()]);
        }
        args
    }

    pub fn ssh_args(&self, host: &Host, command: &str) -> Vec<String> {
        let mut args = self.common_args(host, "-p");
        args.push(host.destination());
        args.push(command.to_string());
        args
    }

    pub fn scp_args(&self, host: &Host, recursive: bool, from: String, to: String) -> Vec<String> {
        let mut args = self.common_args(host, "-P");
        if recursive {
            args.push("-r".to_string());
        }
        args.push(from);
        args.push(to);
        args
    }

    fn command(&self, host: &Host, program: &str, args: Vec<String>) -> Command {
        let mut cmd = match &host.password {
            Some(password) => {
                let mut cmd = Command::new(SSHPASS);
                cmd.arg("-e").arg(program).env(SSHPASS_ENV, password);
                cmd
            }
            None => Command::new(program),
        };
        cmd.args(args);
        cmd
    }

    fn remote_spec(host: &Host, path: &str) -> String {
        format!("{}:{}", host.destination(), path)
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn name(&self) -> &'static str {
        "ssh"
    }

    async fn test_connection(&self, host: &Host) -> Result<(), TransportError> {
        let cmd = self.command(host, SSH, self.ssh_args(host, "true"));
        match run_captured(cmd, self.connect_timeout_secs.saturating_mul(2)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let e = TransportError::from(e);
                let detail = e
                    .output()
                    .map(|o| o.stderr.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| e.to_string());
                Err(TransportError::Connection(format!("{}: {detail}", host.destination())))
            }
        }
    }

    #[instrument(level = "trace", skip(self, host), fields(host = %host.name))]
    async fn run(
        &self,
        host: &Host,
        command: &str,
        timeout_secs: TimeoutSecs,
    ) -> Result<CommandOutput, TransportError> {
        debug!(target: "geto.exec.ssh", host = %host.name, port = host.port, command, "ssh");
        let cmd = self.command(host, SSH, self.ssh_args(host, command));
        Ok(run_captured(cmd, timeout_secs).await?)
    }

    async fn copy_to(
        &self,
        host: &Host,
        recursive: bool,
        local: &Path,
        remote: &str,
    ) -> Result<(), TransportError> {
        debug!(target: "geto.exec.ssh", host = %host.name, local = %local.display(), remote, recursive, "scp to host");
        let args = self.scp_args(
            host,
            recursive,
            local.display().to_string(),
            Self::remote_spec(host, remote),
        );
        run_captured(self.command(host, SCP, args), 0)
            .await
            .map(|_| ())
            .map_err(copy_error)
    }

    async fn copy_from(
        &self,
        host: &Host,
        recursive: bool,
        remote: &str,
        local: &Path,
    ) -> Result<(), TransportError> {
        debug!(target: "geto.exec.ssh", host = %host.name, remote, local = %local.display(), recursive, "scp from host");
        let args = self.scp_args(
            host,
            recursive,
            Self::remote_spec(host, remote),
            local.display().to_string(),
        );
        run_captured(self.command(host, SCP, args), 0)
            .await
            .map(|_| ())
            .map_err(copy_error)
    }
}

/// scp failures keep scp's own message, which names the offending path.
fn copy_error(e: crate::ExecError) -> TransportError {
    let e = TransportError::from(e);
    match e.output() {
        Some(out) if !out.stderr.trim().is_empty() => TransportError::Copy(out.stderr.trim().to_string()),
        _ => e,
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    fn key_host() -> Host {
        Host::new("alpha", "10.0.0.1", "geto").with_port(2222)
    }

    fn password_host() -> Host {
        Host::new("beta", "10.0.0.2", "geto").with_password("hunter2")
    }

    #[test]
    fn key_host_runs_in_batch_mode_with_key() {
        let t = SshTransport::new().with_private_key("/keys/id_ed25519");
        assert_eq!(
            t.ssh_args(&key_host(), "mkdir /tmp/lock"),
            [
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "-p",
                "2222",
                "-i",
                "/keys/id_ed25519",
                "geto@10.0.0.1",
                "mkdir /tmp/lock",
            ]
        );
    }

    #[test]
    fn password_host_skips_batch_mode_and_key() {
        let t = SshTransport::new().with_private_key("/keys/id_ed25519");
        let args = t.ssh_args(&password_host(), "true");
        assert!(!args.iter().any(|a| a == "BatchMode=yes" || a == "-i"));
        assert!(!args.iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn password_travels_in_environment() {
        let t = SshTransport::new();
        let host = password_host();
        let cmd = t.command(&host, SSH, t.ssh_args(&host, "true"));
        let std = cmd.as_std();

        assert_eq!(std.get_program(), OsStr::new("sshpass"));
        let args: Vec<&OsStr> = std.get_args().collect();
        assert_eq!(&args[..2], [OsStr::new("-e"), OsStr::new("ssh")]);
        assert!(
            std.get_envs()
                .any(|(k, v)| k == SSHPASS_ENV && v == Some(OsStr::new("hunter2")))
        );
    }

    #[test]
    fn scp_uses_upper_case_port_flag_and_recursion() {
        let t = SshTransport::new().with_connect_timeout(3);
        let host = key_host();
        let args = t.scp_args(
            &host,
            true,
            "/local/task".into(),
            SshTransport::remote_spec(&host, "/work"),
        );
        assert_eq!(
            args,
            [
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=3",
                "-P",
                "2222",
                "-r",
                "/local/task",
                "geto@10.0.0.1:/work",
            ]
        );
    }
}
