use std::{io, process::Stdio, time::Duration};

use geto_core::CommandOutput;
use geto_model::TimeoutSecs;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
};
use tracing::{debug, trace};

use crate::error::{ExecError, ExecResult};

/// How long a child gets to exit after SIGTERM before it is killed.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// Runs `cmd` to completion and captures its output.
///
/// `timeout_secs == 0` waits forever. On expiry the child is stopped with [`kill_graceful`].
pub async fn run_captured(mut cmd: Command, timeout_secs: TimeoutSecs) -> ExecResult<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| ExecError::Spawn(e.to_string()))?;
    trace!(target: "geto.exec.proc", pid = ?child.id(), "spawned");

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut out = Vec::new();
    let mut err = Vec::new();

    let collect = async {
        let (status, _, _) = tokio::try_join!(
            child.wait(),
            drain(stdout_pipe.as_mut(), &mut out),
            drain(stderr_pipe.as_mut(), &mut err),
        )?;
        Ok::<_, io::Error>(status)
    };

    let status = if timeout_secs > 0 {
        let waited = tokio::time::timeout(Duration::from_secs(timeout_secs.into()), collect).await;
        match waited {
            Ok(status) => status?,
            Err(_) => {
                debug!(target: "geto.exec.proc", timeout_secs, "timeout expired; stopping child");
                kill_graceful(&mut child).await;
                return Err(ExecError::Timeout { secs: timeout_secs });
            }
        }
    } else {
        collect.await?
    };

    let output = CommandOutput::new(
        String::from_utf8_lossy(&out),
        String::from_utf8_lossy(&err),
    );
    if status.success() {
        return Ok(output);
    }
    match status.code() {
        Some(code) => Err(ExecError::NonZeroExit { code, output }),
        None => Err(ExecError::KilledBySignal { output }),
    }
}

async fn drain<R>(pipe: Option<&mut R>, buf: &mut Vec<u8>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    if let Some(pipe) = pipe {
        pipe.read_to_end(buf).await?;
    }
    Ok(())
}

/// SIGTERM, a short grace period, then SIGKILL.
#[cfg(unix)]
pub async fn kill_graceful(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: kill(2) on the pid of a child we still own; no memory is touched.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
pub async fn kill_graceful(child: &mut Child) {
    let _ = child.kill().await;
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_both_streams() {
        let out = run_captured(sh("echo out; echo err >&2"), 0).await.unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_partial_output() {
        let err = run_captured(sh("echo half; exit 3"), 0).await.unwrap_err();
        match err {
            ExecError::NonZeroExit { code, output } => {
                assert_eq!(code, 3);
                assert_eq!(output.stdout, "half\n");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_stops_the_child() {
        let started = Instant::now();
        let err = run_captured(sh("sleep 30"), 1).await.unwrap_err();

        assert!(matches!(err, ExecError::Timeout { secs: 1 }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = run_captured(Command::new("/no/such/program"), 0).await.unwrap_err();
        assert!(matches!(err, ExecError::Spawn(_)));
    }
}
