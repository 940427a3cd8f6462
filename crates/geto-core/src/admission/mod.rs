//! Per-host concurrency ceiling.
//!
//! Running instances are counted with `pgrep -f` against the command line a launched script has on the host: `/bin/bash <remote_work>/<id>/<id>_<name>`.
//! The pattern is anchored at `^/bin/bash` so the `timeout` process that started the script does not match as well.

use geto_model::{Host, MaxConcurrent, Script};
use tracing::debug;

use crate::{
    error::CoreError,
    transport::{Transport, shell_quote},
};

/// Process pattern for running instances of `script_name` under `remote_work_path`.
///
/// Both parts are matched literally; `pgrep` reads the pattern as an extended regex.
pub fn running_pattern(remote_work_path: &str, script_name: &str) -> String {
    format!(
        "^/bin/bash {}/.*_{}$",
        escape_ere(remote_work_path.trim_end_matches('/')),
        escape_ere(script_name)
    )
}

/// Backslash-escapes POSIX extended regex metacharacters.
pub fn escape_ere(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '\\' | '.' | '[' | ']' | '(' | ')' | '{' | '}' | '*' | '+' | '?' | '|' | '^' | '$'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `pgrep -c` prints `0` and exits 1 when nothing matches. Only that exit status is let through; a bad pattern (2) or a missing `pgrep` (127) still fails the command.
pub fn count_command(remote_work_path: &str, script_name: &str) -> String {
    format!(
        "pgrep -c -f {} || [ $? -eq 1 ]",
        shell_quote(&running_pattern(remote_work_path, script_name))
    )
}

/// Parses `pgrep -c` output. Empty output is an error: `pgrep` always prints a count, so nothing on stdout means it never ran.
pub fn parse_count(stdout: &str) -> Result<u32, CoreError> {
    let trimmed = stdout.trim();
    trimmed
        .parse::<u32>()
        .map_err(|source| CoreError::RunningCountParse {
            output: trimmed.to_string(),
            source,
        })
}

/// Number of instances of `script_name` currently running on `host`.
pub async fn count_running(
    transport: &dyn Transport,
    host: &Host,
    remote_work_path: &str,
    script_name: &str,
) -> Result<u32, CoreError> {
    let out = transport
        .run(host, &count_command(remote_work_path, script_name), 0)
        .await
        .map_err(|source| CoreError::Probe {
            host: host.name.clone(),
            source,
        })?;
    let n = parse_count(&out.stdout)?;
    debug!(target: "geto.core.admission", host = %host.name, script = script_name, running = n, "counted running instances");
    Ok(n)
}

/// Rejects the script if its ceiling is already reached on `host`.
///
/// Returns the observed count, or `None` when the script has no ceiling and nothing was probed.
pub async fn check(
    transport: &dyn Transport,
    host: &Host,
    remote_work_path: &str,
    script: &Script,
) -> Result<Option<u32>, CoreError> {
    let MaxConcurrent::Limit(max) = script.max_concurrent() else {
        return Ok(None);
    };

    let running = count_running(transport, host, remote_work_path, script.name()).await?;
    if running >= max {
        return Err(CoreError::CeilingReached {
            running,
            max,
            script: script.name().to_string(),
        });
    }
    Ok(Some(running))
}
