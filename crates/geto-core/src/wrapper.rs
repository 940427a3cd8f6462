//! Wrapper script synthesis.
//!
//! The wrapper is what actually gets executed on the host. It starts the task's script in the background under `timeout`, sends its output to files in the task's remote directory, then removes the remote lock and exits.

use geto_model::{MaxConcurrent, Script, TimeoutSecs};

use crate::{
    task::Task,
    transport::{remote_join, shell_quote},
};

pub const WRAPPER_SCRIPT_NAME: &str = "wrapper";

/// `timeout` duration used for tasks without a timeout, so the launch line keeps one shape.
pub const UNBOUNDED_TIMEOUT: &str = "3650d";

/// Grace period between `timeout`'s TERM and KILL.
pub const KILL_AFTER_SECS: u32 = 10;

pub const STDOUT_FILE: &str = "stdout";
pub const STDERR_FILE: &str = "stderr";

/// Argument passed to `timeout` for a task timeout.
pub fn timeout_arg(timeout_secs: TimeoutSecs) -> String {
    if timeout_secs > 0 {
        format!("{timeout_secs}s")
    } else {
        UNBOUNDED_TIMEOUT.to_string()
    }
}

/// Builds the wrapper script for `inner`. `inner` is left untouched.
pub fn wrapper_script(inner: &Task, remote_work_path: &str, remote_lock_path: &str) -> Script {
    let inner_dir = inner.remote_dir(remote_work_path);
    let stdout_path = remote_join(&inner_dir, STDOUT_FILE);
    let stderr_path = remote_join(&inner_dir, STDERR_FILE);

    let launch = format!(
        "timeout --kill-after={KILL_AFTER_SECS} {} {} 1>{} 2>{} &",
        timeout_arg(inner.timeout_secs()),
        shell_quote(&inner.remote_script_path(remote_work_path)),
        shell_quote(&stdout_path),
        shell_quote(&stderr_path),
    );
    let unlock = format!("rm -r {}", shell_quote(remote_lock_path));

    Script::with_commands(
        WRAPPER_SCRIPT_NAME,
        ["#!/bin/bash".to_string(), launch, unlock],
        MaxConcurrent::Unlimited,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner(timeout: TimeoutSecs) -> Task {
        let script = Script::with_commands("echo", ["#!/bin/bash", "echo hello"], MaxConcurrent::Limit(2));
        Task::new(vec![], script, timeout).unwrap()
    }

    #[test]
    fn timeout_arg_uses_unbounded_constant_for_zero() {
        assert_eq!(timeout_arg(0), "3650d");
        assert_eq!(timeout_arg(30), "30s");
    }

    #[test]
    fn wrapper_backgrounds_inner_and_releases_lock_last() {
        let task = inner(30);
        let id = task.id().to_string();
        let wrapper = wrapper_script(&task, "/work", "/tmp/geto/lock");

        assert_eq!(wrapper.name(), WRAPPER_SCRIPT_NAME);
        assert!(wrapper.max_concurrent().is_unlimited());
        assert_eq!(
            wrapper.commands(),
            [
                "#!/bin/bash".to_string(),
                format!(
                    "timeout --kill-after=10 30s /work/{id}/{id}_echo 1>/work/{id}/stdout 2>/work/{id}/stderr &"
                ),
                "rm -r /tmp/geto/lock".to_string(),
            ]
        );
    }

    #[test]
    fn wrapper_without_timeout_keeps_time_bound() {
        let task = inner(0);
        let wrapper = wrapper_script(&task, "/work", "/lock");
        assert!(wrapper.commands()[1].starts_with("timeout --kill-after=10 3650d "));
    }

    #[test]
    fn inner_script_is_not_modified() {
        let task = inner(5);
        let before = task.script().clone();
        let _ = wrapper_script(&task, "/work", "/lock");
        assert_eq!(task.script(), &before);
    }
}
