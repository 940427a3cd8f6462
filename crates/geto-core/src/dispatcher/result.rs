use geto_model::RunReport;

use crate::{error::CoreError, transport::CommandOutput};

/// Outcome of one dispatch attempt: captured output plus the error, if any.
///
/// On failure `stdout`/`stderr` hold whatever the failing remote command printed before it failed.
#[derive(Debug)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub error: Option<CoreError>,
}

impl RunResult {
    pub fn ok(output: CommandOutput) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            error: None,
        }
    }

    pub fn failed(error: CoreError) -> Self {
        let output = error.output().cloned().unwrap_or_default();
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<CommandOutput, CoreError> {
        match self.error {
            None => Ok(CommandOutput::new(self.stdout, self.stderr)),
            Some(e) => Err(e),
        }
    }
}

impl From<RunResult> for RunReport {
    fn from(r: RunResult) -> Self {
        RunReport {
            stdout: r.stdout,
            stderr: r.stderr,
            error: r.error.map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[test]
    fn failed_carries_partial_output() {
        let err = CoreError::Remote(TransportError::NonZeroExit {
            code: 2,
            output: CommandOutput::new("half", "oops"),
        });
        let result = RunResult::failed(err);
        assert_eq!(result.stdout, "half");
        assert_eq!(result.stderr, "oops");
        assert!(!result.is_ok());

        let report = RunReport::from(result);
        assert_eq!(report.error.as_deref(), Some("remote execution failed: non-zero exit code: 2"));
    }

    #[test]
    fn failed_without_output_is_empty() {
        let result = RunResult::failed(CoreError::NoHosts);
        assert!(result.stdout.is_empty() && result.stderr.is_empty());
        assert!(matches!(result.into_result(), Err(CoreError::NoHosts)));
    }
}
