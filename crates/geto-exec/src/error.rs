use geto_core::{CommandOutput, TransportError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("non-zero exit code: {code}")]
    NonZeroExit { code: i32, output: CommandOutput },
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("killed by signal")]
    KilledBySignal { output: CommandOutput },
    #[error("timed out after {secs}s")]
    Timeout { secs: u32 },
    #[error("copy failed: {0}")]
    Copy(String),
    #[error("io error: {0}")]
    Io(String),
}

pub type ExecResult<T> = Result<T, ExecError>;

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<ExecError> for TransportError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::NonZeroExit { code, output } => TransportError::NonZeroExit { code, output },
            ExecError::Spawn(msg) => TransportError::Spawn(msg),
            ExecError::KilledBySignal { output } => TransportError::KilledBySignal { output },
            ExecError::Timeout { secs } => TransportError::Timeout { secs },
            ExecError::Copy(msg) => TransportError::Copy(msg),
            ExecError::Io(msg) => TransportError::Io(msg),
        }
    }
}
