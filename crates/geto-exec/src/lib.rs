//! Process-backed [`geto_core::Transport`] implementations.

mod error;
pub use error::{ExecError, ExecResult};

pub mod util;

#[cfg(feature = "ssh")]
pub mod ssh;
#[cfg(feature = "ssh")]
pub use ssh::SshTransport;

#[cfg(feature = "local")]
pub mod local;
#[cfg(feature = "local")]
pub use local::LocalTransport;

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    #[cfg(feature = "local")]
    pub use crate::LocalTransport;
    #[cfg(feature = "ssh")]
    pub use crate::SshTransport;
}
