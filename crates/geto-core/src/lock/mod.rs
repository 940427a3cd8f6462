//! Remote runner lock.
//!
//! The lock is the existence of a single directory on the host. Taking it relies on `mkdir` being atomic on the target filesystem; nothing is held in memory.
//!
//! Acquisition failures surface to the caller. Release failures are only logged and reported to the metrics backend: by then the caller already has a result, and a stranded lock needs manual removal either way.

use std::time::Duration;

use geto_model::Host;
use tracing::{debug, error, trace, warn};

use crate::{
    error::CoreError,
    metrics::MetricsBackend,
    transport::{Transport, TransportError, shell_quote},
};

/// Retry bounds for the lock protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPolicy {
    pub acquire_attempts: u32,
    /// Higher than `acquire_attempts`: a lock left behind blocks every later dispatch to the host.
    pub release_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            acquire_attempts: 10,
            release_attempts: 20,
            retry_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteLock {
    path: String,
    policy: LockPolicy,
}

impl RemoteLock {
    pub fn new(path: impl Into<String>, policy: LockPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn acquire_command(&self) -> String {
        format!("mkdir {}", shell_quote(&self.path))
    }

    pub fn release_command(&self) -> String {
        format!("rm -r {}", shell_quote(&self.path))
    }

    /// Creates the lock directory, retrying up to `acquire_attempts` times.
    pub async fn acquire(&self, transport: &dyn Transport, host: &Host) -> Result<(), CoreError> {
        let cmd = self.acquire_command();
        let mut last_err: Option<TransportError> = None;

        for attempt in 1..=self.policy.acquire_attempts {
            match transport.run(host, &cmd, 0).await {
                Ok(_) => {
                    debug!(target: "geto.core.lock", host = %host.name, attempt, "remote lock acquired");
                    return Ok(());
                }
                Err(e) => {
                    trace!(target: "geto.core.lock", host = %host.name, attempt, error = %e, "lock busy");
                    last_err = Some(e);
                }
            }
            if attempt < self.policy.acquire_attempts {
                self.pause().await;
            }
        }

        let source = last_err.unwrap_or_else(|| TransportError::Io("no lock attempts made".into()));
        warn!(target: "geto.core.lock", host = %host.name, error = %source, "failed to acquire remote lock");
        Err(CoreError::LockNotAcquired {
            host: host.name.clone(),
            source,
        })
    }

    /// Removes the lock directory, retrying up to `release_attempts` times.
    ///
    /// Never fails; returns whether the lock was removed.
    pub async fn release(
        &self,
        transport: &dyn Transport,
        host: &Host,
        metrics: &dyn MetricsBackend,
    ) -> bool {
        let cmd = self.release_command();
        let mut last_err: Option<TransportError> = None;

        for attempt in 1..=self.policy.release_attempts {
            match transport.run(host, &cmd, 0).await {
                Ok(_) => {
                    debug!(target: "geto.core.lock", host = %host.name, attempt, "remote lock removed");
                    return true;
                }
                Err(e) => last_err = Some(e),
            }
            if attempt < self.policy.release_attempts {
                self.pause().await;
            }
        }

        error!(
            target: "geto.core.lock",
            host = %host.name,
            lock = %self.path,
            error = ?last_err.map(|e| e.to_string()),
            "failed to remove remote lock; it must be removed by hand"
        );
        metrics.lock_stranded(&host.name);
        false
    }

    async fn pause(&self) {
        if !self.policy.retry_delay.is_zero() {
            tokio::time::sleep(self.policy.retry_delay).await;
        }
    }
}
