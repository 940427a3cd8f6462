//! Host selection.
//!
//! Least-loaded selection probes every configured host concurrently. Each probe takes the remote lock, counts running instances of the script and releases the lock again, so the counts are not taken while another dispatcher is mid-launch.
//! Nothing is reserved: the chosen host is dispatched to afterwards through the normal pipeline, which re-checks the ceiling under a fresh lock.

use std::sync::PoisonError;

use futures::future::join_all;
use geto_model::{Host, Script};
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::{
    admission,
    dispatcher::{Dispatcher, RunResult},
    error::CoreError,
    task::Task,
};

/// Where a task should run.
#[derive(Debug, Clone)]
pub enum Target {
    /// An explicit host, which need not appear in the config.
    Host(Host),
    /// A configured host, by name.
    Named(String),
    /// Uniformly random configured host.
    Random,
    /// The configured host running the fewest instances of the task's script.
    LeastLoaded,
}

impl Dispatcher {
    /// Resolves `target`, then runs the pipeline on the resolved host.
    pub async fn submit(&self, task: &Task, target: Target) -> RunResult {
        match self.resolve(task, target).await {
            Ok(host) => self.run_on_host(task, &host).await,
            Err(e) => RunResult::failed(e),
        }
    }

    pub async fn run_on_random_host(&self, task: &Task) -> RunResult {
        self.submit(task, Target::Random).await
    }

    pub async fn run_on_least_loaded_host(&self, task: &Task) -> RunResult {
        self.submit(task, Target::LeastLoaded).await
    }

    pub async fn resolve(&self, task: &Task, target: Target) -> Result<Host, CoreError> {
        match target {
            Target::Host(host) => Ok(host),
            Target::Named(name) => self
                .config
                .host(&name)
                .cloned()
                .ok_or(CoreError::UnknownHost(name)),
            Target::Random => self.random_host(),
            Target::LeastLoaded => self.least_loaded_host(task.script()).await,
        }
    }

    pub fn random_host(&self) -> Result<Host, CoreError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let host = self
            .config
            .hosts
            .choose(&mut *rng)
            .cloned()
            .ok_or(CoreError::NoHosts)?;
        debug!(target: "geto.core.select", host = %host.name, "picked random host");
        Ok(host)
    }

    /// Host with the lowest running count of `script`; ties go to the host listed first.
    ///
    /// Every probe finishes (and releases its lock) before any result is looked at. The first failed probe, in config order, aborts the selection.
    pub async fn least_loaded_host(&self, script: &Script) -> Result<Host, CoreError> {
        let hosts = &self.config.hosts;
        let counts = join_all(hosts.iter().map(|h| self.probe(h, script.name()))).await;

        let mut best: Option<(&Host, u32)> = None;
        for (host, count) in hosts.iter().zip(counts) {
            let count = count.map_err(|source| CoreError::Selection {
                host: host.name.clone(),
                source: Box::new(source),
            })?;
            if best.is_none_or(|(_, n)| count < n) {
                best = Some((host, count));
            }
        }

        let (host, running) = best.ok_or(CoreError::NoHosts)?;
        info!(target: "geto.core.select", host = %host.name, running, script = script.name(), "picked least loaded host");
        Ok(host.clone())
    }

    async fn probe(&self, host: &Host, script_name: &str) -> Result<u32, CoreError> {
        let transport = self.transport.as_ref();
        self.lock.acquire(transport, host).await?;

        let count =
            admission::count_running(transport, host, &self.config.remote_work_path, script_name)
                .await;
        self.lock
            .release(transport, host, self.metrics.as_ref())
            .await;

        debug!(target: "geto.core.select", host = %host.name, count = ?count.as_ref().ok(), "host probed");
        count
    }
}
