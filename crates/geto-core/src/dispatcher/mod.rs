//! Execution pipeline.
//!
//! One dispatch to one host goes through these steps, in order:
//!
//! 1. package the task into a local directory;
//! 2. take the remote lock (failure ends the dispatch; the lock was never ours);
//! 3. check the script's concurrency ceiling;
//! 4. `mkdir -p` the remote work directory;
//! 5. copy the task directory to the host;
//! 6. package a wrapper task that launches the script and removes the lock;
//! 7. copy the wrapper directory to the host;
//! 8. run the wrapper.
//!
//! A failure in steps 3 to 7 releases the lock before returning. After step 8 the lock belongs to the wrapper, so a failed launch leaves it in place.

mod result;

pub use result::RunResult;

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use geto_model::Host;
use rand::{SeedableRng, rngs::StdRng};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::{
    admission,
    config::DispatchConfig,
    error::CoreError,
    lock::RemoteLock,
    metrics::{self, DispatchOutcome, MetricsBackend},
    select::Target,
    task::Task,
    transport::{Transport, shell_quote},
    wrapper::wrapper_script,
};

/// Dispatches tasks to the hosts of one [`DispatchConfig`].
///
/// Holds no per-host state: every coordination decision is made on the host itself through the remote lock, so any number of dispatchers (in one process or many) may target the same hosts.
pub struct Dispatcher {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: Arc<DispatchConfig>,
    pub(crate) lock: RemoteLock,
    pub(crate) metrics: Arc<dyn MetricsBackend>,
    pub(crate) rng: Mutex<StdRng>,
}

impl Dispatcher {
    /// Validates `config` and builds a dispatcher with no-op metrics and an entropy-seeded host picker.
    pub fn new(
        config: impl Into<Arc<DispatchConfig>>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CoreError> {
        let config = config.into();
        config.validate()?;

        info!(
            target: "geto.core.dispatch",
            transport = transport.name(),
            hosts = config.hosts.len(),
            lock = %config.remote_lock_path,
            "dispatcher ready"
        );
        Ok(Self {
            lock: RemoteLock::new(config.remote_lock_path.clone(), config.lock.clone()),
            transport,
            config,
            metrics: metrics::noop(),
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsBackend>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces the random source used by [`Target::Random`].
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Runs the dispatch on a spawned tokio task.
    pub fn spawn(self: &Arc<Self>, task: Task, target: Target) -> JoinHandle<RunResult> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.submit(&task, target).await })
    }

    /// Runs the full pipeline for `task` on `host`.
    ///
    /// Never panics and never returns early without a result: every failure is reported in [`RunResult::error`].
    #[instrument(level = "debug", skip_all, fields(task = %task.id(), host = %host.name))]
    pub async fn run_on_host(&self, task: &Task, host: &Host) -> RunResult {
        info!(
            target: "geto.core.dispatch",
            task = %task.id(),
            script = task.script().name(),
            host = %host.name,
            addr = %host.addr,
            "dispatching task"
        );

        let result = self.pipeline(task, host).await;
        let outcome = match &result.error {
            None => DispatchOutcome::Launched,
            Some(CoreError::CeilingReached { .. }) => DispatchOutcome::Rejected,
            Some(_) => DispatchOutcome::Failed,
        };
        self.metrics.dispatch_finished(&host.name, outcome);

        match &result.error {
            None => info!(target: "geto.core.dispatch", task = %task.id(), host = %host.name, "task launched"),
            Some(e @ CoreError::CeilingReached { .. }) => {
                info!(target: "geto.core.dispatch", task = %task.id(), host = %host.name, reason = %e, "task rejected")
            }
            Some(e) => warn!(target: "geto.core.dispatch", task = %task.id(), host = %host.name, error = %e, "dispatch failed"),
        }
        result
    }

    async fn pipeline(&self, task: &Task, host: &Host) -> RunResult {
        let transport = self.transport.as_ref();

        let task_dir = match self.package(task).await {
            Ok(dir) => dir,
            Err(e) => return RunResult::failed(e),
        };

        if let Err(e) = self.lock.acquire(transport, host).await {
            self.metrics.lock_acquire_failed(&host.name);
            return RunResult::failed(e);
        }

        let wrapper = match self.ship(task, host, &task_dir).await {
            Ok(wrapper) => wrapper,
            Err(e) => {
                self.lock
                    .release(transport, host, self.metrics.as_ref())
                    .await;
                return RunResult::failed(e);
            }
        };

        let launch = shell_quote(&wrapper.remote_script_path(&self.config.remote_work_path));
        match transport.run(host, &launch, task.timeout_secs()).await {
            Ok(output) => RunResult::ok(output),
            Err(e) => {
                warn!(
                    target: "geto.core.dispatch",
                    host = %host.name,
                    lock = %self.lock.path(),
                    error = %e,
                    "wrapper did not complete; remote lock may be stranded"
                );
                RunResult::failed(CoreError::Remote(e))
            }
        }
    }

    /// Steps run while the lock is held. Any error here means the caller must release it.
    async fn ship(&self, task: &Task, host: &Host, task_dir: &Path) -> Result<Task, CoreError> {
        let cfg = self.config.as_ref();
        let transport = self.transport.as_ref();

        match admission::check(transport, host, &cfg.remote_work_path, task.script()).await {
            Ok(Some(running)) => {
                debug!(target: "geto.core.dispatch", host = %host.name, running, "below concurrency ceiling")
            }
            Ok(None) => {}
            Err(e) => {
                if matches!(e, CoreError::CeilingReached { .. }) {
                    self.metrics
                        .admission_rejected(&host.name, task.script().name());
                }
                return Err(e);
            }
        }

        let mkdir = format!("mkdir -p {}", shell_quote(&cfg.remote_work_path));
        transport
            .run(host, &mkdir, 0)
            .await
            .map_err(|source| CoreError::RemoteWorkDir {
                path: cfg.remote_work_path.clone(),
                source,
            })?;

        self.copy_dir(host, task_dir).await?;

        let wrapper = Task::new(
            Vec::new(),
            wrapper_script(task, &cfg.remote_work_path, &cfg.remote_lock_path),
            0,
        )?;
        let wrapper_dir = self.package(&wrapper).await?;
        debug!(target: "geto.core.dispatch", task = %task.id(), wrapper = %wrapper.id(), "wrapper packaged");

        self.copy_dir(host, &wrapper_dir).await?;
        Ok(wrapper)
    }

    async fn copy_dir(&self, host: &Host, local: &Path) -> Result<(), CoreError> {
        let remote = &self.config.remote_work_path;
        self.transport
            .copy_to(host, true, local, remote)
            .await
            .map_err(|source| CoreError::CopyTo {
                host: host.name.clone(),
                local: local.display().to_string(),
                remote: remote.clone(),
                source,
            })
    }

    /// Packaging touches the local filesystem, so it runs on the blocking pool.
    async fn package(&self, task: &Task) -> Result<PathBuf, CoreError> {
        let task = task.clone();
        let local = self.config.local_work_path.clone();
        tokio::task::spawn_blocking(move || task.create_dir(&local))
            .await
            .map_err(|e| CoreError::Join(e.to_string()))?
    }
}
