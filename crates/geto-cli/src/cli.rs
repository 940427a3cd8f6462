use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, bail};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use geto_api::{DispatchRequest, TargetSpec};
use geto_model::{MaxConcurrent, Script};
use geto_observe::LoggerFormat;

#[derive(Debug, Parser)]
#[command(
    name = "geto",
    about = "Dispatch shell scripts to remote hosts",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// TOML config file.
    #[arg(long, short, env = "GETO_CONFIG", global = true, default_value = "geto.toml")]
    pub config: PathBuf,

    /// Log filter directives (overridden by GETO_LOG).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, default_value_t = LoggerFormat::Text)]
    pub log_format: LoggerFormat,

    /// How hosts are reached.
    #[arg(long, global = true, value_enum, default_value_t = TransportKind::Ssh)]
    pub transport: TransportKind,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// ssh/scp to each host.
    Ssh,
    /// Treat this machine as every host.
    Local,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a script on one host.
    Run(RunArgs),
    /// List configured hosts.
    Hosts {
        /// Also test connectivity to each host.
        #[arg(long)]
        check: bool,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["host", "random", "least_loaded"])
))]
pub struct RunArgs {
    /// Script file, one command per line.
    #[arg(long)]
    pub script: PathBuf,

    /// Script name; defaults to the file name.
    #[arg(long)]
    pub name: Option<String>,

    /// Per-host ceiling on running instances of this script.
    #[arg(long)]
    pub max_concurrent: Option<u32>,

    /// Seconds before the script is killed; 0 for none.
    #[arg(long, default_value_t = 0)]
    pub timeout: u32,

    /// File or directory shipped with the script. Repeatable.
    #[arg(long = "dep")]
    pub deps: Vec<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub random: bool,

    #[arg(long)]
    pub least_loaded: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn target(&self) -> TargetSpec {
        match (&self.host, self.least_loaded) {
            (Some(name), _) => TargetSpec::Host(name.clone()),
            (None, true) => TargetSpec::LeastLoaded,
            (None, false) => TargetSpec::Random,
        }
    }

    pub fn script_name(&self) -> anyhow::Result<String> {
        if let Some(name) = &self.name {
            return Ok(name.clone());
        }
        match self.script.file_name() {
            Some(name) => Ok(name.to_string_lossy().into_owned()),
            None => bail!("cannot derive a script name from {}", self.script.display()),
        }
    }

    pub fn into_request(self) -> anyhow::Result<DispatchRequest> {
        let name = self.script_name()?;
        let script = Script::from_path(name, &self.script, MaxConcurrent::from(self.max_concurrent))
            .with_context(|| format!("reading script {}", self.script.display()))?;
        Ok(DispatchRequest {
            target: self.target(),
            script,
            deps: self.deps,
            timeout_secs: self.timeout,
        })
    }
}
