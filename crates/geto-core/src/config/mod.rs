//! Dispatch configuration.
//!
//! Built once at startup and handed to [`crate::Dispatcher::new`], which refuses a config that fails [`DispatchConfig::validate`].

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use geto_model::Host;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::lock::LockPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config must have at least one host")]
    NoHosts,
    #[error("config option {0} must not be empty")]
    EmptyPath(&'static str),
    #[error("host {0} has no password and no privkey_path is configured")]
    MissingCredentials(String),
    #[error("duplicate host name {0}")]
    DuplicateHost(String),
    #[error("lock.acquire_attempts and lock.release_attempts must be at least 1")]
    ZeroAttempts,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Hosts in file order. Least-loaded selection breaks ties by this order.
    pub hosts: Vec<Host>,
    /// Directory on each host that receives task directories.
    pub remote_work_path: String,
    /// Local directory where task directories are packaged.
    pub local_work_path: PathBuf,
    /// Remote directory whose existence is the host lock.
    pub remote_lock_path: String,
    /// Key used by transports that authenticate with one. Opaque to the engine.
    pub private_key_path: Option<PathBuf>,
    pub lock: LockPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    geto: GetoSection,
    #[serde(default)]
    hosts: Vec<Host>,
    #[serde(default)]
    lock: LockSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetoSection {
    remote_work_path: String,
    local_work_path: PathBuf,
    remote_lock_path: String,
    #[serde(default)]
    privkey_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LockSection {
    acquire_attempts: u32,
    release_attempts: u32,
    retry_delay_ms: u64,
}

impl Default for LockSection {
    fn default() -> Self {
        let policy = LockPolicy::default();
        Self {
            acquire_attempts: policy.acquire_attempts,
            release_attempts: policy.release_attempts,
            retry_delay_ms: policy.retry_delay.as_millis() as u64,
        }
    }
}

impl DispatchConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(target: "geto.core.config", path = %path.display(), "parsing configuration file");

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw)?;

        let cfg = Self {
            hosts: file.hosts,
            remote_work_path: file.geto.remote_work_path,
            local_work_path: file.geto.local_work_path,
            remote_lock_path: file.geto.remote_lock_path,
            private_key_path: file.geto.privkey_path,
            lock: LockPolicy {
                acquire_attempts: file.lock.acquire_attempts,
                release_attempts: file.lock.release_attempts,
                retry_delay: Duration::from_millis(file.lock.retry_delay_ms),
            },
        };
        cfg.validate()?;

        debug!(target: "geto.core.config", hosts = cfg.hosts.len(), "configuration parsed");
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        if self.remote_work_path.trim().is_empty() {
            return Err(ConfigError::EmptyPath("remote_work_path"));
        }
        if self.local_work_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath("local_work_path"));
        }
        if self.remote_lock_path.trim().is_empty() {
            return Err(ConfigError::EmptyPath("remote_lock_path"));
        }
        if self.lock.acquire_attempts == 0 || self.lock.release_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }

        for (i, host) in self.hosts.iter().enumerate() {
            if host.password.is_none() && self.private_key_path.is_none() {
                return Err(ConfigError::MissingCredentials(host.name.clone()));
            }
            if self.hosts[..i].iter().any(|h| h.name == host.name) {
                return Err(ConfigError::DuplicateHost(host.name.clone()));
            }
        }
        Ok(())
    }

    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[geto]
remote_work_path = "/tmp/geto/work"
local_work_path = "/tmp/geto/local"
remote_lock_path = "/tmp/geto/lock"
privkey_path = "/home/geto/.ssh/id_ed25519"

[[hosts]]
name = "alpha"
addr = "10.0.0.1"
username = "geto"

[[hosts]]
name = "beta"
addr = "10.0.0.2"
username = "geto"
password = "secret"
port = 2222
"#;

    #[test]
    fn parses_sample_config() {
        let cfg = DispatchConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.hosts.len(), 2);
        assert_eq!(cfg.hosts[0].name, "alpha");
        assert_eq!(cfg.hosts[0].port, 22);
        assert_eq!(cfg.hosts[1].port, 2222);
        assert_eq!(cfg.hosts[1].password.as_deref(), Some("secret"));
        assert_eq!(cfg.remote_lock_path, "/tmp/geto/lock");
        assert_eq!(cfg.lock, LockPolicy::default());
        assert!(cfg.host("beta").is_some());
        assert!(cfg.host("gamma").is_none());
    }

    #[test]
    fn lock_section_overrides_policy() {
        let raw = format!("{SAMPLE}\n[lock]\nacquire_attempts = 3\nretry_delay_ms = 0\n");
        let cfg = DispatchConfig::from_toml_str(&raw).unwrap();
        assert_eq!(cfg.lock.acquire_attempts, 3);
        assert_eq!(cfg.lock.release_attempts, 20);
        assert_eq!(cfg.lock.retry_delay, Duration::ZERO);
    }

    #[test]
    fn rejects_config_without_hosts() {
        let raw = r#"
[geto]
remote_work_path = "/w"
local_work_path = "/l"
remote_lock_path = "/lock"
"#;
        assert!(matches!(
            DispatchConfig::from_toml_str(raw),
            Err(ConfigError::NoHosts)
        ));
    }

    #[test]
    fn rejects_host_without_credentials() {
        let raw = r#"
[geto]
remote_work_path = "/w"
local_work_path = "/l"
remote_lock_path = "/lock"

[[hosts]]
name = "alpha"
addr = "10.0.0.1"
username = "geto"
"#;
        assert!(matches!(
            DispatchConfig::from_toml_str(raw),
            Err(ConfigError::MissingCredentials(name)) if name == "alpha"
        ));
    }

    #[test]
    fn rejects_out_of_range_port() {
        let raw = SAMPLE.replace("port = 2222", "port = 70000");
        assert!(matches!(
            DispatchConfig::from_toml_str(&raw),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_duplicate_host_names() {
        let raw = SAMPLE.replace("name = \"beta\"", "name = \"alpha\"");
        assert!(matches!(
            DispatchConfig::from_toml_str(&raw),
            Err(ConfigError::DuplicateHost(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        assert!(matches!(
            DispatchConfig::load("/no/such/geto.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
