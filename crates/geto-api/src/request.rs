use std::{fmt, path::PathBuf, str::FromStr};

use geto_core::Target;
use geto_model::{Script, TimeoutSecs};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Host choice as it appears on the wire: `host:<name>`, `random` or `least-loaded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetSpec {
    Host(String),
    Random,
    LeastLoaded,
}

impl TargetSpec {
    pub fn into_target(self) -> Target {
        match self {
            TargetSpec::Host(name) => Target::Named(name),
            TargetSpec::Random => Target::Random,
            TargetSpec::LeastLoaded => Target::LeastLoaded,
        }
    }
}

impl FromStr for TargetSpec {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "random" => Ok(TargetSpec::Random),
            "least-loaded" => Ok(TargetSpec::LeastLoaded),
            other => match other.strip_prefix("host:") {
                Some(name) if !name.is_empty() => Ok(TargetSpec::Host(name.to_string())),
                _ => Err(ApiError::InvalidRequest(format!(
                    "bad target {s:?} (expected host:<name>, random or least-loaded)"
                ))),
            },
        }
    }
}

impl TryFrom<String> for TargetSpec {
    type Error = ApiError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TargetSpec> for String {
    fn from(t: TargetSpec) -> Self {
        t.to_string()
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::Host(name) => write!(f, "host:{name}"),
            TargetSpec::Random => f.write_str("random"),
            TargetSpec::LeastLoaded => f.write_str("least-loaded"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub script: Script,
    /// Local paths shipped alongside the script under `DEPS/`.
    #[serde(default)]
    pub deps: Vec<PathBuf>,
    /// `0` means no timeout.
    #[serde(default)]
    pub timeout_secs: TimeoutSecs,
    pub target: TargetSpec,
}

#[cfg(test)]
mod tests {
    use geto_model::MaxConcurrent;

    use super::*;

    #[test]
    fn target_spec_parses_all_forms() {
        assert_eq!("random".parse::<TargetSpec>().unwrap(), TargetSpec::Random);
        assert_eq!(
            "least-loaded".parse::<TargetSpec>().unwrap(),
            TargetSpec::LeastLoaded
        );
        assert_eq!(
            "host:alpha".parse::<TargetSpec>().unwrap(),
            TargetSpec::Host("alpha".into())
        );
        assert!("host:".parse::<TargetSpec>().is_err());
        assert!("fastest".parse::<TargetSpec>().is_err());
    }

    #[test]
    fn request_decodes_from_json_with_defaults() {
        let req: DispatchRequest = serde_json::from_str(
            r##"{
                "script": {"name": "backup", "commands": ["#!/bin/bash", "tar czf /tmp/b.tgz /etc"], "max_concurrent": 1},
                "target": "least-loaded"
            }"##,
        )
        .unwrap();

        assert_eq!(req.script.name(), "backup");
        assert_eq!(req.script.max_concurrent(), MaxConcurrent::Limit(1));
        assert!(req.deps.is_empty());
        assert_eq!(req.timeout_secs, 0);
        assert_eq!(req.target, TargetSpec::LeastLoaded);
    }

    #[test]
    fn bad_target_fails_decoding() {
        let err = serde_json::from_str::<DispatchRequest>(
            r#"{"script": {"name": "x"}, "target": "everywhere"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("bad target"));
    }
}
