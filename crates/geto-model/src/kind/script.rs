use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{MaxConcurrent, ModelError};

/// A named shell script that runs on a target host.
///
/// The command list is fixed at construction. Anything derived from a script (the dispatch wrapper, for one) is a new value, never an edit of an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Script name; need not be unique.
    ///
    /// Also used to match running instances on a host, so scripts that share a name share a concurrency ceiling.
    name: String,
    /// One entry per line of the script.
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    max_concurrent: MaxConcurrent,
}

impl Script {
    /// Script with no commands.
    pub fn new(name: impl Into<String>, max_concurrent: MaxConcurrent) -> Self {
        Self::with_commands(name, Vec::<String>::new(), max_concurrent)
    }

    pub fn with_commands<I, S>(name: impl Into<String>, commands: I, max_concurrent: MaxConcurrent) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            commands: commands.into_iter().map(Into::into).collect(),
            max_concurrent,
        }
    }

    /// Reads a script from `path`, one command per line.
    pub fn from_path(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        max_concurrent: MaxConcurrent,
    ) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let read_err = |source| ModelError::ReadScript {
            path: path.display().to_string(),
            source,
        };

        let file = File::open(path).map_err(read_err)?;
        let commands = BufReader::new(file)
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?;

        Ok(Self::with_commands(name, commands, max_concurrent))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn max_concurrent(&self) -> MaxConcurrent {
        self.max_concurrent
    }

    /// File body for this script: every command terminated by a newline.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.commands.iter().map(|c| c.len() + 1).sum());
        for line in &self.commands {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Checks that the name can be embedded in a file name and a process pattern.
    pub fn check_name(&self) -> Result<(), ModelError> {
        if self.name.is_empty() {
            return Err(ModelError::EmptyScriptName);
        }
        if self.name.contains('/') || self.name.chars().any(char::is_whitespace) {
            return Err(ModelError::InvalidScriptName(self.name.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn new_script_has_no_commands_and_no_ceiling() {
        let s = Script::new("test", MaxConcurrent::Unlimited);
        assert_eq!(s.name(), "test");
        assert!(s.commands().is_empty());
        assert!(s.max_concurrent().is_unlimited());
    }

    #[test]
    fn from_path_reads_lines_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "echo \"Hello World\"\nls\ntrue\nfalse\n").unwrap();

        let s = Script::from_path("test", file.path(), MaxConcurrent::Limit(100)).unwrap();
        assert_eq!(s.commands(), ["echo \"Hello World\"", "ls", "true", "false"]);
        assert_eq!(s.max_concurrent(), MaxConcurrent::Limit(100));
    }

    #[test]
    fn from_path_missing_file_is_error() {
        let err = Script::from_path("x", "/definitely/not/here.sh", MaxConcurrent::Unlimited)
            .unwrap_err();
        assert!(matches!(err, ModelError::ReadScript { .. }));
    }

    #[test]
    fn render_terminates_every_line() {
        let s = Script::with_commands("t", ["#!/bin/bash", "echo hi"], MaxConcurrent::Unlimited);
        assert_eq!(s.render(), "#!/bin/bash\necho hi\n");
        assert_eq!(Script::new("t", MaxConcurrent::Unlimited).render(), "");
    }

    #[test]
    fn render_matches_source_file() {
        let body = "#!/bin/bash\necho one\necho two\n";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();

        let s = Script::from_path("t", file.path(), MaxConcurrent::Unlimited).unwrap();
        assert_eq!(s.render(), body);
    }

    #[test]
    fn check_name_rejects_path_separators() {
        assert!(Script::new("ok-name", MaxConcurrent::Unlimited).check_name().is_ok());
        assert!(matches!(
            Script::new("", MaxConcurrent::Unlimited).check_name(),
            Err(ModelError::EmptyScriptName)
        ));
        assert!(matches!(
            Script::new("a/b", MaxConcurrent::Unlimited).check_name(),
            Err(ModelError::InvalidScriptName(_))
        ));
    }

    #[test]
    fn deserialize_without_ceiling_is_unlimited() {
        let s: Script =
            serde_json::from_str(r#"{"name":"echo","commands":["echo hi"]}"#).unwrap();
        assert!(s.max_concurrent().is_unlimited());
        assert_eq!(s.commands(), ["echo hi"]);
    }
}
