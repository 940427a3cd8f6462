//! Task packaging.
//!
//! A task is materialised as a self-contained directory that can be shipped verbatim to a host:
//!
//! ```text
//! <local_work_path>/<id>/<id>_<script name>   rendered script
//! <local_work_path>/<id>/DEPS/<basename>      one copy per dependency
//! ```
//!
//! The same layout is mirrored under the remote work path.

mod copy;

pub use copy::copy_into;

use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};

use geto_model::{Script, TaskId, TimeoutSecs};
use rand::{RngCore, rngs::OsRng};
use tracing::{debug, trace};

use crate::{error::CoreError, transport::remote_join};

/// Name of the dependency subdirectory inside a task directory.
pub const DEPS_DIR: &str = "DEPS";

/// Random bytes behind every task id.
const TASK_ID_BYTES: usize = 8;

/// One unit of dispatchable work.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    deps: Vec<PathBuf>,
    script: Script,
    timeout_secs: TimeoutSecs,
}

impl Task {
    /// Builds a task with an id drawn from the operating system's random source.
    pub fn new(deps: Vec<PathBuf>, script: Script, timeout_secs: TimeoutSecs) -> Result<Self, CoreError> {
        Self::with_rng(deps, script, timeout_secs, &mut OsRng)
    }

    /// Builds a task with an id drawn from `rng`.
    pub fn with_rng<R>(
        deps: Vec<PathBuf>,
        script: Script,
        timeout_secs: TimeoutSecs,
        rng: &mut R,
    ) -> Result<Self, CoreError>
    where
        R: RngCore + ?Sized,
    {
        script.check_name()?;
        Ok(Self {
            id: generate_task_id(rng)?,
            deps,
            script,
            timeout_secs,
        })
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn deps(&self) -> &[PathBuf] {
        &self.deps
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    /// `0` means no timeout.
    pub fn timeout_secs(&self) -> TimeoutSecs {
        self.timeout_secs
    }

    /// `<id>_<script name>`
    pub fn script_file_name(&self) -> String {
        format!("{}_{}", self.id, self.script.name())
    }

    pub fn local_dir(&self, local_work_path: &Path) -> PathBuf {
        local_work_path.join(self.id.as_str())
    }

    pub fn remote_dir(&self, remote_work_path: &str) -> String {
        remote_join(remote_work_path, self.id.as_str())
    }

    pub fn remote_script_path(&self, remote_work_path: &str) -> String {
        remote_join(&self.remote_dir(remote_work_path), &self.script_file_name())
    }

    /// Writes the task directory under `local_work_path` and returns its path.
    ///
    /// Blocking. Any failure aborts the whole operation; a partially written directory may be left behind.
    pub fn create_dir(&self, local_work_path: &Path) -> Result<PathBuf, CoreError> {
        self.check_dep_names()?;
        let dir = self.local_dir(local_work_path);
        let deps_dir = dir.join(DEPS_DIR);

        fs::create_dir_all(&deps_dir)
            .map_err(|e| CoreError::packaging(format!("create {}", deps_dir.display()), e))?;

        let script_path = dir.join(self.script_file_name());
        fs::write(&script_path, self.script.render())
            .map_err(|e| CoreError::packaging(format!("write {}", script_path.display()), e))?;
        make_executable(&script_path)
            .map_err(|e| CoreError::packaging(format!("chmod {}", script_path.display()), e))?;
        trace!(target: "geto.core.task", path = %script_path.display(), "script written");

        for dep in &self.deps {
            copy::copy_into(dep, &deps_dir)
                .map_err(|e| CoreError::packaging(format!("copy dependency {}", dep.display()), e))?;
        }

        debug!(target: "geto.core.task", task = %self.id, dir = %dir.display(), deps = self.deps.len(), "task directory created");
        Ok(dir)
    }

    /// Every dependency lands in `DEPS/` under its basename, so basenames must be unique.
    fn check_dep_names(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::with_capacity(self.deps.len());
        for dep in &self.deps {
            let Some(name) = dep.file_name() else {
                return Err(CoreError::packaging(
                    format!("dependency {}", dep.display()),
                    io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
                ));
            };
            if !seen.insert(name) {
                return Err(CoreError::packaging(
                    format!("dependency {}", dep.display()),
                    io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("another dependency is also named {}", name.to_string_lossy()),
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Draws [`TASK_ID_BYTES`] bytes from `rng` and formats them as four hyphen-separated hex groups (`xxxx-xxxx-xxxx-xxxx`).
pub fn generate_task_id<R>(rng: &mut R) -> Result<TaskId, CoreError>
where
    R: RngCore + ?Sized,
{
    let mut b = [0u8; TASK_ID_BYTES];
    rng.try_fill_bytes(&mut b)
        .map_err(|e| CoreError::TaskId(e.to_string()))?;

    let groups: Vec<String> = b
        .chunks(2)
        .map(|pair| pair.iter().map(|byte| format!("{byte:02x}")).collect())
        .collect();
    Ok(TaskId::from(groups.join("-")))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use geto_model::MaxConcurrent;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn is_grouped_hex(id: &str) -> bool {
        let groups: Vec<&str> = id.split('-').collect();
        groups.len() == 4
            && groups
                .iter()
                .all(|g| g.len() == 4 && g.chars().all(|c| c.is_ascii_hexdigit()))
    }

    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, _dest: &mut [u8]) {}
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::other("entropy source closed")))
        }
    }

    fn echo_script() -> Script {
        Script::with_commands("test", ["#!/bin/bash", "echo hi"], MaxConcurrent::Unlimited)
    }

    #[test]
    fn generated_ids_are_grouped_hex_and_unique() {
        const N: usize = 50;
        let mut seen = HashSet::with_capacity(N);
        for _ in 0..N {
            let id = generate_task_id(&mut OsRng).unwrap();
            assert!(is_grouped_hex(id.as_str()), "bad id {id}");
            seen.insert(id);
        }
        assert_eq!(seen.len(), N);
    }

    #[test]
    fn seeded_rng_gives_reproducible_ids() {
        let a = generate_task_id(&mut StdRng::seed_from_u64(7)).unwrap();
        let b = generate_task_id(&mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn broken_random_source_is_reported() {
        let err = generate_task_id(&mut BrokenRng).unwrap_err();
        assert!(matches!(err, CoreError::TaskId(_)));
        assert!(Task::with_rng(vec![], echo_script(), 0, &mut BrokenRng).is_err());
    }

    #[test]
    fn new_task_gets_valid_id() {
        let task = Task::new(vec![], echo_script(), 0).unwrap();
        assert!(is_grouped_hex(task.id().as_str()));
        assert_eq!(task.script_file_name(), format!("{}_test", task.id()));
    }

    #[test]
    fn invalid_script_name_is_rejected() {
        let script = Script::new("bad/name", MaxConcurrent::Unlimited);
        assert!(matches!(
            Task::new(vec![], script, 0),
            Err(CoreError::Script(_))
        ));
    }

    #[test]
    fn remote_paths_mirror_local_layout() {
        let task = Task::new(vec![], echo_script(), 0).unwrap();
        let id = task.id().to_string();
        assert_eq!(task.remote_dir("/work/"), format!("/work/{id}"));
        assert_eq!(
            task.remote_script_path("/work"),
            format!("/work/{id}/{id}_test")
        );
    }

    #[test]
    fn create_dir_writes_script_byte_for_byte() {
        let work = tempfile::tempdir().unwrap();
        let task = Task::new(vec![], echo_script(), 0).unwrap();

        let dir = task.create_dir(work.path()).unwrap();
        assert_eq!(dir, work.path().join(task.id().as_str()));
        assert!(dir.join(DEPS_DIR).is_dir());

        let body = fs::read(dir.join(task.script_file_name())).unwrap();
        assert_eq!(body, b"#!/bin/bash\necho hi\n");
    }

    #[cfg(unix)]
    #[test]
    fn create_dir_marks_script_executable() {
        use std::os::unix::fs::PermissionsExt;

        let work = tempfile::tempdir().unwrap();
        let task = Task::new(vec![], echo_script(), 0).unwrap();
        let dir = task.create_dir(work.path()).unwrap();

        let mode = fs::metadata(dir.join(task.script_file_name()))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[cfg(unix)]
    #[test]
    fn create_dir_copies_file_dependency() {
        let work = tempfile::tempdir().unwrap();
        let task = Task::new(vec![PathBuf::from("/bin/sh")], echo_script(), 0).unwrap();

        let dir = task.create_dir(work.path()).unwrap();
        let copied = dir.join(DEPS_DIR).join("sh");
        assert!(fs::File::open(&copied).is_ok(), "missing {}", copied.display());
    }

    #[test]
    fn create_dir_copies_directory_dependency() {
        let deps = tempfile::tempdir().unwrap();
        let lib = deps.path().join("lib");
        fs::create_dir(&lib).unwrap();
        fs::write(lib.join("util.sh"), "echo util\n").unwrap();

        let work = tempfile::tempdir().unwrap();
        let task = Task::new(vec![lib], echo_script(), 0).unwrap();
        let dir = task.create_dir(work.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dir.join(DEPS_DIR).join("lib/util.sh")).unwrap(),
            "echo util\n"
        );
    }

    #[test]
    fn duplicate_dependency_basenames_are_rejected() {
        let deps = tempfile::tempdir().unwrap();
        for sub in ["a", "b"] {
            fs::create_dir(deps.path().join(sub)).unwrap();
            fs::write(deps.path().join(sub).join("util.sh"), sub).unwrap();
        }

        let work = tempfile::tempdir().unwrap();
        let task = Task::new(
            vec![deps.path().join("a/util.sh"), deps.path().join("b/util.sh")],
            echo_script(),
            0,
        )
        .unwrap();

        let err = task.create_dir(work.path()).unwrap_err();
        assert!(matches!(err, CoreError::Packaging { ref context, .. } if context.contains("b/util.sh")));
        assert!(!task.local_dir(work.path()).exists());
    }

    #[test]
    fn missing_dependency_aborts_packaging() {
        let work = tempfile::tempdir().unwrap();
        let task = Task::new(
            vec![PathBuf::from("/no/such/dependency")],
            echo_script(),
            0,
        )
        .unwrap();

        assert!(matches!(
            task.create_dir(work.path()),
            Err(CoreError::Packaging { .. })
        ));
    }
}
