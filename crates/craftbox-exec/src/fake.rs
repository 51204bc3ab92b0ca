//! Scripted in-memory executor for tests.
//!
//! `FakeExecutor` interprets the small remote command surface the crate
//! relies on (`cat`, `test -f`/`-d`, `rm -rf`, `mkdir -p`, `systemctl
//! is-system-running`, `getent hosts`) against in-memory state and records
//! every call for assertions. It is shipped as a regular module so
//! downstream crates can drive their own tests with it.

use crate::executor::{ExecOptions, ExecOutput, Executor, FileOwnership};
use crate::ExecError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeFile {
    pub content: Vec<u8>,
    pub mode: String,
    pub ownership: Option<FileOwnership>,
}

#[derive(Debug, Default)]
struct FakeState {
    files: BTreeMap<PathBuf, FakeFile>,
    system_state: String,
    network_ready: bool,
    calls: Vec<Vec<String>>,
}

#[derive(Debug)]
pub struct FakeExecutor {
    state: Mutex<FakeState>,
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                files: BTreeMap::new(),
                system_state: "running".to_owned(),
                network_ready: true,
                calls: Vec::new(),
            }),
        }
    }
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, FakeState>, ExecError> {
        self.state
            .lock()
            .map_err(|e| ExecError::Transfer(format!("fake executor mutex poisoned: {e}")))
    }

    /// Seed a file into the fake environment.
    pub fn put_file(&self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        if let Ok(mut state) = self.state.lock() {
            state.files.insert(
                path.into(),
                FakeFile {
                    content: content.into(),
                    mode: "0644".to_owned(),
                    ownership: None,
                },
            );
        }
    }

    pub fn remove_file(&self, path: &Path) {
        if let Ok(mut state) = self.state.lock() {
            state.files.remove(path);
        }
    }

    pub fn set_system_state(&self, state_str: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.system_state = state_str.to_owned();
        }
    }

    pub fn set_network_ready(&self, ready: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.network_ready = ready;
        }
    }

    /// Every command executed so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn file(&self, path: &Path) -> Option<FakeFile> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.files.get(path).cloned())
    }

    pub fn file_content(&self, path: &Path) -> Option<Vec<u8>> {
        self.file(path).map(|f| f.content)
    }

    fn interpret(state: &FakeState, command: &[String]) -> (i32, Vec<u8>) {
        let parts: Vec<&str> = command.iter().map(String::as_str).collect();
        match parts.as_slice() {
            ["cat", path] => match state.files.get(Path::new(path)) {
                Some(file) => (0, file.content.clone()),
                None => (1, Vec::new()),
            },
            ["test", "-f", path] => {
                let exit = i32::from(!state.files.contains_key(Path::new(path)));
                (exit, Vec::new())
            }
            ["test", "-d", path] => {
                let dir = Path::new(path);
                let exists = state.files.keys().any(|p| p.starts_with(dir) && p != dir);
                (i32::from(!exists), Vec::new())
            }
            ["systemctl", "is-system-running"] => {
                let exit = i32::from(state.system_state != "running");
                (exit, format!("{}\n", state.system_state).into_bytes())
            }
            ["getent", "hosts", _] => (i32::from(!state.network_ready) * 2, Vec::new()),
            _ => (0, Vec::new()),
        }
    }
}

impl Executor for FakeExecutor {
    fn create_file(
        &self,
        destination: &Path,
        content: &[u8],
        mode: &str,
        ownership: Option<&FileOwnership>,
    ) -> Result<(), ExecError> {
        let mut state = self.lock()?;
        state.files.insert(
            destination.to_path_buf(),
            FakeFile {
                content: content.to_vec(),
                mode: mode.to_owned(),
                ownership: ownership.cloned(),
            },
        );
        Ok(())
    }

    fn execute(&self, command: &[String], opts: &ExecOptions) -> Result<ExecOutput, ExecError> {
        let mut state = self.lock()?;
        state.calls.push(command.to_vec());

        let (exit_code, stdout) = Self::interpret(&state, command);
        if command.first().map(String::as_str) == Some("rm") {
            if let Some(path) = command.get(2) {
                let prefix = PathBuf::from(path);
                state.files.retain(|p, _| !p.starts_with(&prefix));
            }
        }
        drop(state);

        if opts.check && exit_code != 0 {
            return Err(ExecError::CommandFailed {
                exit_code,
                command: command.to_vec(),
            });
        }
        Ok(ExecOutput {
            exit_code,
            stdout,
            stderr: Vec::new(),
        })
    }

    fn execute_streaming(
        &self,
        command: &[String],
        _env: &BTreeMap<String, String>,
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<Child, ExecError> {
        let mut state = self.lock()?;
        state.calls.push(command.to_vec());
        drop(state);

        // The fake has no real environment to stream into; stand in with a
        // process that drains its input and exits cleanly so pipe wiring
        // still behaves.
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "cat > /dev/null"]);
        cmd.stdin(stdin).stdout(stdout).spawn().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::argv;

    #[test]
    fn cat_returns_seeded_content() {
        let fake = FakeExecutor::new();
        fake.put_file("/etc/os-release", b"VERSION_ID=\"20.04\"\n".to_vec());

        let out = fake
            .execute(&argv(&["cat", "/etc/os-release"]), &ExecOptions::captured())
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, b"VERSION_ID=\"20.04\"\n");
    }

    #[test]
    fn cat_missing_file_fails() {
        let fake = FakeExecutor::new();
        let out = fake
            .execute(&argv(&["cat", "/etc/craft-image.conf"]), &ExecOptions::captured())
            .unwrap();
        assert_eq!(out.exit_code, 1);
    }

    #[test]
    fn check_converts_nonzero_exit() {
        let fake = FakeExecutor::new();
        let err = fake
            .execute(&argv(&["cat", "/missing"]), &ExecOptions::checked_captured())
            .unwrap_err();
        assert!(matches!(err, ExecError::CommandFailed { exit_code: 1, .. }));
    }

    #[test]
    fn path_predicates_reflect_files() {
        let fake = FakeExecutor::new();
        fake.put_file("/root/project/src/main.c", b"x".to_vec());

        assert!(fake.path_is_file(Path::new("/root/project/src/main.c")).unwrap());
        assert!(!fake.path_is_file(Path::new("/root/project/src")).unwrap());
        assert!(fake.path_is_directory(Path::new("/root/project")).unwrap());
        assert!(!fake.path_is_directory(Path::new("/elsewhere")).unwrap());
    }

    #[test]
    fn rm_rf_drops_tracked_subtree() {
        let fake = FakeExecutor::new();
        fake.put_file("/root/project/a", b"a".to_vec());
        fake.put_file("/root/other", b"b".to_vec());

        fake.execute(&argv(&["rm", "-rf", "/root/project"]), &ExecOptions::checked())
            .unwrap();

        assert!(fake.file_content(Path::new("/root/project/a")).is_none());
        assert!(fake.file_content(Path::new("/root/other")).is_some());
    }
}
