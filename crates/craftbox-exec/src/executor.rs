use crate::{sync, ExecError};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Options for a blocking [`Executor::execute`] call.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Environment overrides applied to the *remote* process, never the host.
    pub env: BTreeMap<String, String>,
    /// Buffer stdout/stderr and return them instead of inheriting the
    /// caller's streams.
    pub capture: bool,
    /// Fail with [`ExecError::CommandFailed`] on a non-zero exit.
    pub check: bool,
}

impl ExecOptions {
    pub fn checked() -> Self {
        Self {
            check: true,
            ..Self::default()
        }
    }

    pub fn captured() -> Self {
        Self {
            capture: true,
            ..Self::default()
        }
    }

    pub fn checked_captured() -> Self {
        Self {
            check: true,
            capture: true,
            ..Self::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Result of a blocking command execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Lossy UTF-8 view of stdout.
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Ownership to apply to a created file. `None` in
/// [`Executor::create_file`] leaves the file owned by the writing identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOwnership {
    pub user: String,
    pub group: String,
}

impl FileOwnership {
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }

    pub fn root() -> Self {
        Self::new("root", "root")
    }
}

impl std::fmt::Display for FileOwnership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.user, self.group)
    }
}

/// Build an argument vector from string slices.
pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_owned()).collect()
}

/// Prefix `command` with `env KEY=VAL ...` when overrides are present, so
/// the overrides take effect in the remote process environment rather than
/// the host's.
pub fn env_wrapped(command: &[String], env: &BTreeMap<String, String>) -> Vec<String> {
    if env.is_empty() {
        return command.to_vec();
    }

    let mut wrapped = Vec::with_capacity(command.len() + env.len() + 1);
    wrapped.push("env".to_owned());
    for (key, value) in env {
        wrapped.push(format!("{key}={value}"));
    }
    wrapped.extend(command.iter().cloned());
    wrapped
}

/// Uniform command/file/sync interface bound to one environment instance.
///
/// Implementations do not serialize concurrent access: two callers writing
/// the same destination path through the staging-then-rename pattern can
/// race. Callers owning an instance must serialize their own operations.
pub trait Executor {
    /// Write `content` to an absolute path inside the environment, staging
    /// through a temporary path and renaming into place so no
    /// partially-written file is ever observable at `destination`.
    fn create_file(
        &self,
        destination: &Path,
        content: &[u8],
        mode: &str,
        ownership: Option<&FileOwnership>,
    ) -> Result<(), ExecError>;

    /// Run an argument vector inside the environment, blocking until it
    /// completes. See [`ExecOptions`] for env/capture/check semantics.
    fn execute(&self, command: &[String], opts: &ExecOptions) -> Result<ExecOutput, ExecError>;

    /// Spawn a command inside the environment and return the live child
    /// handle. Used for long-running commands and the tar-pipe transfers.
    fn execute_streaming(
        &self,
        command: &[String],
        env: &BTreeMap<String, String>,
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<Child, ExecError>;

    /// Recursively copy a host path into the environment.
    fn sync_to(
        &self,
        source: &Path,
        destination: &Path,
        delete_existing: bool,
    ) -> Result<(), ExecError> {
        sync::sync_to(self, source, destination, delete_existing)
    }

    /// Recursively copy an environment path onto the host.
    fn sync_from(
        &self,
        source: &Path,
        destination: &Path,
        delete_existing: bool,
    ) -> Result<(), ExecError> {
        sync::sync_from(self, source, destination, delete_existing)
    }

    /// `test -f` inside the environment. A non-zero exit means "not a
    /// file", never an error.
    fn path_is_file(&self, path: &Path) -> Result<bool, ExecError> {
        let command = vec![
            "test".to_owned(),
            "-f".to_owned(),
            path.to_string_lossy().into_owned(),
        ];
        let out = self.execute(&command, &ExecOptions::captured())?;
        Ok(out.success())
    }

    /// `test -d` inside the environment.
    fn path_is_directory(&self, path: &Path) -> Result<bool, ExecError> {
        let command = vec![
            "test".to_owned(),
            "-d".to_owned(),
            path.to_string_lossy().into_owned(),
        ];
        let out = self.execute(&command, &ExecOptions::captured())?;
        Ok(out.success())
    }
}

/// Run a prepared host command honoring [`ExecOptions`] capture/check
/// semantics. `reported` is the logical remote argv used in errors, so a
/// failure reports the caller's command rather than the backend wrapper's.
pub fn run_command(
    mut cmd: Command,
    opts: &ExecOptions,
    reported: &[String],
) -> Result<ExecOutput, ExecError> {
    let output = if opts.capture {
        let output = cmd.output()?;
        ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    } else {
        let status = cmd.status()?;
        ExecOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    };

    if opts.check && !output.success() {
        return Err(ExecError::CommandFailed {
            exit_code: output.exit_code,
            command: reported.to_vec(),
        });
    }
    Ok(output)
}

/// Spawn a prepared host command with the given stdio wiring.
pub fn spawn_streaming(mut cmd: Command, stdin: Stdio, stdout: Stdio) -> Result<Child, ExecError> {
    cmd.stdin(stdin).stdout(stdout).spawn().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_wrapped_prefixes_overrides() {
        let command = argv(&["snap", "install", "snapcraft"]);
        let mut env = BTreeMap::new();
        env.insert("DEBIAN_FRONTEND".to_owned(), "noninteractive".to_owned());
        env.insert("LANG".to_owned(), "C.UTF-8".to_owned());

        let wrapped = env_wrapped(&command, &env);
        assert_eq!(
            wrapped,
            argv(&[
                "env",
                "DEBIAN_FRONTEND=noninteractive",
                "LANG=C.UTF-8",
                "snap",
                "install",
                "snapcraft",
            ])
        );
    }

    #[test]
    fn env_wrapped_is_identity_without_overrides() {
        let command = argv(&["true"]);
        assert_eq!(env_wrapped(&command, &BTreeMap::new()), command);
    }

    #[test]
    fn run_command_checked_reports_logical_argv() {
        let reported = argv(&["apt-get", "update"]);
        let mut cmd = Command::new("false");
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        let err = run_command(cmd, &ExecOptions::checked(), &reported).unwrap_err();
        match err {
            ExecError::CommandFailed { exit_code, command } => {
                assert_eq!(exit_code, 1);
                assert_eq!(command, reported);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn run_command_unchecked_returns_exit_code() {
        let out = run_command(
            Command::new("false"),
            &ExecOptions::captured(),
            &argv(&["false"]),
        )
        .unwrap();
        assert_eq!(out.exit_code, 1);
        assert!(!out.success());
    }

    #[test]
    fn run_command_captures_stdout() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello");
        let out = run_command(cmd, &ExecOptions::checked_captured(), &argv(&["echo"])).unwrap();
        assert_eq!(out.stdout_str().trim(), "hello");
    }

    #[test]
    fn ownership_display() {
        assert_eq!(FileOwnership::root().to_string(), "root:root");
        assert_eq!(FileOwnership::new("ubuntu", "users").to_string(), "ubuntu:users");
    }
}
