//! Wrapper around the `lxc` command-line container manager.

use crate::ProviderError;
use craftbox_exec::{run_command, ExecError, ExecOptions, ExecOutput};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

pub const DEFAULT_IMAGE_REMOTE: &str = "ubuntu";

/// One instance record from `lxc list --format json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    #[serde(default)]
    pub status: String,
}

/// Resolved `lxc` binary plus the image remote to launch from. Fixed at
/// construction; see `BackendLocator` for resolution.
#[derive(Debug, Clone)]
pub struct Lxc {
    path: PathBuf,
    remote: String,
}

impl Lxc {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            remote: DEFAULT_IMAGE_REMOTE.to_owned(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reported(&self, args: &[&str]) -> Vec<String> {
        let mut reported = vec![self.path.to_string_lossy().into_owned()];
        reported.extend(args.iter().map(|a| (*a).to_owned()));
        reported
    }

    fn run(&self, args: &[&str]) -> Result<ExecOutput, ProviderError> {
        let mut cmd = Command::new(&self.path);
        cmd.args(args);
        let out = run_command(cmd, &ExecOptions::captured(), &self.reported(args))?;
        if !out.success() {
            return Err(ProviderError::Command {
                command: self.reported(args),
                details: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            });
        }
        Ok(out)
    }

    /// Host command running `command` inside `name` via `lxc exec`.
    /// Container commands already run as root; env overrides are passed
    /// with `--env` so they reach the container process only.
    pub fn exec_command(
        &self,
        name: &str,
        command: &[String],
        env: &BTreeMap<String, String>,
    ) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(["exec", name]);
        for (key, value) in env {
            cmd.arg(format!("--env={key}={value}"));
        }
        cmd.arg("--");
        cmd.args(command);
        cmd
    }

    /// `lxc launch <remote>:<series> <name>` with cpu/memory limits. Root
    /// disk size is left to the storage pool default; LXD pools are sparse
    /// and per-instance quotas are a pool-level concern.
    pub fn launch(
        &self,
        name: &str,
        series: &str,
        cpus: u32,
        mem_gb: u32,
    ) -> Result<(), ProviderError> {
        debug!(name, series, "launching container");
        let image = format!("{}:{series}", self.remote);
        let cpu_limit = format!("limits.cpu={cpus}");
        let mem_limit = format!("limits.memory={mem_gb}GiB");
        self.run(&["launch", &image, name, "-c", &cpu_limit, "-c", &mem_limit])?;
        Ok(())
    }

    pub fn start(&self, name: &str) -> Result<(), ProviderError> {
        self.run(&["start", name])?;
        Ok(())
    }

    pub fn stop(&self, name: &str) -> Result<(), ProviderError> {
        self.run(&["stop", "--force", name])?;
        Ok(())
    }

    /// Delete the container. Deleting an absent container is not an error.
    pub fn delete(&self, name: &str) -> Result<(), ProviderError> {
        match self.run(&["delete", "--force", name]) {
            Ok(_) => Ok(()),
            Err(ProviderError::Command { details, .. }) if is_not_found(&details) => {
                debug!(name, "delete of absent container ignored");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Query one container. `None` when it does not exist; `lxc list`
    /// filters by name and returns an empty array for unknown names.
    pub fn info(&self, name: &str) -> Result<Option<ContainerInfo>, ProviderError> {
        let out = self.run(&["list", name, "--format", "json"])?;
        let parsed: Vec<ContainerInfo> = serde_json::from_slice(&out.stdout)
            .map_err(|err| ProviderError::UnexpectedOutput(format!("lxc list: {err}")))?;
        // The name argument is a prefix filter; match exactly.
        Ok(parsed.into_iter().find(|c| c.name == name))
    }

    /// `lxc file push <source> <name>/<path>`.
    pub fn file_push(&self, source: &Path, name: &str, destination: &Path) -> Result<(), ProviderError> {
        let target = format!("{name}{}", destination.display());
        let source = source.to_string_lossy().into_owned();
        self.run(&["file", "push", &source, &target])?;
        Ok(())
    }

    /// `lxc file pull <name>/<path> <destination>`.
    pub fn file_pull(&self, name: &str, source: &Path, destination: &Path) -> Result<(), ProviderError> {
        let origin = format!("{name}{}", source.display());
        let destination = destination.to_string_lossy().into_owned();
        self.run(&["file", "pull", &origin, &destination])?;
        Ok(())
    }

    /// Stream `content` into a container path with `lxc file push -`.
    pub fn file_push_stdin(
        &self,
        content: &[u8],
        name: &str,
        destination: &Path,
        mode: &str,
    ) -> Result<(), ProviderError> {
        let target = format!("{name}{}", destination.display());
        let mode_arg = format!("--mode={mode}");
        let args = ["file", "push", "-", target.as_str(), mode_arg.as_str()];

        let mut cmd = Command::new(&self.path);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(ExecError::from)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content).map_err(ExecError::from)?;
        }
        let output = child.wait_with_output().map_err(ExecError::from)?;
        if !output.status.success() {
            return Err(ProviderError::Command {
                command: self.reported(&args),
                details: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("not found") || message.contains("doesn't exist")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        assert!(is_not_found("Error: Instance not found"));
        assert!(is_not_found("Error: Instance doesn't exist"));
        assert!(!is_not_found("Error: The remote isn't a private server"));
    }

    #[test]
    fn list_json_parses_status() {
        let raw = r#"[{"name": "builder", "status": "Running", "type": "container"}]"#;
        let parsed: Vec<ContainerInfo> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[0].name, "builder");
        assert_eq!(parsed[0].status, "Running");
    }

    #[test]
    fn exec_command_places_env_before_separator() {
        let lxc = Lxc::new("lxc");
        let mut env = BTreeMap::new();
        env.insert("DEBIAN_FRONTEND".to_owned(), "noninteractive".to_owned());

        let cmd = lxc.exec_command("builder", &["apt".to_owned(), "update".to_owned()], &env);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "exec",
                "builder",
                "--env=DEBIAN_FRONTEND=noninteractive",
                "--",
                "apt",
                "update"
            ]
        );
    }
}
