//! Wrapper around the `multipass` command-line VM manager.

use crate::ProviderError;
use craftbox_exec::{run_command, ExecError, ExecOptions, ExecOutput};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

pub const MINIMUM_VERSION: (u32, u32) = (1, 5);

/// One instance record from `multipass info --format json`.
#[derive(Debug, Clone, Deserialize)]
pub struct VmInfo {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub mounts: BTreeMap<String, VmMount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmMount {
    #[serde(default)]
    pub source_path: String,
}

#[derive(Debug, Deserialize)]
struct InfoOutput {
    #[serde(default)]
    info: BTreeMap<String, VmInfo>,
}

/// Resolved `multipass` binary. The path is fixed at construction and
/// never reassigned; see `BackendLocator` for resolution.
#[derive(Debug, Clone)]
pub struct Multipass {
    path: PathBuf,
}

impl Multipass {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
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

    /// Host command running `command` inside `name` via `multipass exec`.
    /// The caller owns stdio wiring and capture/check semantics.
    pub fn exec_command(&self, name: &str, command: &[String]) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(["exec", name, "--"]);
        cmd.args(command);
        cmd
    }

    pub fn launch(
        &self,
        name: &str,
        image: &str,
        cpus: u32,
        mem_gb: u32,
        disk_gb: u32,
    ) -> Result<(), ProviderError> {
        debug!(name, image, "launching VM");
        let cpus = cpus.to_string();
        let mem = format!("{mem_gb}G");
        let disk = format!("{disk_gb}G");
        self.run(&[
            "launch", image, "--name", name, "--cpus", &cpus, "--mem", &mem, "--disk", &disk,
        ])?;
        Ok(())
    }

    pub fn start(&self, name: &str) -> Result<(), ProviderError> {
        self.run(&["start", name])?;
        Ok(())
    }

    /// Stop the VM. `delay_mins` schedules the shutdown via `--time`.
    pub fn stop(&self, name: &str, delay_mins: Option<u32>) -> Result<(), ProviderError> {
        match delay_mins {
            Some(mins) => {
                let mins = mins.to_string();
                self.run(&["stop", "--time", &mins, name])?;
            }
            None => {
                self.run(&["stop", name])?;
            }
        }
        Ok(())
    }

    /// Delete the VM. Deleting an absent VM is not an error.
    pub fn delete(&self, name: &str, purge: bool) -> Result<(), ProviderError> {
        let args: &[&str] = if purge {
            &["delete", "--purge", name]
        } else {
            &["delete", name]
        };
        match self.run(args) {
            Ok(_) => Ok(()),
            Err(ProviderError::Command { details, .. }) if is_not_found(&details) => {
                debug!(name, "delete of absent VM ignored");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Query one VM. `None` when multipass reports it does not exist; the
    /// CLI signals this textually rather than with a distinct exit code.
    pub fn info(&self, name: &str) -> Result<Option<VmInfo>, ProviderError> {
        let args = ["info", name, "--format", "json"];
        let mut cmd = Command::new(&self.path);
        cmd.args(args);
        let out = run_command(cmd, &ExecOptions::captured(), &self.reported(&args))?;
        if !out.success() {
            let combined = format!(
                "{}{}",
                out.stdout_str(),
                String::from_utf8_lossy(&out.stderr)
            );
            if is_not_found(&combined) {
                return Ok(None);
            }
            return Err(ProviderError::Command {
                command: self.reported(&args),
                details: combined.trim().to_owned(),
            });
        }

        let parsed: InfoOutput = serde_json::from_slice(&out.stdout)
            .map_err(|err| ProviderError::UnexpectedOutput(format!("multipass info: {err}")))?;
        match parsed.info.get(name) {
            Some(vm) => Ok(Some(vm.clone())),
            None => Err(ProviderError::UnexpectedOutput(format!(
                "multipass info is missing VM '{name}'"
            ))),
        }
    }

    /// `multipass transfer <source> <name>:<path>`.
    pub fn transfer_in(&self, source: &Path, name: &str, destination: &Path) -> Result<(), ProviderError> {
        let target = format!("{name}:{}", destination.display());
        let source = source.to_string_lossy().into_owned();
        self.run(&["transfer", &source, &target])?;
        Ok(())
    }

    /// `multipass transfer <name>:<path> <destination>`.
    pub fn transfer_out(&self, name: &str, source: &Path, destination: &Path) -> Result<(), ProviderError> {
        let origin = format!("{name}:{}", source.display());
        let destination = destination.to_string_lossy().into_owned();
        self.run(&["transfer", &origin, &destination])?;
        Ok(())
    }

    /// Stream `content` into a VM path with `multipass transfer - <name>:<path>`.
    pub fn transfer_stdin(
        &self,
        content: &[u8],
        name: &str,
        destination: &Path,
    ) -> Result<(), ProviderError> {
        let target = format!("{name}:{}", destination.display());
        let args = ["transfer", "-", target.as_str()];

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

    pub fn mount(&self, source: &Path, name: &str, target: &Path) -> Result<(), ProviderError> {
        let source = source.to_string_lossy().into_owned();
        let target = format!("{name}:{}", target.display());
        self.run(&["mount", &source, &target])?;
        Ok(())
    }

    pub fn umount(&self, name: &str, target: &Path) -> Result<(), ProviderError> {
        let target = format!("{name}:{}", target.display());
        self.run(&["umount", &target])?;
        Ok(())
    }

    /// Parse `multipass version` into the client's (major, minor).
    pub fn version(&self) -> Result<(u32, u32), ProviderError> {
        let out = self.run(&["version"])?;
        let stdout = out.stdout_str();
        parse_version(&stdout)
            .ok_or_else(|| ProviderError::UnexpectedOutput(format!("multipass version: {stdout:?}")))
    }

    pub fn ensure_supported_version(&self) -> Result<(), ProviderError> {
        let (major, minor) = self.version()?;
        if (major, minor) < MINIMUM_VERSION {
            return Err(ProviderError::UnsupportedVersion {
                tool: "multipass".to_owned(),
                version: format!("{major}.{minor}"),
                minimum: format!("{}.{}", MINIMUM_VERSION.0, MINIMUM_VERSION.1),
            });
        }
        Ok(())
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("does not exist") || message.contains("not found")
}

/// First line is `multipass <version>`; a second `multipassd` line may be
/// present or missing (daemon down) and is ignored.
fn parse_version(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().find(|l| l.starts_with("multipass"))?;
    let version = line.split_whitespace().nth(1)?;
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.split(|c: char| !c.is_ascii_digit()).next()?.parse().ok()?;
    Some((major, minor))
}
