//! Raw-host executor: the "environment" is the host itself.

use craftbox_exec::{
    env_wrapped, run_command, spawn_streaming, ExecError, ExecOptions, ExecOutput, Executor,
    FileOwnership,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// Executes commands directly on the host, optionally through
/// `sudo -H -u <user> --`. File creation stages through a temporary file
/// in the destination directory and renames into place.
#[derive(Debug, Clone, Default)]
pub struct HostExecutor {
    sudo_user: Option<String>,
}

impl HostExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sudo_user(user: impl Into<String>) -> Self {
        Self {
            sudo_user: Some(user.into()),
        }
    }

    fn host_command(&self, command: &[String], env: &BTreeMap<String, String>) -> Command {
        let argv = env_wrapped(command, env);
        match &self.sudo_user {
            Some(user) => {
                let mut cmd = Command::new("sudo");
                cmd.args(["-H", "-u", user, "--"]);
                cmd.args(&argv);
                cmd
            }
            None => {
                let mut cmd = Command::new(&argv[0]);
                cmd.args(&argv[1..]);
                cmd
            }
        }
    }
}

impl Executor for HostExecutor {
    fn create_file(
        &self,
        destination: &Path,
        content: &[u8],
        mode: &str,
        ownership: Option<&FileOwnership>,
    ) -> Result<(), ExecError> {
        let parent = destination
            .parent()
            .ok_or_else(|| ExecError::Transfer(format!("{} has no parent", destination.display())))?;
        std::fs::create_dir_all(parent)?;

        let mode_bits = u32::from_str_radix(mode, 8)
            .map_err(|_| ExecError::Transfer(format!("invalid file mode '{mode}'")))?;

        let mut staging = tempfile::Builder::new()
            .prefix(".craftbox-")
            .tempfile_in(parent)?;
        staging.write_all(content)?;
        staging
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode_bits))?;

        let staging_path = staging.into_temp_path();
        if let Some(ownership) = ownership {
            self.execute(
                &[
                    "chown".to_owned(),
                    ownership.to_string(),
                    staging_path.to_string_lossy().into_owned(),
                ],
                &ExecOptions::checked_captured(),
            )
            .map_err(|err| crate::ownership_denied(err, ownership, destination))?;
        }

        debug!("installing {}", destination.display());
        staging_path
            .persist(destination)
            .map_err(|err| ExecError::Io(err.error))?;
        Ok(())
    }

    fn execute(&self, command: &[String], opts: &ExecOptions) -> Result<ExecOutput, ExecError> {
        let cmd = self.host_command(command, &opts.env);
        run_command(cmd, opts, command)
    }

    fn execute_streaming(
        &self,
        command: &[String],
        env: &BTreeMap<String, String>,
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<Child, ExecError> {
        let cmd = self.host_command(command, env);
        spawn_streaming(cmd, stdin, stdout)
    }
}

/// Trivial provider for the raw-host backend: there is nothing to launch,
/// poll, or negotiate, the host is always "ready".
#[derive(Debug, Clone, Default)]
pub struct HostProvider {
    sudo_user: Option<String>,
}

impl HostProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sudo_user(user: impl Into<String>) -> Self {
        Self {
            sudo_user: Some(user.into()),
        }
    }

    pub fn create_instance(&self) -> HostExecutor {
        match &self.sudo_user {
            Some(user) => HostExecutor::with_sudo_user(user.clone()),
            None => HostExecutor::new(),
        }
    }
}
