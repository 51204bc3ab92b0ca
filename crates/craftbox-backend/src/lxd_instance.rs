//! `Executor` and `Instance` over an LXD container.

use crate::instance::Instance;
use crate::lxd::Lxc;
use crate::{InstanceConfig, ProviderError};
use craftbox_exec::{
    run_command, spawn_streaming, sync, ExecError, ExecOptions, ExecOutput, Executor,
    FileOwnership,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use tracing::debug;

pub struct LxdInstance {
    name: String,
    lxc: Lxc,
}

impl LxdInstance {
    pub fn new(name: impl Into<String>, lxc: Lxc) -> Self {
        Self {
            name: name.into(),
            lxc,
        }
    }

    pub fn lxc(&self) -> &Lxc {
        &self.lxc
    }

    fn staging_path(destination: &Path) -> PathBuf {
        let munged = destination
            .to_string_lossy()
            .trim_start_matches('/')
            .replace('/', "-");
        PathBuf::from(format!("/tmp/craftbox-{munged}"))
    }
}

impl Executor for LxdInstance {
    fn create_file(
        &self,
        destination: &Path,
        content: &[u8],
        mode: &str,
        ownership: Option<&FileOwnership>,
    ) -> Result<(), ExecError> {
        let staging = Self::staging_path(destination);
        debug!(
            "creating {} via {}",
            destination.display(),
            staging.display()
        );

        self.lxc
            .file_push_stdin(content, &self.name, &staging, mode)?;

        let staging_str = staging.to_string_lossy().into_owned();
        if let Some(ownership) = ownership {
            self.execute(
                &[
                    "chown".to_owned(),
                    ownership.to_string(),
                    staging_str.clone(),
                ],
                &ExecOptions::checked_captured(),
            )
            .map_err(|err| crate::ownership_denied(err, ownership, destination))?;
        }
        self.execute(
            &[
                "mv".to_owned(),
                staging_str,
                destination.to_string_lossy().into_owned(),
            ],
            &ExecOptions::checked_captured(),
        )?;
        Ok(())
    }

    fn execute(&self, command: &[String], opts: &ExecOptions) -> Result<ExecOutput, ExecError> {
        let cmd = self.lxc.exec_command(&self.name, command, &opts.env);
        run_command(cmd, opts, command)
    }

    fn execute_streaming(
        &self,
        command: &[String],
        env: &BTreeMap<String, String>,
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<Child, ExecError> {
        let cmd = self.lxc.exec_command(&self.name, command, env);
        spawn_streaming(cmd, stdin, stdout)
    }

    fn sync_to(
        &self,
        source: &Path,
        destination: &Path,
        delete_existing: bool,
    ) -> Result<(), ExecError> {
        // Single files skip the tar pipe in favor of the native transfer.
        if source.is_file() {
            if let Some(parent) = destination.parent() {
                self.execute(
                    &[
                        "mkdir".to_owned(),
                        "-p".to_owned(),
                        parent.to_string_lossy().into_owned(),
                    ],
                    &ExecOptions::checked_captured(),
                )?;
            }
            self.lxc.file_push(source, &self.name, destination)?;
            return Ok(());
        }
        sync::sync_to(self, source, destination, delete_existing)
    }

    fn sync_from(
        &self,
        source: &Path,
        destination: &Path,
        delete_existing: bool,
    ) -> Result<(), ExecError> {
        if self.path_is_file(source)? {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.lxc.file_pull(&self.name, source, destination)?;
            return Ok(());
        }
        sync::sync_from(self, source, destination, delete_existing)
    }
}

impl Instance for LxdInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self) -> Result<bool, ProviderError> {
        Ok(self.lxc.info(&self.name)?.is_some())
    }

    fn is_running(&self) -> Result<bool, ProviderError> {
        Ok(self
            .lxc
            .info(&self.name)?
            .is_some_and(|c| c.status == "Running"))
    }

    fn launch(&self, config: &InstanceConfig) -> Result<(), ProviderError> {
        self.lxc.launch(
            &self.name,
            config.image.series(),
            config.cpus,
            config.mem_gb,
        )
    }

    fn start(&self) -> Result<(), ProviderError> {
        self.lxc.start(&self.name)
    }

    /// LXD has no deferred stop; a requested delay is noted and ignored.
    fn stop(&self, delay_mins: Option<u32>) -> Result<(), ProviderError> {
        if let Some(mins) = delay_mins {
            debug!(mins, "lxc stop has no deferred shutdown, stopping now");
        }
        self.lxc.stop(&self.name)
    }

    fn delete(&self, _purge: bool) -> Result<(), ProviderError> {
        // lxc delete always removes storage; purge is implicit.
        self.lxc.delete(&self.name)
    }
}
