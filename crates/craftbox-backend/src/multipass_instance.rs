//! `Executor` and `Instance` over a multipass VM.

use crate::instance::Instance;
use crate::multipass::Multipass;
use crate::{InstanceConfig, ProviderError};
use craftbox_exec::{
    env_wrapped, run_command, spawn_streaming, sync, ExecError, ExecOptions, ExecOutput, Executor,
    FileOwnership,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use tracing::debug;

pub struct MultipassInstance {
    name: String,
    multipass: Multipass,
}

impl MultipassInstance {
    pub fn new(name: impl Into<String>, multipass: Multipass) -> Self {
        Self {
            name: name.into(),
            multipass,
        }
    }

    pub fn multipass(&self) -> &Multipass {
        &self.multipass
    }

    /// Remote argv as actually executed: multipass runs commands as the
    /// default unprivileged user, so everything goes through `sudo -H --`.
    fn remote_argv(&self, command: &[String], env: &BTreeMap<String, String>) -> Vec<String> {
        let mut full = vec!["sudo".to_owned(), "-H".to_owned(), "--".to_owned()];
        full.extend(env_wrapped(command, env));
        full
    }

    /// Collision-free staging path for an atomic file install.
    fn staging_path(destination: &Path) -> PathBuf {
        let munged = destination
            .to_string_lossy()
            .trim_start_matches('/')
            .replace('/', "-");
        PathBuf::from(format!("/tmp/craftbox-{munged}"))
    }
}

impl Executor for MultipassInstance {
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

        self.multipass
            .transfer_stdin(content, &self.name, &staging)?;

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
            &["chmod".to_owned(), mode.to_owned(), staging_str.clone()],
            &ExecOptions::checked_captured(),
        )?;
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
        let remote = self.remote_argv(command, &opts.env);
        let cmd = self.multipass.exec_command(&self.name, &remote);
        run_command(cmd, opts, command)
    }

    fn execute_streaming(
        &self,
        command: &[String],
        env: &BTreeMap<String, String>,
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<Child, ExecError> {
        let remote = self.remote_argv(command, env);
        let cmd = self.multipass.exec_command(&self.name, &remote);
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
            self.multipass.transfer_in(source, &self.name, destination)?;
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
            self.multipass.transfer_out(&self.name, source, destination)?;
            return Ok(());
        }
        sync::sync_from(self, source, destination, delete_existing)
    }
}

impl Instance for MultipassInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self) -> Result<bool, ProviderError> {
        Ok(self.multipass.info(&self.name)?.is_some())
    }

    fn is_running(&self) -> Result<bool, ProviderError> {
        Ok(self
            .multipass
            .info(&self.name)?
            .is_some_and(|vm| vm.state == "Running"))
    }

    fn launch(&self, config: &InstanceConfig) -> Result<(), ProviderError> {
        self.multipass.launch(
            &self.name,
            config.image.series(),
            config.cpus,
            config.mem_gb,
            config.disk_gb,
        )
    }

    fn start(&self) -> Result<(), ProviderError> {
        self.multipass.start(&self.name)
    }

    fn stop(&self, delay_mins: Option<u32>) -> Result<(), ProviderError> {
        self.multipass.stop(&self.name, delay_mins)
    }

    fn delete(&self, purge: bool) -> Result<(), ProviderError> {
        self.multipass.delete(&self.name, purge)
    }

    fn supports_mount(&self) -> bool {
        true
    }

    fn mount(&self, host_source: &Path, target: &Path) -> Result<(), ProviderError> {
        if self.is_mounted(host_source, target)? {
            return Ok(());
        }
        self.multipass.mount(host_source, &self.name, target)
    }

    fn unmount(&self, target: &Path) -> Result<(), ProviderError> {
        self.multipass.umount(&self.name, target)
    }

    fn is_mounted(&self, host_source: &Path, target: &Path) -> Result<bool, ProviderError> {
        let Some(vm) = self.multipass.info(&self.name)? else {
            return Ok(false);
        };
        let target = target.to_string_lossy().into_owned();
        Ok(vm
            .mounts
            .get(&target)
            .is_some_and(|m| Path::new(&m.source_path) == host_source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_path_is_flat_under_tmp() {
        assert_eq!(
            MultipassInstance::staging_path(Path::new("/etc/craft-image.conf")),
            PathBuf::from("/tmp/craftbox-etc-craft-image.conf")
        );
        assert_eq!(
            MultipassInstance::staging_path(Path::new("/etc/systemd/network/10-eth0.network")),
            PathBuf::from("/tmp/craftbox-etc-systemd-network-10-eth0.network")
        );
    }

    #[test]
    fn remote_argv_carries_sudo_and_env() {
        let instance = MultipassInstance::new("builder", Multipass::new("multipass"));
        let mut env = BTreeMap::new();
        env.insert("LANG".to_owned(), "C.UTF-8".to_owned());

        let remote = instance.remote_argv(&["apt-get".to_owned(), "update".to_owned()], &env);
        assert_eq!(
            remote,
            vec!["sudo", "-H", "--", "env", "LANG=C.UTF-8", "apt-get", "update"]
        );
    }
}
