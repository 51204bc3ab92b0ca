//! Environment bring-up actions for systemd-based images.

use crate::executor::{argv, ExecOptions, Executor, FileOwnership};
use crate::ExecError;
use std::path::{Path, PathBuf};

/// Install `/etc/hostname`.
pub fn configure_hostname(executor: &dyn Executor, hostname: &str) -> Result<(), ExecError> {
    executor.create_file(
        Path::new("/etc/hostname"),
        format!("{hostname}\n").as_bytes(),
        "0644",
        Some(&FileOwnership::root()),
    )
}

/// Install an ipv4 DHCP network unit for `interface` and (re)start
/// systemd-networkd.
pub fn configure_networkd(executor: &dyn Executor, interface: &str) -> Result<(), ExecError> {
    let unit = format!(
        "[Match]\n\
         Name={interface}\n\
         \n\
         [Network]\n\
         DHCP=ipv4\n\
         LinkLocalAddressing=ipv6\n\
         \n\
         [DHCP]\n\
         RouteMetric=100\n\
         UseMTU=true\n"
    );

    executor.create_file(
        &PathBuf::from(format!("/etc/systemd/network/10-{interface}.network")),
        unit.as_bytes(),
        "0644",
        Some(&FileOwnership::root()),
    )?;

    executor.execute(
        &argv(&["systemctl", "enable", "systemd-networkd"]),
        &ExecOptions::checked_captured(),
    )?;
    executor.execute(
        &argv(&["systemctl", "restart", "systemd-networkd"]),
        &ExecOptions::checked_captured(),
    )?;
    Ok(())
}

/// Refresh the apt package index and install apt-utils.
pub fn configure_apt(executor: &dyn Executor) -> Result<(), ExecError> {
    let opts = ExecOptions::checked_captured().with_env("DEBIAN_FRONTEND", "noninteractive");
    executor.execute(&argv(&["apt-get", "update"]), &opts)?;
    executor.execute(&argv(&["apt-get", "install", "-y", "apt-utils"]), &opts)?;
    Ok(())
}

/// Install and start snapd, then block until the snap system is seeded.
///
/// udev has to be up before snapd for device cgroup setup inside
/// containers.
pub fn configure_snapd(executor: &dyn Executor) -> Result<(), ExecError> {
    let opts = ExecOptions::checked_captured().with_env("DEBIAN_FRONTEND", "noninteractive");
    executor.execute(&argv(&["apt-get", "install", "-y", "fuse", "udev"]), &opts)?;
    executor.execute(
        &argv(&["systemctl", "start", "systemd-udevd"]),
        &ExecOptions::checked_captured(),
    )?;
    executor.execute(&argv(&["apt-get", "install", "-y", "snapd"]), &opts)?;
    executor.execute(
        &argv(&["systemctl", "start", "snapd.socket"]),
        &ExecOptions::checked_captured(),
    )?;
    executor.execute(
        &argv(&["systemctl", "restart", "snapd.service"]),
        &ExecOptions::checked_captured(),
    )?;
    executor.execute(
        &argv(&["snap", "wait", "system", "seed.loaded"]),
        &ExecOptions::checked_captured(),
    )?;
    Ok(())
}

/// Point `/etc/resolv.conf` at systemd-resolved and (re)start it.
pub fn configure_resolved(executor: &dyn Executor) -> Result<(), ExecError> {
    executor.execute(
        &argv(&[
            "ln",
            "-sf",
            "/run/systemd/resolve/resolv.conf",
            "/etc/resolv.conf",
        ]),
        &ExecOptions::checked_captured(),
    )?;
    executor.execute(
        &argv(&["systemctl", "enable", "systemd-resolved"]),
        &ExecOptions::checked_captured(),
    )?;
    executor.execute(
        &argv(&["systemctl", "restart", "systemd-resolved"]),
        &ExecOptions::checked_captured(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeExecutor;

    #[test]
    fn hostname_written_with_trailing_newline() {
        let fake = FakeExecutor::new();
        configure_hostname(&fake, "craftbox-builder").unwrap();

        let file = fake.file(Path::new("/etc/hostname")).unwrap();
        assert_eq!(file.content, b"craftbox-builder\n");
        assert_eq!(file.mode, "0644");
        assert_eq!(file.ownership, Some(FileOwnership::root()));
    }

    #[test]
    fn networkd_unit_and_restart() {
        let fake = FakeExecutor::new();
        configure_networkd(&fake, "eth0").unwrap();

        let file = fake
            .file(Path::new("/etc/systemd/network/10-eth0.network"))
            .unwrap();
        let unit = String::from_utf8(file.content).unwrap();
        assert!(unit.contains("Name=eth0"));
        assert!(unit.contains("DHCP=ipv4"));

        let calls = fake.calls();
        assert!(calls.contains(&argv(&["systemctl", "enable", "systemd-networkd"])));
        assert!(calls.contains(&argv(&["systemctl", "restart", "systemd-networkd"])));
    }

    #[test]
    fn apt_updates_index_before_installing_utils() {
        let fake = FakeExecutor::new();
        configure_apt(&fake).unwrap();

        let calls = fake.calls();
        assert_eq!(calls[0], argv(&["apt-get", "update"]));
        assert_eq!(calls[1], argv(&["apt-get", "install", "-y", "apt-utils"]));
    }

    #[test]
    fn snapd_installed_started_and_seed_awaited() {
        let fake = FakeExecutor::new();
        configure_snapd(&fake).unwrap();

        let calls = fake.calls();
        assert_eq!(calls[0], argv(&["apt-get", "install", "-y", "fuse", "udev"]));
        assert_eq!(calls[1], argv(&["systemctl", "start", "systemd-udevd"]));
        assert!(calls.contains(&argv(&["systemctl", "start", "snapd.socket"])));
        assert!(calls.contains(&argv(&["systemctl", "restart", "snapd.service"])));
        assert_eq!(
            calls.last().unwrap(),
            &argv(&["snap", "wait", "system", "seed.loaded"]),
            "seeding is awaited after snapd is up"
        );
    }

    #[test]
    fn resolved_symlinks_resolv_conf() {
        let fake = FakeExecutor::new();
        configure_resolved(&fake).unwrap();

        let calls = fake.calls();
        assert_eq!(
            calls[0],
            argv(&[
                "ln",
                "-sf",
                "/run/systemd/resolve/resolv.conf",
                "/etc/resolv.conf"
            ])
        );
    }
}
