//! Backend binary resolution and install policy.
//!
//! The locator is resolved once at provider construction and passed down;
//! nothing reassigns tool paths after that. Installation of a missing
//! backend is gated by a caller-injected policy, never by an interactive
//! prompt inside this crate.

use crate::lxd::Lxc;
use crate::multipass::Multipass;
use crate::ProviderError;
use craftbox_exec::ExecError;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

/// Snap-installed tools are not always on PATH.
const SNAP_BIN: &str = "/snap/bin";

/// Decides whether installing a missing backend tool is permitted.
pub trait InstallPolicy {
    fn install_permitted(&self, tool: &str) -> bool;
}

/// Default policy: never install.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyInstall;

impl InstallPolicy for DenyInstall {
    fn install_permitted(&self, _tool: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowInstall;

impl InstallPolicy for AllowInstall {
    fn install_permitted(&self, _tool: &str) -> bool {
        true
    }
}

/// Locates backend binaries on the search path, with the snap bin
/// directory as a fixed fallback.
#[derive(Debug, Clone)]
pub struct BackendLocator {
    search_paths: Vec<PathBuf>,
}

impl BackendLocator {
    pub fn from_env() -> Self {
        let mut search_paths: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        search_paths.push(PathBuf::from(SNAP_BIN));
        Self { search_paths }
    }

    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn locate(&self, tool: &str) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .map(|dir| dir.join(tool))
            .find(|candidate| candidate.is_file())
    }

    /// Resolve a working `multipass`, installing it via snap when the
    /// policy permits, and reject unsupported versions.
    pub fn ensure_multipass(&self, policy: &dyn InstallPolicy) -> Result<Multipass, ProviderError> {
        if let Some(path) = self.locate("multipass") {
            debug!("using multipass at {}", path.display());
            let multipass = Multipass::new(path);
            multipass.ensure_supported_version()?;
            return Ok(multipass);
        }

        if !policy.install_permitted("multipass") {
            return Err(ProviderError::BackendMissing("multipass".to_owned()));
        }
        snap_install("multipass")?;

        let path = self
            .locate("multipass")
            .ok_or_else(|| ProviderError::InstallFailed {
                tool: "multipass".to_owned(),
                details: "binary not found after install".to_owned(),
            })?;
        let multipass = Multipass::new(path);
        multipass.ensure_supported_version()?;
        Ok(multipass)
    }

    /// Resolve a working `lxc`, installing LXD via snap when the policy
    /// permits.
    pub fn ensure_lxc(&self, policy: &dyn InstallPolicy) -> Result<Lxc, ProviderError> {
        if let Some(path) = self.locate("lxc") {
            debug!("using lxc at {}", path.display());
            return Ok(Lxc::new(path));
        }

        if !policy.install_permitted("lxd") {
            return Err(ProviderError::BackendMissing("lxc".to_owned()));
        }
        snap_install("lxd")?;

        self.locate("lxc")
            .map(Lxc::new)
            .ok_or_else(|| ProviderError::InstallFailed {
                tool: "lxd".to_owned(),
                details: "lxc binary not found after install".to_owned(),
            })
    }
}

fn snap_install(snap: &str) -> Result<(), ProviderError> {
    info!("installing {snap} via snap...");
    let output = Command::new("sudo")
        .args(["snap", "install", snap])
        .output()
        .map_err(ExecError::from)?;
    if !output.status.success() {
        return Err(ProviderError::InstallFailed {
            tool: snap.to_owned(),
            details: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_finds_tool_on_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("sometool");
        std::fs::write(&tool, b"#!/bin/sh\n").unwrap();

        let locator = BackendLocator::with_search_paths(vec![dir.path().to_path_buf()]);
        assert_eq!(locator.locate("sometool"), Some(tool));
    }

    #[test]
    fn locate_respects_search_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let winner = first.path().join("sometool");
        std::fs::write(&winner, b"#!/bin/sh\n").unwrap();
        std::fs::write(second.path().join("sometool"), b"#!/bin/sh\n").unwrap();

        let locator = BackendLocator::with_search_paths(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        assert_eq!(locator.locate("sometool"), Some(winner));
    }

    #[test]
    fn missing_multipass_with_deny_policy() {
        let locator = BackendLocator::with_search_paths(Vec::new());
        let err = locator.ensure_multipass(&DenyInstall).unwrap_err();
        assert!(matches!(err, ProviderError::BackendMissing(tool) if tool == "multipass"));
    }

    #[test]
    fn missing_lxc_with_deny_policy() {
        let locator = BackendLocator::with_search_paths(Vec::new());
        let err = locator.ensure_lxc(&DenyInstall).unwrap_err();
        assert!(matches!(err, ProviderError::BackendMissing(tool) if tool == "lxc"));
    }
}
