//! Environment backends and the instance lifecycle provider.
//!
//! Each backend drives an external CLI tool (`multipass` for VMs, `lxc`
//! for containers) or the host directly, exposing every environment
//! through the `Executor` contract plus the `Instance` lifecycle trait.
//! `InstanceProvider` sits on top: it finds or launches an instance,
//! waits for readiness, runs the image compatibility negotiation, and
//! auto-cleans incompatible instances when permitted.

pub mod config;
pub mod host;
pub mod instance;
pub mod locator;
pub mod lxd;
pub mod lxd_instance;
pub mod multipass;
pub mod multipass_instance;
pub mod provider;
pub mod state;

pub use config::InstanceConfig;
pub use host::{HostExecutor, HostProvider};
pub use instance::Instance;
pub use locator::{AllowInstall, BackendLocator, DenyInstall, InstallPolicy};
pub use lxd::Lxc;
pub use lxd_instance::LxdInstance;
pub use multipass::Multipass;
pub use multipass_instance::MultipassInstance;
pub use provider::{lxd_provider, multipass_provider, InstanceProvider};
pub use state::{validate_transition, InstanceState};

use craftbox_exec::ExecError;
use craftbox_image::{CompatibilityError, ImageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("backend command {command:?} failed: {details}")]
    Command {
        command: Vec<String>,
        details: String,
    },
    #[error("backend tool '{0}' is not installed")]
    BackendMissing(String),
    #[error("unsupported {tool} version '{version}', require at least {minimum}")]
    UnsupportedVersion {
        tool: String,
        version: String,
        minimum: String,
    },
    #[error("installation of '{tool}' failed: {details}")]
    InstallFailed { tool: String, details: String },
    #[error("unexpected backend output: {0}")]
    UnexpectedOutput(String),
    #[error("invalid instance state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("{0}")]
    Unsupported(String),
    #[error(transparent)]
    Incompatible(#[from] CompatibilityError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl From<ImageError> for ProviderError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Incompatible(e) => Self::Incompatible(e),
            ImageError::Exec(e) => Self::Exec(e),
        }
    }
}

/// Backend wrapper failures surfacing through `Executor` methods collapse
/// into the transport error kind; real exec failures pass through.
impl From<ProviderError> for ExecError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Exec(e) => e,
            other => ExecError::Transfer(other.to_string()),
        }
    }
}

/// A chown that exits non-zero means the executing identity may not grant
/// that ownership; report it as a permission failure against the final
/// destination rather than the staging path.
pub(crate) fn ownership_denied(
    err: ExecError,
    ownership: &craftbox_exec::FileOwnership,
    destination: &std::path::Path,
) -> ExecError {
    match err {
        ExecError::CommandFailed { .. } => ExecError::Permission(format!(
            "cannot set ownership {ownership} on {}",
            destination.display()
        )),
        other => other,
    }
}
