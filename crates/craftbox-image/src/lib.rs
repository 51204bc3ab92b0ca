//! Image compatibility negotiation for Craftbox environments.
//!
//! A provisioned instance carries a persisted compatibility marker at
//! `/etc/craft-image.conf`; this crate reads it alongside `/etc/os-release`
//! and decides whether an existing instance may be reused for the image the
//! caller expects. Incompatibility is a recoverable signal: the lifecycle
//! manager either auto-cleans the instance or propagates the error, it
//! never treats it as a crash.

pub mod buildd;
pub mod config;
pub mod os_release;

pub use buildd::{BuilddImage, ImageAlias, COMPATIBILITY_TAG};
pub use config::{load_craft_config, save_craft_config, CraftImageConfig, CRAFT_IMAGE_CONF_PATH};
pub use os_release::{read_os_release, OsRelease};

use craftbox_exec::ExecError;
use thiserror::Error;

/// The environment does not match the caller's image expectations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct CompatibilityError {
    pub reason: String,
}

impl CompatibilityError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Incompatible(#[from] CompatibilityError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}
