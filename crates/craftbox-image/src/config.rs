//! Persisted compatibility marker at `/etc/craft-image.conf`.

use crate::CompatibilityError;
use craftbox_exec::{argv, ExecError, ExecOptions, Executor, FileOwnership};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const CRAFT_IMAGE_CONF_PATH: &str = "/etc/craft-image.conf";

/// Key-value record written once at image-build or image-setup time.
/// `compatibility_tag` is the sole authority for whether a
/// previously-provisioned instance may be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftImageConfig {
    pub compatibility_tag: String,
}

impl CraftImageConfig {
    pub fn new(compatibility_tag: impl Into<String>) -> Self {
        Self {
            compatibility_tag: compatibility_tag.into(),
        }
    }
}

/// Read the marker from the environment. Absence, an unreadable file, and
/// unparseable content all mean "never configured" and yield `None` rather
/// than an error; only transport failures propagate.
pub fn load_craft_config(executor: &dyn Executor) -> Result<Option<CraftImageConfig>, ExecError> {
    let out = executor.execute(
        &argv(&["cat", CRAFT_IMAGE_CONF_PATH]),
        &ExecOptions::captured(),
    )?;
    if !out.success() {
        return Ok(None);
    }

    match serde_yaml::from_slice(&out.stdout) {
        Ok(config) => Ok(Some(config)),
        Err(err) => {
            debug!("unparseable {CRAFT_IMAGE_CONF_PATH}: {err}");
            Ok(None)
        }
    }
}

/// Write the marker, mode 0644, owned by root.
pub fn save_craft_config(
    executor: &dyn Executor,
    config: &CraftImageConfig,
) -> Result<(), ExecError> {
    let content = serde_yaml::to_string(config)
        .map_err(|err| ExecError::Transfer(format!("failed to serialize craft config: {err}")))?;
    executor.create_file(
        Path::new(CRAFT_IMAGE_CONF_PATH),
        content.as_bytes(),
        "0644",
        Some(&FileOwnership::root()),
    )
}

impl CraftImageConfig {
    /// Compare against an expected tag, producing the negotiation error on
    /// mismatch. Tags are opaque version strings compared for equality.
    pub fn ensure_tag(&self, expected: &str) -> Result<(), CompatibilityError> {
        if self.compatibility_tag == expected {
            Ok(())
        } else {
            Err(CompatibilityError::new(format!(
                "Expected image compatibility tag '{expected}', found '{}'",
                self.compatibility_tag
            )))
        }
    }
}
