use crate::{InstanceConfig, ProviderError};
use craftbox_exec::Executor;
use std::path::Path;

/// A single addressable environment within a backend, with lifecycle
/// control layered on top of the `Executor` capability contract.
///
/// Callers must ensure the instance is running before issuing commands or
/// transfers through the `Executor` side of this trait.
pub trait Instance: Executor {
    fn name(&self) -> &str;

    fn exists(&self) -> Result<bool, ProviderError>;

    fn is_running(&self) -> Result<bool, ProviderError>;

    /// Create and boot the environment. Backend refusal (quota, bad image)
    /// is fatal and never retried at this layer.
    fn launch(&self, config: &InstanceConfig) -> Result<(), ProviderError>;

    fn start(&self) -> Result<(), ProviderError>;

    /// Stop the environment. `delay_mins` requests a deferred shutdown;
    /// backends without deferred stop ignore it.
    fn stop(&self, delay_mins: Option<u32>) -> Result<(), ProviderError>;

    /// Delete the environment, optionally purging its storage. Idempotent:
    /// deleting an absent instance is not an error.
    fn delete(&self, purge: bool) -> Result<(), ProviderError>;

    fn supports_mount(&self) -> bool {
        false
    }

    fn mount(&self, _host_source: &Path, _target: &Path) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "mounts are not supported by instance '{}'",
            self.name()
        )))
    }

    fn unmount(&self, _target: &Path) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "mounts are not supported by instance '{}'",
            self.name()
        )))
    }

    fn is_mounted(&self, _host_source: &Path, _target: &Path) -> Result<bool, ProviderError> {
        Ok(false)
    }
}
