//! Compatibility-checked instance lifecycle manager.

use crate::instance::Instance;
use crate::locator::{BackendLocator, InstallPolicy};
use crate::lxd_instance::LxdInstance;
use crate::multipass_instance::MultipassInstance;
use crate::state::{validate_transition, InstanceState};
use crate::{InstanceConfig, ProviderError};
use craftbox_exec::actions::{
    configure_apt, configure_hostname, configure_networkd, configure_resolved, configure_snapd,
};
use craftbox_exec::ready::{
    wait_for_network_ready, wait_for_system_ready, DEFAULT_NETWORK_PROBE_HOST,
    DEFAULT_RETRY_COUNT, DEFAULT_RETRY_INTERVAL,
};
use craftbox_image::{BuilddImage, ImageError};
use tracing::{debug, info, warn};

const NETWORK_INTERFACE: &str = "eth0";

/// Orchestrates one instance: find-or-launch, readiness wait,
/// compatibility negotiation with optional auto-clean, and teardown.
///
/// A failed `setup` leaves no ambiguous partial state: either a ready
/// executor is handed out, or the call fails and any instance present
/// stays present, unless auto-clean deleted it as part of its own flow.
pub struct InstanceProvider<I: Instance> {
    instance: I,
    image: BuilddImage,
    config: InstanceConfig,
    auto_clean: bool,
    stop_delay_mins: Option<u32>,
    state: InstanceState,
}

impl<I: Instance> InstanceProvider<I> {
    pub fn new(instance: I, image: BuilddImage, config: InstanceConfig) -> Self {
        Self {
            instance,
            image,
            config,
            auto_clean: true,
            stop_delay_mins: None,
            state: InstanceState::Absent,
        }
    }

    pub fn auto_clean(mut self, enabled: bool) -> Self {
        self.auto_clean = enabled;
        self
    }

    pub fn stop_delay_mins(mut self, delay_mins: Option<u32>) -> Self {
        self.stop_delay_mins = delay_mins;
        self
    }

    pub fn instance(&self) -> &I {
        &self.instance
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    fn transition(&mut self, to: InstanceState) -> Result<(), ProviderError> {
        validate_transition(self.state, to)?;
        debug!(from = %self.state, to = %to, "instance state");
        self.state = to;
        Ok(())
    }

    /// Provide a ready environment, reusing a compatible existing instance
    /// or launching a fresh one. Returns the executor bound to it.
    pub fn setup(&mut self) -> Result<&I, ProviderError> {
        if self.instance.exists()? {
            // Adopt the observed remote state before transitioning.
            self.state = if self.instance.is_running()? {
                InstanceState::Running
            } else {
                InstanceState::Stopped
            };
            if self.state == InstanceState::Stopped {
                info!("starting existing instance '{}'", self.instance.name());
                self.instance.start()?;
                self.transition(InstanceState::Running)?;
            }

            match self.image.check_compatible(&self.instance) {
                Ok(()) => {
                    debug!("reusing instance '{}'", self.instance.name());
                    return Ok(&self.instance);
                }
                Err(ImageError::Incompatible(err)) if self.auto_clean => {
                    warn!(
                        "instance '{}' is incompatible ({err}), replacing it",
                        self.instance.name()
                    );
                    self.instance.delete(true)?;
                    self.transition(InstanceState::Deleted)?;
                    // The replacement is a new lifecycle.
                    self.state = InstanceState::Absent;
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!("launching instance '{}'", self.instance.name());
        self.transition(InstanceState::Launching)?;
        self.instance.launch(&self.config)?;

        self.transition(InstanceState::Booting)?;
        wait_for_system_ready(&self.instance, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_INTERVAL)?;

        self.image.setup(&self.instance)?;
        configure_hostname(&self.instance, &self.config.name)?;
        configure_networkd(&self.instance, NETWORK_INTERFACE)?;
        configure_resolved(&self.instance)?;
        wait_for_network_ready(
            &self.instance,
            DEFAULT_NETWORK_PROBE_HOST,
            DEFAULT_RETRY_COUNT,
            DEFAULT_RETRY_INTERVAL,
        )?;
        // apt and snapd need working name resolution.
        configure_apt(&self.instance)?;
        configure_snapd(&self.instance)?;
        self.transition(InstanceState::Ready)?;
        self.transition(InstanceState::Running)?;

        Ok(&self.instance)
    }

    /// Stop the instance and, when `clean` is set, purge it. No-op for an
    /// absent instance; safe to call repeatedly.
    pub fn teardown(&mut self, clean: bool) -> Result<(), ProviderError> {
        if !self.instance.exists()? {
            debug!("teardown of absent instance '{}'", self.instance.name());
            self.state = InstanceState::Absent;
            return Ok(());
        }

        if self.instance.is_running()? {
            info!("stopping instance '{}'", self.instance.name());
            self.instance.stop(self.stop_delay_mins)?;
            self.state = InstanceState::Stopped;
        }

        if clean {
            info!("deleting instance '{}'", self.instance.name());
            self.instance.delete(true)?;
            // A later setup provisions a brand-new lifecycle.
            self.state = InstanceState::Absent;
        }
        Ok(())
    }
}

/// Provider over a multipass VM, resolving the backend binary up front.
pub fn multipass_provider(
    locator: &BackendLocator,
    policy: &dyn InstallPolicy,
    image: BuilddImage,
    config: InstanceConfig,
) -> Result<InstanceProvider<MultipassInstance>, ProviderError> {
    let multipass = locator.ensure_multipass(policy)?;
    let instance = MultipassInstance::new(config.name.clone(), multipass);
    Ok(InstanceProvider::new(instance, image, config))
}

/// Provider over an LXD container, resolving the backend binary up front.
pub fn lxd_provider(
    locator: &BackendLocator,
    policy: &dyn InstallPolicy,
    image: BuilddImage,
    config: InstanceConfig,
) -> Result<InstanceProvider<LxdInstance>, ProviderError> {
    let lxc = locator.ensure_lxc(policy)?;
    let instance = LxdInstance::new(config.name.clone(), lxc);
    Ok(InstanceProvider::new(instance, image, config))
}
