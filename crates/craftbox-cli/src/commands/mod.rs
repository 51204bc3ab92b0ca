pub mod pull;
pub mod push;
pub mod run;
pub mod setup;
pub mod status;
pub mod teardown;

use craftbox_backend::{
    Instance, InstanceProvider, LxdInstance, MultipassInstance, ProviderError,
};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INCOMPATIBLE: u8 = 2;
pub const EXIT_BACKEND_ERROR: u8 = 3;

/// Provider over whichever backend the user selected, exposed uniformly
/// to the command implementations.
pub enum AnyProvider {
    Multipass(InstanceProvider<MultipassInstance>),
    Lxd(InstanceProvider<LxdInstance>),
}

impl AnyProvider {
    pub fn setup(&mut self) -> Result<&dyn Instance, ProviderError> {
        match self {
            Self::Multipass(p) => p.setup().map(|i| i as &dyn Instance),
            Self::Lxd(p) => p.setup().map(|i| i as &dyn Instance),
        }
    }

    pub fn teardown(&mut self, clean: bool) -> Result<(), ProviderError> {
        match self {
            Self::Multipass(p) => p.teardown(clean),
            Self::Lxd(p) => p.teardown(clean),
        }
    }

    pub fn instance(&self) -> &dyn Instance {
        match self {
            Self::Multipass(p) => p.instance(),
            Self::Lxd(p) => p.instance(),
        }
    }
}

pub fn exit_code_for(err: &ProviderError) -> u8 {
    match err {
        ProviderError::Incompatible(_) => EXIT_INCOMPATIBLE,
        ProviderError::BackendMissing(_)
        | ProviderError::UnsupportedVersion { .. }
        | ProviderError::InstallFailed { .. } => EXIT_BACKEND_ERROR,
        _ => EXIT_FAILURE,
    }
}

/// Print a provider failure and pick the matching exit code.
pub fn report(err: &ProviderError) -> u8 {
    eprintln!("error: {err}");
    exit_code_for(err)
}
