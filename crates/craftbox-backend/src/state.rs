//! Instance lifecycle state machine.

use crate::ProviderError;

/// Lifecycle of one provisioned environment. `Deleted` is reachable from
/// any state via forced delete; a clean teardown goes through `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Absent,
    Launching,
    Booting,
    Ready,
    Running,
    Stopped,
    Deleted,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Launching => "launching",
            Self::Booting => "booting",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

pub fn validate_transition(from: InstanceState, to: InstanceState) -> Result<(), ProviderError> {
    let valid = from == to
        || matches!(
            (from, to),
            (InstanceState::Absent, InstanceState::Launching)
                | (InstanceState::Launching, InstanceState::Booting)
                | (InstanceState::Booting, InstanceState::Ready)
                | (
                    InstanceState::Ready,
                    InstanceState::Running | InstanceState::Stopped
                )
                | (InstanceState::Running, InstanceState::Stopped)
                | (InstanceState::Stopped, InstanceState::Running)
                | (_, InstanceState::Deleted)
        );

    if valid {
        Ok(())
    } else {
        Err(ProviderError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(InstanceState::Absent, InstanceState::Launching).is_ok());
        assert!(validate_transition(InstanceState::Launching, InstanceState::Booting).is_ok());
        assert!(validate_transition(InstanceState::Booting, InstanceState::Ready).is_ok());
        assert!(validate_transition(InstanceState::Ready, InstanceState::Running).is_ok());
        assert!(validate_transition(InstanceState::Ready, InstanceState::Stopped).is_ok());
        assert!(validate_transition(InstanceState::Running, InstanceState::Stopped).is_ok());
        assert!(validate_transition(InstanceState::Stopped, InstanceState::Running).is_ok());
        assert!(validate_transition(InstanceState::Stopped, InstanceState::Deleted).is_ok());
        // same-state is idempotent
        assert!(validate_transition(InstanceState::Running, InstanceState::Running).is_ok());
    }

    #[test]
    fn forced_delete_from_any_state() {
        for from in [
            InstanceState::Absent,
            InstanceState::Launching,
            InstanceState::Booting,
            InstanceState::Ready,
            InstanceState::Running,
        ] {
            assert!(validate_transition(from, InstanceState::Deleted).is_ok());
        }
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(InstanceState::Absent, InstanceState::Running).is_err());
        assert!(validate_transition(InstanceState::Launching, InstanceState::Running).is_err());
        assert!(validate_transition(InstanceState::Stopped, InstanceState::Booting).is_err());
        assert!(validate_transition(InstanceState::Deleted, InstanceState::Running).is_err());
        assert!(validate_transition(InstanceState::Running, InstanceState::Launching).is_err());
    }
}
