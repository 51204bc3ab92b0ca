//! Bounded readiness polling for freshly started environments.
//!
//! Both pollers use fixed-interval retry with a maximum attempt count and
//! return normally on budget exhaustion with a warning: the caller's next
//! operation will surface the real failure with a more actionable error,
//! and double-reporting the same unreadiness is avoided.

use crate::executor::{argv, ExecOptions, Executor};
use crate::ExecError;
use std::thread::sleep;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_RETRY_COUNT: u32 = 120;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_NETWORK_PROBE_HOST: &str = "snapcraft.io";

/// Wait until name resolution works inside the environment, probing with
/// `getent hosts`. Succeeds on the first resolvable response.
pub fn wait_for_network_ready(
    executor: &dyn Executor,
    probe_host: &str,
    retry_count: u32,
    retry_interval: Duration,
) -> Result<(), ExecError> {
    info!("waiting for networking to be ready...");
    for _ in 0..retry_count {
        let out = executor.execute(
            &argv(&["getent", "hosts", probe_host]),
            &ExecOptions::captured(),
        )?;
        if out.success() {
            return Ok(());
        }
        sleep(retry_interval);
    }

    warn!("networking was not ready within the retry budget");
    Ok(())
}

/// Wait until `systemctl is-system-running` reports a usable system.
///
/// "running" and "degraded" both count as ready — degraded covers images
/// with a permanently failed cosmetic unit that does not affect build
/// usability, and systemctl exits non-zero for it, so readiness is decided
/// on the state string rather than the exit code. Any other reported state
/// is assumed transient and logged.
pub fn wait_for_system_ready(
    executor: &dyn Executor,
    retry_count: u32,
    retry_interval: Duration,
) -> Result<(), ExecError> {
    info!("waiting for environment to be ready...");
    for _ in 0..retry_count {
        let out = executor.execute(
            &argv(&["systemctl", "is-system-running"]),
            &ExecOptions::captured(),
        )?;

        let state = out.stdout_str().trim().to_owned();
        match state.as_str() {
            "running" | "degraded" => return Ok(()),
            "" => {}
            other => warn!("unexpected state for systemctl is-system-running: {other}"),
        }
        sleep(retry_interval);
    }

    warn!("environment exceeded timeout to get ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeExecutor;

    #[test]
    fn system_ready_on_running() {
        let fake = FakeExecutor::new();
        fake.set_system_state("running");

        wait_for_system_ready(&fake, 5, Duration::ZERO).unwrap();
        assert_eq!(fake.calls().len(), 1);
    }

    #[test]
    fn system_ready_accepts_degraded() {
        let fake = FakeExecutor::new();
        fake.set_system_state("degraded");

        wait_for_system_ready(&fake, 5, Duration::ZERO).unwrap();
        assert_eq!(fake.calls().len(), 1);
    }

    #[test]
    fn system_poll_exhausts_budget_without_error() {
        let fake = FakeExecutor::new();
        fake.set_system_state("starting");

        wait_for_system_ready(&fake, 7, Duration::ZERO).unwrap();
        assert_eq!(fake.calls().len(), 7, "one probe per configured attempt");
    }

    #[test]
    fn network_ready_on_first_resolution() {
        let fake = FakeExecutor::new();

        wait_for_network_ready(&fake, "snapcraft.io", 5, Duration::ZERO).unwrap();
        assert_eq!(fake.calls(), vec![argv(&["getent", "hosts", "snapcraft.io"])]);
    }

    #[test]
    fn network_poll_exhausts_budget_without_error() {
        let fake = FakeExecutor::new();
        fake.set_network_ready(false);

        wait_for_network_ready(&fake, "snapcraft.io", 4, Duration::ZERO).unwrap();
        assert_eq!(fake.calls().len(), 4);
    }
}
