//! Shell-backed service control.
//!
//! Drives the platform init system through its control program
//! (`initctl <verb> <service>`), with status polling for the
//! wait-for-state half of the contract.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command as Process;
use tracing::debug;

use tether_core::{ServiceAction, ServiceControl, ServiceState, TetherError};

/// `ServiceControl` implementation that shells out to an init
/// control program.
#[derive(Debug, Clone)]
pub struct InitctlServiceControl {
    program: String,
}

impl InitctlServiceControl {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn verb(action: ServiceAction) -> &'static str {
        match action {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }

    /// Upstart-style status goal/state marker for the expected state.
    fn state_marker(expected: ServiceState) -> &'static str {
        match expected {
            ServiceState::Running => "start/running",
            ServiceState::Stopped => "stop/waiting",
        }
    }
}

#[async_trait]
impl ServiceControl for InitctlServiceControl {
    async fn set_service_state(
        &self,
        service: &str,
        action: ServiceAction,
    ) -> Result<(), TetherError> {
        let verb = Self::verb(action);
        debug!(program = %self.program, verb, service, "issuing service command");

        let status = Process::new(&self.program)
            .arg(verb)
            .arg(service)
            .status()
            .await
            .map_err(|e| TetherError::Service(format!("{} {verb} {service}: {e}", self.program)))?;

        if !status.success() {
            return Err(TetherError::Service(format!(
                "{} {verb} {service} exited with {status}",
                self.program
            )));
        }
        Ok(())
    }

    async fn wait_for_service_state(
        &self,
        service: &str,
        expected: ServiceState,
        timeout: Duration,
    ) -> Result<(), TetherError> {
        let marker = Self::state_marker(expected);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let output = Process::new(&self.program)
                .arg("status")
                .arg(service)
                .output()
                .await
                .map_err(|e| {
                    TetherError::Service(format!("{} status {service}: {e}", self.program))
                })?;

            let text = String::from_utf8_lossy(&output.stdout);
            if text.contains(marker) {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(TetherError::Timeout(timeout));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_is_ok() {
        // `true` ignores its arguments and exits 0.
        let ctl = InitctlServiceControl::new("true");
        ctl.set_service_state("visiond", ServiceAction::Start)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let ctl = InitctlServiceControl::new("false");
        let err = ctl
            .set_service_state("visiond", ServiceAction::Stop)
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Service(_)));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let ctl = InitctlServiceControl::new("/nonexistent/initctl");
        let err = ctl
            .set_service_state("visiond", ServiceAction::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Service(_)));
    }

    #[tokio::test]
    async fn wait_times_out_when_marker_never_appears() {
        // `echo status visiond` never prints an upstart state marker.
        let ctl = InitctlServiceControl::new("echo");
        let err = ctl
            .wait_for_service_state("visiond", ServiceState::Running, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Timeout(_)));
    }
}
