//! Supervised restart of the producing daemon.
//!
//! A fatal framing error or watchdog expiry means the daemon itself
//! is wedged; reconnecting the sockets is not enough. The
//! orchestrator cycles the daemon through the platform service
//! manager with bounded waits, so a single hung step can never block
//! the link forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::service::{ServiceAction, ServiceControl, ServiceState};

// ── Policy ───────────────────────────────────────────────────────

/// Restart behaviour knobs.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Service name to stop/start, or `None` to skip service cycling
    /// entirely (socket teardown + reconnect only).
    pub service: Option<String>,
    /// Per-step ceiling: each stop/wait/start/wait races this.
    pub step_timeout: Duration,
    /// Overall ceiling for the whole sequence; when it elapses the
    /// orchestrator abandons the remaining steps and lets the link
    /// reinitialize anyway.
    pub overall_deadline: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            service: None,
            step_timeout: Duration::from_secs(5),
            overall_deadline: Duration::from_secs(30),
        }
    }
}

// ── Orchestrator ─────────────────────────────────────────────────

/// Serializes daemon teardown and restart.
///
/// At most one restart is in flight at a time; triggers that arrive
/// while one is running are logged and ignored, never queued. The
/// in-flight flag stays set until the link reconnects successfully
/// and calls [`complete`](Self::complete).
pub struct RestartOrchestrator {
    policy: RestartPolicy,
    control: Arc<dyn ServiceControl>,
    in_flight: bool,
}

impl std::fmt::Debug for RestartOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartOrchestrator")
            .field("policy", &self.policy)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl RestartOrchestrator {
    pub fn new(policy: RestartPolicy, control: Arc<dyn ServiceControl>) -> Self {
        Self {
            policy,
            control,
            in_flight: false,
        }
    }

    /// Claim the in-flight slot.
    ///
    /// Returns `false` (and logs the ignored trigger) when a restart
    /// is already running.
    pub fn begin(&mut self, reason: &str) -> bool {
        if self.in_flight {
            info!(reason, "restart already in flight, ignoring trigger");
            return false;
        }
        warn!(reason, "beginning supervised restart");
        self.in_flight = true;
        true
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Mark the restart finished. Called by the link on the first
    /// successful reconnect after the cycle.
    pub fn complete(&mut self) {
        if self.in_flight {
            info!("restart complete");
        }
        self.in_flight = false;
    }

    /// Stop and start the daemon's service with bounded waits.
    ///
    /// Never fails: every step error is logged and the sequence
    /// proceeds. Liveness wins over strict sequencing; the link
    /// reconnects to whatever is listening afterwards.
    pub async fn cycle_service(&self) {
        let Some(service) = self.policy.service.as_deref() else {
            return;
        };

        let sequence = self.run_sequence(service);
        if timeout(self.policy.overall_deadline, sequence).await.is_err() {
            warn!(
                service,
                deadline_ms = self.policy.overall_deadline.as_millis() as u64,
                "restart deadline elapsed, reinitializing anyway"
            );
        }
    }

    async fn run_sequence(&self, service: &str) {
        self.step_set(service, ServiceAction::Stop).await;
        self.step_wait(service, ServiceState::Stopped).await;
        self.step_set(service, ServiceAction::Start).await;
        self.step_wait(service, ServiceState::Running).await;
    }

    async fn step_set(&self, service: &str, action: ServiceAction) {
        let step = self.control.set_service_state(service, action);
        match timeout(self.policy.step_timeout, step).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(service, %action, error = %e, "service control step failed"),
            Err(_) => warn!(service, %action, "service control step timed out"),
        }
    }

    async fn step_wait(&self, service: &str, expected: ServiceState) {
        let step = self
            .control
            .wait_for_service_state(service, expected, self.policy.step_timeout);
        // wait_for_service_state owns its own deadline; the outer
        // timeout guards implementations that ignore it.
        match timeout(self.policy.step_timeout * 2, step).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(service, %expected, error = %e, "service state wait failed"),
            Err(_) => warn!(service, %expected, "service state wait timed out"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
