//! OS service-control seam.
//!
//! The restart orchestrator drives the platform's service manager
//! through this trait; the concrete implementation (property-based
//! init control, `initctl` shelling, a test double) is injected by
//! the embedding application.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TetherError;

// ── States and actions ───────────────────────────────────────────

/// Observable state of a managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Control verb issued to the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceAction::Start => write!(f, "start"),
            ServiceAction::Stop => write!(f, "stop"),
            ServiceAction::Restart => write!(f, "restart"),
        }
    }
}

// ── Trait ────────────────────────────────────────────────────────

/// Side-effecting service manager operations.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Issue a control verb for `service`.
    async fn set_service_state(
        &self,
        service: &str,
        action: ServiceAction,
    ) -> Result<(), TetherError>;

    /// Poll until `service` reports `expected`, or fail with
    /// [`TetherError::Timeout`] once `timeout` elapses.
    async fn wait_for_service_state(
        &self,
        service: &str,
        expected: ServiceState,
        timeout: Duration,
    ) -> Result<(), TetherError>;
}

// ── Null implementation ──────────────────────────────────────────

/// No-op service control for links whose daemon is not supervised by
/// an init system (and for tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullServiceControl;

#[async_trait]
impl ServiceControl for NullServiceControl {
    async fn set_service_state(
        &self,
        _service: &str,
        _action: ServiceAction,
    ) -> Result<(), TetherError> {
        Ok(())
    }

    async fn wait_for_service_state(
        &self,
        _service: &str,
        _expected: ServiceState,
        _timeout: Duration,
    ) -> Result<(), TetherError> {
        Ok(())
    }
}
