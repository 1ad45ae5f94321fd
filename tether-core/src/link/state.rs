//! Link lifecycle state machine.
//!
//! Owned exclusively by the [`DeviceLink`](crate::link::DeviceLink)
//! supervisor; validated transitions return `Result` instead of
//! panicking.
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected ──► Restarting
//!       ▲               │              │              │
//!       └───────────────┴──────────────┴──────────────┘
//! ```

use std::time::Instant;

use crate::error::TetherError;

/// The current phase of the daemon link.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No active connection. Initial state and reconnect-wait state.
    #[default]
    Disconnected,

    /// Socket connection attempt in progress.
    Connecting,

    /// Both sockets are up; commands flow immediately.
    Connected {
        /// When the link entered the `Connected` state.
        since: Instant,
    },

    /// Supervised restart of the producing daemon in progress.
    Restarting,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected { .. } => write!(f, "connected"),
            Self::Restarting => write!(f, "restarting"),
        }
    }
}

impl LinkState {
    /// Returns `true` when commands may be sent immediately.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    pub fn is_restarting(&self) -> bool {
        matches!(self, Self::Restarting)
    }

    /// How long the link has been in the `Connected` state.
    ///
    /// Returns `None` for any other phase.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), TetherError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(TetherError::InvalidTransition(
                "cannot connect: not in disconnected state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), TetherError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(TetherError::InvalidTransition(
                "cannot complete connect: not in connecting state",
            )),
        }
    }

    /// Transition to `Restarting`.
    ///
    /// Valid from: `Connected` (fatal framing error or watchdog
    /// expiry always arrives on a live link).
    pub fn begin_restart(&mut self) -> Result<(), TetherError> {
        match self {
            Self::Connected { .. } => {
                *self = Self::Restarting;
                Ok(())
            }
            _ => Err(TetherError::InvalidTransition(
                "cannot restart: not in connected state",
            )),
        }
    }

    /// Transition to `Disconnected` after the restart sequence.
    ///
    /// Valid from: `Restarting`.
    pub fn finish_restart(&mut self) -> Result<(), TetherError> {
        match self {
            Self::Restarting => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(TetherError::InvalidTransition(
                "cannot finish restart: not in restarting state",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    ///
    /// Used for socket error / unexpected close, where the previous
    /// state no longer matters.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────
