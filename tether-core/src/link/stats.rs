//! Link traffic counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters updated by the link and read through
/// [`LinkHandle::stats`](crate::link::LinkHandle::stats).
#[derive(Debug, Default)]
pub struct LinkStats {
    pub(crate) connects: AtomicU64,
    pub(crate) restarts: AtomicU64,
    pub(crate) frames: AtomicU64,
    pub(crate) frame_bytes: AtomicU64,
    pub(crate) events: AtomicU64,
    pub(crate) commands_sent: AtomicU64,
    pub(crate) commands_dropped: AtomicU64,
}

impl LinkStats {
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            frame_bytes: self.frame_bytes.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatsSnapshot {
    /// Successful connects, including the first one.
    pub connects: u64,
    /// Completed supervised restarts.
    pub restarts: u64,
    /// Frames received on the data socket or from capture.
    pub frames: u64,
    /// Total payload bytes across received frames.
    pub frame_bytes: u64,
    /// Events received on the control socket.
    pub events: u64,
    /// Commands written to the control socket.
    pub commands_sent: u64,
    /// Commands dropped by the disconnected-time policy.
    pub commands_dropped: u64,
}
