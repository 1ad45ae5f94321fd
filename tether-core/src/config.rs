//! Link configuration.
//!
//! Sibling deployments of this protocol differ in socket paths,
//! timing constants and restart policy; all of those are plain fields
//! here so a variant is a config change, not a fork.

use std::path::PathBuf;
use std::time::Duration;

use crate::frame::FrameTag;
use crate::restart::RestartPolicy;

/// Configuration for a [`DeviceLink`](crate::link::DeviceLink).
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Control socket path (NUL-delimited JSON, both directions).
    pub control_socket: PathBuf,

    /// Data socket path (binary frame stream), if the daemon has one.
    pub data_socket: Option<PathBuf>,

    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,

    /// Capacity of the disconnected-time command buffer. When full,
    /// the oldest buffered command is dropped with a warning.
    pub command_buffer: usize,

    /// Watchdog check interval.
    pub watchdog_interval: Duration,

    /// Tags the watchdog requires within every interval. Empty means
    /// the watchdog never expires.
    pub required_tags: Vec<FrameTag>,

    /// Restart policy for the producing daemon.
    pub restart: RestartPolicy,
}

impl LinkConfig {
    /// Config with the pinned protocol-version defaults and no data
    /// socket.
    pub fn new(control_socket: impl Into<PathBuf>) -> Self {
        Self {
            control_socket: control_socket.into(),
            data_socket: None,
            reconnect_delay: Duration::from_secs(1),
            command_buffer: 32,
            watchdog_interval: Duration::from_secs(4),
            required_tags: Vec::new(),
            restart: RestartPolicy::default(),
        }
    }

    pub fn with_data_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_socket = Some(path.into());
        self
    }

    pub fn with_required_tags(mut self, tags: Vec<FrameTag>) -> Self {
        self.required_tags = tags;
        self
    }
}
