//! Tag-liveness watchdog.
//!
//! Detects a wedged capture daemon behind a healthy socket: the
//! connection can be up while no frames flow. Each required tag
//! carries an independent "seen since last check" flag; the link
//! pulses the flag on every received frame and calls [`check`] on a
//! fixed interval.
//!
//! [`check`]: Watchdog::check

use std::time::Duration;

use crate::frame::FrameTag;

/// Result of a periodic liveness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// Watchdog not armed; nothing to verify.
    Idle,
    /// Every required tag was observed; flags reset for the next
    /// window.
    Healthy,
    /// At least one required tag was not observed within the window.
    Expired { missing: Vec<FrameTag> },
}

/// Heartbeat-style fault detector over the frame stream.
#[derive(Debug)]
pub struct Watchdog {
    interval: Duration,
    required: Vec<FrameTag>,
    seen: Vec<bool>,
    armed: bool,
}

impl Watchdog {
    pub fn new(interval: Duration, required: Vec<FrameTag>) -> Self {
        let seen = vec![false; required.len()];
        Self {
            interval,
            required,
            seen,
            armed: false,
        }
    }

    /// Start a fresh observation window. Called on successful connect.
    pub fn arm(&mut self) {
        self.armed = true;
        self.seen.fill(false);
    }

    /// Stop watching. Called on disconnect and at the start of a
    /// restart, so a teardown in progress cannot expire.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Record that a frame with `tag` was observed. Tags that are not
    /// required are ignored.
    pub fn pulse(&mut self, tag: FrameTag) {
        if !self.armed {
            return;
        }
        if let Some(idx) = self.required.iter().position(|t| *t == tag) {
            self.seen[idx] = true;
        }
    }

    /// Evaluate the window that just elapsed.
    ///
    /// Healthy checks reset the flags so the next window starts
    /// clean; an expired check leaves state untouched (the link tears
    /// the connection down anyway).
    pub fn check(&mut self) -> WatchdogVerdict {
        if !self.armed || self.required.is_empty() {
            return WatchdogVerdict::Idle;
        }

        let missing: Vec<FrameTag> = self
            .required
            .iter()
            .zip(&self.seen)
            .filter(|(_, seen)| !**seen)
            .map(|(tag, _)| *tag)
            .collect();

        if missing.is_empty() {
            self.seen.fill(false);
            WatchdogVerdict::Healthy
        } else {
            WatchdogVerdict::Expired { missing }
        }
    }

    /// Interval ticker aligned so the first check fires one full
    /// window after arming, never immediately.
    pub fn ticker(&self) -> tokio::time::Interval {
        tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        )
    }

    /// Render a verdict's missing tags for diagnostics.
    pub fn describe_missing(missing: &[FrameTag]) -> String {
        let names: Vec<&str> = missing.iter().map(|t| t.as_str()).collect();
        format!("no {} frames within watchdog window", names.join("/"))
    }
}

// ── Tests ────────────────────────────────────────────────────────
