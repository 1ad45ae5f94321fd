//! # tether-core
//!
//! Supervised link to local device daemons: a framed UNIX-socket
//! command-and-event protocol with automatic reconnection,
//! tag-liveness watchdogging and supervised daemon restart.
//!
//! This crate contains:
//! - **Wire types**: `Frame`, `FrameHeader`, `FrameTag`, `Command`, `Event`
//! - **Codecs**: `FrameCodec` (binary data socket) and `EventCodec`
//!   (NUL-delimited JSON control socket) for framed I/O via `tokio_util`
//! - **Link**: `DeviceLink` — the connection supervisor, with
//!   `LinkState`, `LinkHandle` and the `LinkEvent` surface
//! - **Watchdog**: `Watchdog` — per-tag liveness over the frame stream
//! - **Restart**: `RestartOrchestrator` — bounded, idempotent daemon
//!   restart through an injected `ServiceControl`
//! - **Seams**: `ServiceControl` and `CaptureHandle` collaborator traits
//! - **Error**: `TetherError` — typed, `thiserror`-based error hierarchy

pub mod capture;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod link;
pub mod restart;
pub mod service;
pub mod watchdog;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::CaptureHandle;
pub use codec::{EventCodec, FrameCodec};
pub use command::{BUFFER_SAFE_COMMANDS, Command, Event};
pub use config::LinkConfig;
pub use error::TetherError;
pub use events::LinkEvent;
pub use frame::{Frame, FrameHeader, FrameTag, HEADER_LEN, MAX_FRAME_SIZE};
pub use link::{DeviceLink, LinkHandle, LinkState, LinkStats, LinkStatsSnapshot};
pub use restart::{RestartOrchestrator, RestartPolicy};
pub use service::{NullServiceControl, ServiceAction, ServiceControl, ServiceState};
pub use watchdog::{Watchdog, WatchdogVerdict};
