//! Caller-facing event surface.
//!
//! The link emits these to a single subscriber over an mpsc channel;
//! this is the only public output of the core. Nothing here is an
//! error the caller must handle — failures have already been
//! converted into reconnect or restart decisions.

use crate::command::Event;
use crate::frame::Frame;
use crate::link::LinkState;

/// Notifications emitted by a [`DeviceLink`](crate::link::DeviceLink).
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Both sockets connected; buffered commands flushed.
    Ready,

    /// The link lost its connection and is waiting to reconnect.
    Offline,

    /// A supervised daemon restart began.
    Restarting { reason: String },

    /// The lifecycle state changed (includes the states behind
    /// `Ready`/`Offline`/`Restarting`, for callers that track the
    /// full machine).
    StateChange { state: LinkState },

    /// A frame arrived on the data socket or from the local capture.
    Frame(Frame),

    /// A named event arrived on the control socket.
    Daemon(Event),
}
