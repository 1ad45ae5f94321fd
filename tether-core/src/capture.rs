//! Native capture seam.
//!
//! Some links own a local capture device (e.g. a microphone) in
//! addition to the daemon sockets. The link only sequences `open` →
//! `read`* → `close` per connection generation; it never implements
//! capture itself.

use async_trait::async_trait;

use crate::error::TetherError;
use crate::frame::Frame;

/// An opaque local capture device producing ready-made frames.
#[async_trait]
pub trait CaptureHandle: Send {
    /// Acquire the device. Called once per connection generation,
    /// before any `read`.
    async fn open(&mut self) -> Result<(), TetherError>;

    /// Produce the next frame.
    ///
    /// Must be cancel-safe: the link polls this inside a `select!`
    /// loop and may drop the future between frames.
    async fn read(&mut self) -> Result<Frame, TetherError>;

    /// Release the device. Called on every teardown, including
    /// restarts; must tolerate being called after a failed `open`.
    async fn close(&mut self) -> Result<(), TetherError>;
}
