//! `tokio_util` codecs for the two daemon sockets.
//!
//! [`FrameCodec`] handles the binary data socket: 20-byte header plus
//! payload, reassembled across arbitrary read boundaries. A frame that
//! cannot be trusted (unknown tag, absurd size) is a hard error — the
//! stream has desynchronized and only a daemon restart recovers it.
//!
//! [`EventCodec`] handles the control socket: NUL-terminated JSON in
//! both directions, with an optional `"<digits> "` sequence prefix on
//! incoming events. Here a malformed message poisons only itself;
//! delimiter framing resynchronizes at the next NUL.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::command::{Command, Event};
use crate::error::TetherError;
use crate::frame::{Frame, FrameHeader, HEADER_LEN, MAX_FRAME_SIZE};

// ── FrameCodec ───────────────────────────────────────────────────

/// Incremental decoder/encoder for the binary frame stream.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = TetherError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        // Header parse fails hard on an unknown tag; the unconsumed
        // buffer is irrelevant at that point.
        let header = FrameHeader::decode(&src[..HEADER_LEN])?;
        let size = header.size as usize;
        if size > MAX_FRAME_SIZE {
            return Err(TetherError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        if src.len() < HEADER_LEN + size {
            // Partial frame: leave everything in place for the next read.
            src.reserve(HEADER_LEN + size - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(size).freeze();
        Ok(Some(Frame { header, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = TetherError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.payload.len();
        if size > MAX_FRAME_SIZE {
            return Err(TetherError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        dst.reserve(HEADER_LEN + size);
        dst.extend_from_slice(&item.header.encode());
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}

// ── EventCodec ───────────────────────────────────────────────────

/// Decoder for daemon events, encoder for outgoing commands.
#[derive(Debug, Default)]
pub struct EventCodec;

/// Strip an optional leading `"<digits> "` sequence-number prefix.
///
/// The daemon numbers some replies; the number carries no meaning for
/// us and is discarded.
fn strip_seq_prefix(body: &[u8]) -> &[u8] {
    let digits = body.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits > 0 && body.get(digits) == Some(&b' ') {
        &body[digits + 1..]
    } else {
        body
    }
}

impl Decoder for EventCodec {
    type Item = Event;
    type Error = TetherError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == 0) else {
                return Ok(None);
            };

            let raw = src.split_to(pos + 1);
            let body = strip_seq_prefix(&raw[..pos]);

            match Event::parse(body) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    // Fatal for this message only; keep scanning from
                    // the next NUL boundary.
                    warn!(error = %e, "malformed control event, skipping message");
                }
            }
        }
    }
}

impl Encoder<Command> for EventCodec {
    type Error = TetherError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)?;
        dst.reserve(body.len() + 1);
        dst.extend_from_slice(&body);
        dst.put_u8(0);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
