//! Binary frame format for the data socket.
//!
//! Every frame the capture daemon emits starts with a fixed 20-byte
//! little-endian header followed by `size` payload bytes:
//!
//! ```text
//! size:           u32  (4)   payload length in bytes
//! tag:            u32  (4)   payload kind (video / faces / audio)
//! timestamp_sec:  u32  (4)   capture time, seconds part
//! timestamp_usec: u32  (4)   capture time, microseconds part
//! duration_ms:    u32  (4)   covered duration of the payload
//! ```
//!
//! Frames arrive back to back on a single byte stream and may span
//! socket read boundaries; reassembly lives in
//! [`FrameCodec`](crate::codec::FrameCodec).

use std::fmt;

use bytes::Bytes;

use crate::error::TetherError;

// ── Constants ────────────────────────────────────────────────────

/// Size of the fixed frame header on the wire.
pub const HEADER_LEN: usize = 20;

/// Hard ceiling on a single frame payload. A header claiming more
/// than this is treated the same as an unknown tag: stream desync.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

// ── FrameTag ─────────────────────────────────────────────────────

/// Payload kind carried in the frame header.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameTag {
    /// Encoded video frame.
    Video = 0x1,
    /// Face-detection metadata for the matching video frame.
    Faces = 0x2,
    /// PCM audio chunk.
    Audio = 0x3,
}

impl FrameTag {
    /// Stable lowercase name, used in logs and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameTag::Video => "video",
            FrameTag::Faces => "faces",
            FrameTag::Audio => "audio",
        }
    }
}

impl TryFrom<u32> for FrameTag {
    type Error = TetherError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x1 => Ok(FrameTag::Video),
            0x2 => Ok(FrameTag::Faces),
            0x3 => Ok(FrameTag::Audio),
            _ => Err(TetherError::UnknownTag { value }),
        }
    }
}

impl std::str::FromStr for FrameTag {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(FrameTag::Video),
            "faces" => Ok(FrameTag::Faces),
            "audio" => Ok(FrameTag::Audio),
            other => Err(TetherError::Other(format!("unknown frame tag name: {other}"))),
        }
    }
}

impl fmt::Display for FrameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── FrameHeader ──────────────────────────────────────────────────

/// Parsed fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length in bytes.
    pub size: u32,
    /// Payload kind.
    pub tag: FrameTag,
    /// Capture timestamp, seconds part.
    pub timestamp_sec: u32,
    /// Capture timestamp, microseconds part.
    pub timestamp_usec: u32,
    /// Duration covered by the payload in milliseconds.
    pub duration_ms: u32,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = HEADER_LEN;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.size.to_le_bytes());
        buf[4..8].copy_from_slice(&(self.tag as u32).to_le_bytes());
        buf[8..12].copy_from_slice(&self.timestamp_sec.to_le_bytes());
        buf[12..16].copy_from_slice(&self.timestamp_usec.to_le_bytes());
        buf[16..20].copy_from_slice(&self.duration_ms.to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    ///
    /// Fails with [`TetherError::UnknownTag`] when the tag field maps
    /// to no known variant — the caller must treat that as a stream
    /// desync, not skip the frame.
    pub fn decode(data: &[u8]) -> Result<Self, TetherError> {
        if data.len() < Self::SIZE {
            return Err(TetherError::TruncatedHeader {
                len: data.len(),
                need: Self::SIZE,
            });
        }
        let tag_raw = u32::from_le_bytes(data[4..8].try_into().expect("slice length checked"));
        Ok(Self {
            size: u32::from_le_bytes(data[0..4].try_into().expect("slice length checked")),
            tag: FrameTag::try_from(tag_raw)?,
            timestamp_sec: u32::from_le_bytes(data[8..12].try_into().expect("slice length checked")),
            timestamp_usec: u32::from_le_bytes(
                data[12..16].try_into().expect("slice length checked"),
            ),
            duration_ms: u32::from_le_bytes(data[16..20].try_into().expect("slice length checked")),
        })
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// A complete frame: header plus owned payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame from parts; the header `size` field is derived
    /// from the payload length.
    pub fn new(
        tag: FrameTag,
        timestamp_sec: u32,
        timestamp_usec: u32,
        duration_ms: u32,
        payload: impl Into<Bytes>,
    ) -> Self {
        let payload = payload.into();
        Self {
            header: FrameHeader {
                size: payload.len() as u32,
                tag,
                timestamp_sec,
                timestamp_usec,
                duration_ms,
            },
            payload,
        }
    }

    pub fn tag(&self) -> FrameTag {
        self.header.tag
    }

    /// Capture timestamp as total microseconds.
    pub fn timestamp_us(&self) -> u64 {
        self.header.timestamp_sec as u64 * 1_000_000 + self.header.timestamp_usec as u64
    }
}

// ── Tests ────────────────────────────────────────────────────────
