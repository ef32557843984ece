use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::kind_name;

/// Start sentinel, always the first byte of a frame.
pub const MARKER_START: u8 = 0xAA;

/// End sentinel, always the byte right after the payload.
pub const MARKER_END: u8 = 0x55;

/// Frame header: start sentinel (1) + kind (1) + length (1) = 3 bytes.
pub const HEADER_SIZE: usize = 3;

/// Largest payload a frame may carry.
pub const MAX_PAYLOAD: usize = 252;

/// Smallest possible frame: header + end sentinel, empty payload.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + 1;

/// Largest possible frame on the wire.
pub const MAX_FRAME_SIZE: usize = MIN_FRAME_SIZE + MAX_PAYLOAD;

/// One complete message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload interpretation selector.
    pub kind: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Create a zero-length frame of `kind`.
    pub fn empty(kind: u8) -> Self {
        Self {
            kind,
            payload: Bytes::new(),
        }
    }

    /// The total wire size of this frame (sentinels + header + payload).
    pub fn wire_size(&self) -> usize {
        MIN_FRAME_SIZE + self.payload.len()
    }

    /// Human-readable kind name.
    pub fn kind_name(&self) -> &'static str {
        kind_name(self.kind)
    }

    /// Append this frame's wire encoding to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_frame(self.kind, &self.payload, dst)
    }

    /// Encode this frame into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        self.encode(&mut dst)?;
        Ok(dst.freeze())
    }
}

/// Outcome of inspecting a byte window for a frame at offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete, sentinel-checked frame occupying the first
    /// `frame.wire_size()` bytes.
    Frame(Frame),
    /// The window starts like a frame but is shorter than its declared size.
    Incomplete,
    /// The window does not start with a frame.
    Invalid,
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────┬────────┬────────┬──────────────────┬────────┐
/// │ 0xAA   │ Kind   │ Length │ Payload          │ 0x55   │
/// │ (1B)   │ (1B)   │ (1B)   │ (Length bytes)   │ (1B)   │
/// └────────┴────────┴────────┴──────────────────┴────────┘
/// ```
pub fn encode_frame(kind: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(MIN_FRAME_SIZE + payload.len());
    dst.put_u8(MARKER_START);
    dst.put_u8(kind);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);
    dst.put_u8(MARKER_END);
    Ok(())
}

/// Decode the frame at the start of `src` without consuming anything.
///
/// The declared length only bounds where the end sentinel is looked for; a
/// frame whose end byte is not `0x55` is [`Decoded::Invalid`]. Declared
/// lengths beyond [`MAX_PAYLOAD`] are invalid as well.
pub fn decode_frame(src: &[u8]) -> Decoded {
    match src.first() {
        None => return Decoded::Incomplete,
        Some(&byte) if byte != MARKER_START => return Decoded::Invalid,
        Some(_) => {}
    }

    if src.len() < HEADER_SIZE {
        return Decoded::Incomplete;
    }

    let kind = src[1];
    let payload_len = src[2] as usize;
    if payload_len > MAX_PAYLOAD {
        return Decoded::Invalid;
    }

    let total = MIN_FRAME_SIZE + payload_len;
    if src.len() < total {
        return Decoded::Incomplete;
    }

    if src[total - 1] != MARKER_END {
        return Decoded::Invalid;
    }

    Decoded::Frame(Frame {
        kind,
        payload: Bytes::copy_from_slice(&src[HEADER_SIZE..HEADER_SIZE + payload_len]),
    })
}
