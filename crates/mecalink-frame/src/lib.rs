//! Sentinel-delimited framing for the mecalink command link.
//!
//! Every message travels as one frame:
//! - a start sentinel `0xAA`
//! - a 1-byte kind
//! - a 1-byte payload length (0-252)
//! - the payload
//! - an end sentinel `0x55`
//!
//! [`FrameAssembler`] recovers frames from an arbitrarily fragmented byte
//! stream and resynchronizes one byte at a time after corruption.

pub mod assembler;
pub mod codec;
pub mod error;
pub mod kind;

pub use assembler::{AssemblerConfig, AssemblerStats, FrameAssembler, DEFAULT_CAPACITY};
pub use codec::{
    decode_frame, encode_frame, Decoded, Frame, HEADER_SIZE, MARKER_END, MARKER_START,
    MAX_FRAME_SIZE, MAX_PAYLOAD, MIN_FRAME_SIZE,
};
pub use error::{FrameError, Result};
pub use kind::{kind_name, CONTROL, HEARTBEAT, MOVE, TARGET};
