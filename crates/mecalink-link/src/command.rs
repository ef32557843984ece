use bytes::{BufMut, Bytes, BytesMut};
use mecalink_frame::{kind_name, Frame, CONTROL, HEARTBEAT, MOVE, TARGET};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CommandError;

const MOVE_LEN: usize = 6;
const CONTROL_LEN: usize = 4;
const TARGET_LEN: usize = 4;

/// Device operating mode carried by [`ControlCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Manual,
    Auto,
    /// A mode value this build does not know, kept as received.
    Other(u8),
}

impl From<u8> for Mode {
    fn from(value: u8) -> Self {
        match value {
            0 => Mode::Manual,
            1 => Mode::Auto,
            other => Mode::Other(other),
        }
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Manual => 0,
            Mode::Auto => 1,
            Mode::Other(value) => value,
        }
    }
}

/// Body velocity command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCommand {
    pub forward: i16,
    pub lateral: i16,
    pub rotation: i16,
}

impl MoveCommand {
    /// Zero velocity. The device brakes every wheel.
    pub const STOP: MoveCommand = MoveCommand {
        forward: 0,
        lateral: 0,
        rotation: 0,
    };

    pub fn new(forward: i16, lateral: i16, rotation: i16) -> Self {
        Self {
            forward,
            lateral,
            rotation,
        }
    }
}

/// Accessory toggles and device mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    /// Primary actuator (the laser on the reference vehicle).
    pub primary: bool,
    /// Secondary actuator.
    pub secondary: bool,
    pub mode: Mode,
}

impl Default for ControlCommand {
    fn default() -> Self {
        Self {
            primary: false,
            secondary: false,
            mode: Mode::Manual,
        }
    }
}

/// Advisory target coordinate from the vision pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCommand {
    pub x: i16,
    pub y: i16,
}

/// A decoded protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Heartbeat,
    Move(MoveCommand),
    Control(ControlCommand),
    Target(TargetCommand),
}

impl Command {
    /// Wire kind byte for this command.
    pub fn kind(&self) -> u8 {
        match self {
            Command::Heartbeat => HEARTBEAT,
            Command::Move(_) => MOVE,
            Command::Control(_) => CONTROL,
            Command::Target(_) => TARGET,
        }
    }

    /// Human-readable kind name.
    pub fn kind_name(&self) -> &'static str {
        kind_name(self.kind())
    }

    /// Decode a payload of the given kind.
    ///
    /// Multi-byte integers are little-endian. The reserved Control byte is
    /// ignored on input.
    pub fn decode(kind: u8, payload: &[u8]) -> Result<Self, CommandError> {
        match kind {
            HEARTBEAT => {
                fixed::<0>(kind, payload)?;
                Ok(Command::Heartbeat)
            }
            MOVE => {
                let p = fixed::<MOVE_LEN>(kind, payload)?;
                Ok(Command::Move(MoveCommand {
                    forward: i16::from_le_bytes([p[0], p[1]]),
                    lateral: i16::from_le_bytes([p[2], p[3]]),
                    rotation: i16::from_le_bytes([p[4], p[5]]),
                }))
            }
            CONTROL => {
                let p = fixed::<CONTROL_LEN>(kind, payload)?;
                Ok(Command::Control(ControlCommand {
                    primary: p[0] != 0,
                    secondary: p[1] != 0,
                    mode: Mode::from(p[2]),
                }))
            }
            TARGET => {
                let p = fixed::<TARGET_LEN>(kind, payload)?;
                Ok(Command::Target(TargetCommand {
                    x: i16::from_le_bytes([p[0], p[1]]),
                    y: i16::from_le_bytes([p[2], p[3]]),
                }))
            }
            other => Err(CommandError::UnknownKind(other)),
        }
    }

    /// Decode a reassembled frame.
    pub fn from_frame(frame: &Frame) -> Result<Self, CommandError> {
        Self::decode(frame.kind, &frame.payload)
    }

    /// Encoded payload bytes (without framing).
    pub fn payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MOVE_LEN);
        match self {
            Command::Heartbeat => {}
            Command::Move(m) => {
                buf.put_i16_le(m.forward);
                buf.put_i16_le(m.lateral);
                buf.put_i16_le(m.rotation);
            }
            Command::Control(c) => {
                buf.put_u8(u8::from(c.primary));
                buf.put_u8(u8::from(c.secondary));
                buf.put_u8(u8::from(c.mode));
                buf.put_u8(0);
            }
            Command::Target(t) => {
                buf.put_i16_le(t.x);
                buf.put_i16_le(t.y);
            }
        }
        buf.freeze()
    }

    /// Wrap this command in a frame.
    pub fn to_frame(&self) -> Frame {
        Frame::new(self.kind(), self.payload())
    }
}

impl From<MoveCommand> for Command {
    fn from(command: MoveCommand) -> Self {
        Command::Move(command)
    }
}

impl From<ControlCommand> for Command {
    fn from(command: ControlCommand) -> Self {
        Command::Control(command)
    }
}

impl From<TargetCommand> for Command {
    fn from(command: TargetCommand) -> Self {
        Command::Target(command)
    }
}

/// Map a frame to a command, dropping anything this build cannot act on.
///
/// Unknown kinds and wrong-sized payloads are logged at debug level and
/// yield `None`; neither is an error on a lossy link.
pub fn dispatch(frame: &Frame) -> Option<Command> {
    match Command::from_frame(frame) {
        Ok(command) => Some(command),
        Err(err) => {
            debug!(
                kind = frame.kind,
                len = frame.payload.len(),
                error = %err,
                "dropped frame"
            );
            None
        }
    }
}

fn fixed<const N: usize>(kind: u8, payload: &[u8]) -> Result<[u8; N], CommandError> {
    payload.try_into().map_err(|_| CommandError::PayloadSize {
        kind: kind_name(kind),
        expected: N,
        actual: payload.len(),
    })
}
