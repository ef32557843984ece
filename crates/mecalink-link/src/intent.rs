use tracing::debug;

use crate::command::{Command, ControlCommand, Mode, MoveCommand};

/// Highest speed setting.
pub const MAX_LEVEL: u8 = 100;

/// Speed setting before the operator touches it.
pub const DEFAULT_LEVEL: u8 = 50;

/// Drive button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveDirection {
    Forward,
    Backward,
    Left,
    Right,
    RotateLeft,
    RotateRight,
}

/// Operator input, as produced by a button panel or key bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Speed slider, 0 to [`MAX_LEVEL`].
    SetSpeed(u8),
    Press(DriveDirection),
    /// Any drive button released.
    Release,
    /// Enable/disable the primary actuator and automatic mode together.
    ToggleEnable,
}

/// Turns operator intents into commands.
///
/// Holds the speed setting and the enable toggle. Intents that would send
/// something are dropped while the link is down; the speed setting is local
/// and always applies.
#[derive(Debug, Clone)]
pub struct OperatorConsole {
    level: u8,
    enabled: bool,
}

impl Default for OperatorConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorConsole {
    pub fn new() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            enabled: false,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Drive magnitude for the current setting.
    pub fn magnitude(&self) -> i16 {
        i16::from(self.level) * 2
    }

    /// Apply one intent. Returns the command to transmit, if any.
    pub fn apply(&mut self, intent: Intent, connected: bool) -> Option<Command> {
        if let Intent::SetSpeed(level) = intent {
            self.level = level.min(MAX_LEVEL);
            return None;
        }
        if !connected {
            debug!(?intent, "intent ignored while disconnected");
            return None;
        }

        let m = self.magnitude();
        let command = match intent {
            Intent::Press(direction) => {
                let (forward, lateral, rotation) = match direction {
                    DriveDirection::Forward => (m, 0, 0),
                    DriveDirection::Backward => (-m, 0, 0),
                    DriveDirection::Left => (0, -m, 0),
                    DriveDirection::Right => (0, m, 0),
                    DriveDirection::RotateLeft => (0, 0, -m),
                    DriveDirection::RotateRight => (0, 0, m),
                };
                Command::Move(MoveCommand::new(forward, lateral, rotation))
            }
            Intent::Release => Command::Move(MoveCommand::STOP),
            Intent::ToggleEnable => {
                self.enabled = !self.enabled;
                Command::Control(if self.enabled {
                    ControlCommand {
                        primary: true,
                        secondary: false,
                        mode: Mode::Auto,
                    }
                } else {
                    ControlCommand::default()
                })
            }
            Intent::SetSpeed(_) => return None,
        };
        Some(command)
    }
}
