//! Motion side of the mecalink device: turning a body velocity command into
//! four wheel signals.
//!
//! - [`kinematics`] mixes forward/lateral/rotation into per-wheel speeds.
//! - [`actuator`] maps each speed onto an H-bridge direction pair plus a
//!   PWM duty, with a distinct brake state for zero.

pub mod actuator;
pub mod kinematics;

pub use actuator::{
    ActuatorDriver, Direction, SimulatedOutputs, WheelOutput, WheelSignal, MAX_DUTY,
};
pub use kinematics::{mix, Wheel, WheelSpeeds};
