//! H-bridge wheel actuation.
//!
//! Each wheel is driven by two direction lines (`in1`, `in2`) and one PWM
//! duty channel. Positive speed drives forward, negative drives reverse and
//! zero brakes with both direction lines high. Brake is not coast.

#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::{debug, trace};

use crate::kinematics::{Wheel, WheelSpeeds};

/// Largest PWM duty an actuator channel accepts.
pub const MAX_DUTY: u8 = u8::MAX;

/// Drive direction encoded by a [`WheelSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Direction {
    Forward,
    Reverse,
    Brake,
}

/// Electrical state of one wheel channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct WheelSignal {
    pub in1: bool,
    pub in2: bool,
    pub duty: u8,
}

impl WheelSignal {
    /// Active brake: both direction lines high, zero duty.
    pub const BRAKE: WheelSignal = WheelSignal {
        in1: true,
        in2: true,
        duty: 0,
    };

    /// Signal for a signed wheel speed. Magnitude is clamped to [`MAX_DUTY`].
    pub fn from_speed(speed: i32) -> Self {
        let duty = speed.unsigned_abs().min(u32::from(MAX_DUTY)) as u8;
        match speed.signum() {
            1 => WheelSignal {
                in1: true,
                in2: false,
                duty,
            },
            -1 => WheelSignal {
                in1: false,
                in2: true,
                duty,
            },
            _ => WheelSignal::BRAKE,
        }
    }

    pub fn direction(&self) -> Direction {
        match (self.in1, self.in2) {
            (true, false) => Direction::Forward,
            (false, true) => Direction::Reverse,
            _ => Direction::Brake,
        }
    }

    pub fn is_brake(&self) -> bool {
        self.direction() == Direction::Brake
    }
}

/// Hardware seam for one set of four wheel channels.
pub trait WheelOutput {
    /// Drive the two direction lines of `wheel`.
    fn set_direction(&mut self, wheel: Wheel, in1: bool, in2: bool);

    /// Set the PWM duty of `wheel`.
    fn set_duty(&mut self, wheel: Wheel, duty: u8);
}

/// Applies wheel speeds to a [`WheelOutput`] and remembers the last signal
/// written per wheel.
///
/// Construction brakes every wheel, so a freshly started device never
/// inherits whatever state its outputs powered up in.
#[derive(Debug)]
pub struct ActuatorDriver<O> {
    output: O,
    signals: [WheelSignal; 4],
}

impl<O: WheelOutput> ActuatorDriver<O> {
    pub fn new(output: O) -> Self {
        let mut driver = Self {
            output,
            signals: [WheelSignal::BRAKE; 4],
        };
        driver.brake_all();
        driver
    }

    /// Drive one wheel at a signed speed. The resulting signal is readable
    /// through [`signal`](Self::signal).
    pub fn apply(&mut self, wheel: Wheel, speed: i32) {
        let signal = WheelSignal::from_speed(speed);
        self.write(wheel, signal);
        trace!(
            wheel = wheel.name(),
            speed,
            duty = signal.duty,
            "wheel applied"
        );
    }

    /// Drive all four wheels.
    pub fn apply_all(&mut self, speeds: &WheelSpeeds) {
        for (wheel, speed) in speeds.iter() {
            self.apply(wheel, speed);
        }
    }

    /// Brake every wheel.
    pub fn brake_all(&mut self) {
        for wheel in Wheel::ALL {
            self.write(wheel, WheelSignal::BRAKE);
        }
        debug!("all wheels braked");
    }

    /// Last signal written to `wheel`.
    pub fn signal(&self, wheel: Wheel) -> WheelSignal {
        self.signals[wheel.index()]
    }

    /// Last signals for all wheels in channel order.
    pub fn signals(&self) -> [WheelSignal; 4] {
        self.signals
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn into_inner(self) -> O {
        self.output
    }

    fn write(&mut self, wheel: Wheel, signal: WheelSignal) {
        self.output.set_direction(wheel, signal.in1, signal.in2);
        self.output.set_duty(wheel, signal.duty);
        self.signals[wheel.index()] = signal;
    }
}

/// In-memory wheel outputs for simulation and tests.
///
/// Starts with every line low (coast) so that tests can tell whether the
/// driver braked on construction.
#[derive(Debug, Clone, Default)]
pub struct SimulatedOutputs {
    lines: [(bool, bool); 4],
    duty: [u8; 4],
    writes: usize,
}

impl SimulatedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current electrical state of `wheel`.
    pub fn signal(&self, wheel: Wheel) -> WheelSignal {
        let (in1, in2) = self.lines[wheel.index()];
        WheelSignal {
            in1,
            in2,
            duty: self.duty[wheel.index()],
        }
    }

    /// Number of output writes (direction and duty counted separately).
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl WheelOutput for SimulatedOutputs {
    fn set_direction(&mut self, wheel: Wheel, in1: bool, in2: bool) {
        self.lines[wheel.index()] = (in1, in2);
        self.writes += 1;
    }

    fn set_duty(&mut self, wheel: Wheel, duty: u8) {
        self.duty[wheel.index()] = duty;
        self.writes += 1;
    }
}
