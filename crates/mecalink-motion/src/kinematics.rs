//! Inverse kinematics for a four-wheel mecanum chassis.
//!
//! No cross-wheel normalization is applied. Under combined extreme inputs a
//! wheel may exceed the actuator range and is clamped on its own by the
//! actuator stage, which changes the ratio between wheels.

#[cfg(feature = "serde")]
use serde::Serialize;

/// Wheel position on the chassis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    RearRight,
    RearLeft,
}

impl Wheel {
    /// All wheels in actuator channel order.
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::RearRight,
        Wheel::RearLeft,
    ];

    /// Actuator channel index (0-3).
    pub fn index(self) -> usize {
        match self {
            Wheel::FrontLeft => 0,
            Wheel::FrontRight => 1,
            Wheel::RearRight => 2,
            Wheel::RearLeft => 3,
        }
    }

    /// Short display name.
    pub fn name(self) -> &'static str {
        match self {
            Wheel::FrontLeft => "front_left",
            Wheel::FrontRight => "front_right",
            Wheel::RearRight => "rear_right",
            Wheel::RearLeft => "rear_left",
        }
    }
}

/// Signed per-wheel speeds. Sign is direction, magnitude is duty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct WheelSpeeds {
    pub front_left: i32,
    pub front_right: i32,
    pub rear_right: i32,
    pub rear_left: i32,
}

impl WheelSpeeds {
    /// All wheels stopped.
    pub const STOP: WheelSpeeds = WheelSpeeds {
        front_left: 0,
        front_right: 0,
        rear_right: 0,
        rear_left: 0,
    };

    /// Speed of one wheel.
    pub fn get(&self, wheel: Wheel) -> i32 {
        match wheel {
            Wheel::FrontLeft => self.front_left,
            Wheel::FrontRight => self.front_right,
            Wheel::RearRight => self.rear_right,
            Wheel::RearLeft => self.rear_left,
        }
    }

    /// Iterate `(wheel, speed)` pairs in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (Wheel, i32)> + '_ {
        Wheel::ALL.into_iter().map(move |wheel| (wheel, self.get(wheel)))
    }
}

/// Mix a body velocity command into four wheel speeds.
///
/// ```text
/// front_left  = forward + lateral + rotation
/// front_right = forward - lateral - rotation
/// rear_right  = forward + lateral - rotation
/// rear_left   = forward - lateral + rotation
/// ```
pub fn mix(forward: i16, lateral: i16, rotation: i16) -> WheelSpeeds {
    let (f, l, r) = (i32::from(forward), i32::from(lateral), i32::from(rotation));
    WheelSpeeds {
        front_left: f + l + r,
        front_right: f - l - r,
        rear_right: f + l - r,
        rear_left: f - l + r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_forward_drives_all_wheels_equally() {
        let speeds = mix(100, 0, 0);
        assert!(speeds.iter().all(|(_, s)| s == 100));
    }

    #[test]
    fn pure_rotation_spins_in_place() {
        assert_eq!(
            mix(0, 0, 100),
            WheelSpeeds {
                front_left: 100,
                front_right: -100,
                rear_right: -100,
                rear_left: 100,
            }
        );
    }

    #[test]
    fn pure_lateral_strafes() {
        assert_eq!(
            mix(0, 50, 0),
            WheelSpeeds {
                front_left: 50,
                front_right: -50,
                rear_right: 50,
                rear_left: -50,
            }
        );
    }

    #[test]
    fn combined_inputs_are_not_normalized() {
        let speeds = mix(200, 200, 0);
        assert_eq!(speeds.front_left, 400);
        assert_eq!(speeds.front_right, 0);
        assert_eq!(speeds.rear_right, 400);
        assert_eq!(speeds.rear_left, 0);
    }

    #[test]
    fn extreme_inputs_do_not_overflow() {
        let speeds = mix(i16::MAX, i16::MAX, i16::MAX);
        assert_eq!(speeds.front_left, 3 * i32::from(i16::MAX));
        let speeds = mix(i16::MIN, i16::MAX, i16::MAX);
        assert_eq!(speeds.front_right, -98_302);
    }

    #[test]
    fn zero_command_is_stop() {
        assert_eq!(mix(0, 0, 0), WheelSpeeds::STOP);
    }

    #[test]
    fn channel_order_matches_indices() {
        for (i, wheel) in Wheel::ALL.iter().enumerate() {
            assert_eq!(wheel.index(), i);
        }
    }
}
