//! Frame kind values.
//!
//! The set is closed on the wire today but open to extension: receivers
//! ignore kinds they do not know.

/// Liveness probe and acknowledgement. Always zero-length.
pub const HEARTBEAT: u8 = 0x00;

/// Velocity command (forward, lateral, rotation).
pub const MOVE: u8 = 0x01;

/// Accessory toggles and operating mode, in both directions.
pub const CONTROL: u8 = 0x02;

/// Advisory target coordinate.
pub const TARGET: u8 = 0x03;

/// Returns a human-readable name for a frame kind.
pub fn kind_name(kind: u8) -> &'static str {
    match kind {
        HEARTBEAT => "HEARTBEAT",
        MOVE => "MOVE",
        CONTROL => "CONTROL",
        TARGET => "TARGET",
        _ => "UNKNOWN",
    }
}
