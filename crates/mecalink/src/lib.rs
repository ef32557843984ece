//! Command-and-telemetry link between a host controller and a mecanum
//! motion controller.
//!
//! # Crate Structure
//!
//! - [`transport`] - Byte-stream transport contract and TCP helpers
//! - [`frame`] - Sentinel-delimited framing and stream reassembly
//! - [`motion`] - Mecanum kinematics and H-bridge wheel signals
//! - [`link`] - Command model, link supervision, device endpoint and runtimes

/// Re-export transport types.
pub mod transport {
    pub use mecalink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mecalink_frame::*;
}

/// Re-export motion types.
pub mod motion {
    pub use mecalink_motion::*;
}

/// Re-export link types.
pub mod link {
    pub use mecalink_link::*;
}
