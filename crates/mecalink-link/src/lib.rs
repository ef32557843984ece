//! Command model and connection lifecycle for the mecalink protocol.
//!
//! This is the layer both endpoints share. Frames from the reassembler are
//! mapped to typed [`Command`]s, the host side keeps its connection alive
//! with a [`LinkSupervisor`], and the motion controller side answers with a
//! [`DeviceLink`].
//!
//! Both state machines are sans-IO: they consume transport notifications and
//! an explicit clock, and never block. The tokio runtimes in [`runtime`]
//! (feature `async`) wire them to real sockets.

pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod intent;
pub mod state;
pub mod supervisor;

#[cfg(feature = "async")]
pub mod runtime;

pub use command::{dispatch, Command, ControlCommand, Mode, MoveCommand, TargetCommand};
pub use config::{DeviceConfig, LinkConfig};
pub use device::{DeviceEvent, DeviceLink, PollStatus};
pub use error::{CommandError, LinkError, Result};
pub use intent::{DriveDirection, Intent, OperatorConsole, DEFAULT_LEVEL, MAX_LEVEL};
pub use state::{LinkEvent, LinkState};
pub use supervisor::LinkSupervisor;

#[cfg(feature = "async")]
pub use runtime::{host_channel, run_host, serve_device, HostHandle, HostRequest};
