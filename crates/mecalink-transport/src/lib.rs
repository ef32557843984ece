//! Byte-stream transport contract for the mecalink protocol core.
//!
//! The protocol core never performs I/O itself. It talks to a [`Transport`]
//! that accepts connect/disconnect/abort/write requests and reports back
//! through [`TransportEvent`] notifications delivered by whatever run loop
//! owns the socket.
//!
//! - [`QueuedTransport`] records requests so a single-threaded driver can
//!   execute them between events.
//! - [`tcp`] (feature `async`) provides the tokio TCP connect and bind helpers
//!   used by the runtimes.

pub mod error;
pub mod queue;
pub mod traits;

#[cfg(feature = "async")]
pub mod tcp;

pub use error::{Result, TransportError};
pub use queue::{QueuedTransport, TransportCommand};
pub use traits::{Endpoint, Transport, TransportEvent, DEFAULT_DEVICE_PORT};

#[cfg(feature = "async")]
pub use tcp::{connect, TcpServer};
