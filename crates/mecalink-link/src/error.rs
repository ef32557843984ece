use crate::state::LinkState;

/// Errors that can occur mapping a frame to a typed command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The frame kind is not one this build understands.
    #[error("unknown command kind 0x{0:02x}")]
    UnknownKind(u8),

    /// A fixed-size payload had the wrong length.
    #[error("{kind} payload must be {expected} bytes, got {actual}")]
    PayloadSize {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] mecalink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] mecalink_frame::FrameError),

    /// Malformed or unknown command.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// A command was sent while the link was not up.
    #[error("link not connected (state: {state})")]
    NotConnected { state: LinkState },

    /// The runtime behind a handle has stopped.
    #[error("link runtime closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, LinkError>;
