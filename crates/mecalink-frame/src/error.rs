/// Errors that can occur during frame encoding.
///
/// Decoding never fails: malformed input is reported as
/// [`Decoded::Invalid`](crate::Decoded::Invalid) and handled by resync.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the 1-byte length field's usable range.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
