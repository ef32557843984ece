use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::{Result, TransportError};

/// TCP port the motion controller listens on unless told otherwise.
pub const DEFAULT_DEVICE_PORT: u16 = 8080;

/// A `host:port` pair identifying the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    /// Parse `host:port`, `[v6]:port`, or a bare host (default device port).
    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidEndpoint(input.to_string()));
        }

        if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| TransportError::InvalidEndpoint(input.to_string()))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(input, port)?,
                None if tail.is_empty() => DEFAULT_DEVICE_PORT,
                None => return Err(TransportError::InvalidEndpoint(input.to_string())),
            };
            return Ok(Self::new(host, port));
        }

        match input.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => {
                Err(TransportError::InvalidEndpoint(input.to_string()))
            }
            Some((host, port)) if !host.is_empty() => Ok(Self::new(host, parse_port(input, port)?)),
            Some(_) => Err(TransportError::InvalidEndpoint(input.to_string())),
            None => Ok(Self::new(input, DEFAULT_DEVICE_PORT)),
        }
    }
}

fn parse_port(input: &str, port: &str) -> Result<u16> {
    port.parse()
        .map_err(|_| TransportError::InvalidEndpoint(input.to_string()))
}

/// Notifications delivered by the run loop that owns the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connect attempt succeeded.
    Connected,
    /// The connect attempt failed; no stream was established.
    ConnectFailed(String),
    /// An established stream closed (peer close, reset, or local abort).
    Disconnected,
    /// Newly arrived bytes, in arrival order.
    Data(Bytes),
}

/// Request side of a byte-stream transport.
///
/// Every method returns immediately. Outcomes of `connect` and stream
/// closure are reported later as [`TransportEvent`]s.
pub trait Transport {
    /// Start connecting to `endpoint`.
    fn connect(&mut self, endpoint: &Endpoint);

    /// Gracefully close the stream, if any.
    fn disconnect(&mut self);

    /// Drop the stream immediately without a graceful close.
    fn abort(&mut self);

    /// Queue bytes for transmission on the established stream.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}
