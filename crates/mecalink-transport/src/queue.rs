use std::collections::VecDeque;

use bytes::Bytes;
use tracing::trace;

use crate::error::Result;
use crate::traits::{Endpoint, Transport};

/// A transport request recorded by [`QueuedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Connect(Endpoint),
    Disconnect,
    Abort,
    Write(Bytes),
}

/// Transport that records requests for a run loop to execute later.
///
/// This lets a state machine own its transport exclusively while the actual
/// socket work happens in the loop that drives it.
#[derive(Debug, Default)]
pub struct QueuedTransport {
    pending: VecDeque<TransportCommand>,
}

impl QueuedTransport {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the oldest pending request.
    pub fn pop_command(&mut self) -> Option<TransportCommand> {
        self.pending.pop_front()
    }

    /// Number of requests not yet executed.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Iterate over pending requests without consuming them.
    pub fn iter(&self) -> impl Iterator<Item = &TransportCommand> {
        self.pending.iter()
    }

    fn push(&mut self, command: TransportCommand) {
        trace!(?command, "queued transport command");
        self.pending.push_back(command);
    }

    fn discard_writes(&mut self) {
        self.pending
            .retain(|command| !matches!(command, TransportCommand::Write(_)));
    }
}

impl Transport for QueuedTransport {
    fn connect(&mut self, endpoint: &Endpoint) {
        self.push(TransportCommand::Connect(endpoint.clone()));
    }

    fn disconnect(&mut self) {
        self.push(TransportCommand::Disconnect);
    }

    fn abort(&mut self) {
        // Unsent writes belong to the stream being torn down.
        self.discard_writes();
        self.push(TransportCommand::Abort);
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.push(TransportCommand::Write(Bytes::copy_from_slice(bytes)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_requests_in_order() {
        let mut transport = QueuedTransport::new();
        let endpoint = Endpoint::new("127.0.0.1", 8080);

        transport.connect(&endpoint);
        transport.write(b"\xAA\x00\x00\x55").unwrap();
        transport.disconnect();

        assert_eq!(transport.len(), 3);
        assert_eq!(
            transport.pop_command(),
            Some(TransportCommand::Connect(endpoint))
        );
        assert_eq!(
            transport.pop_command(),
            Some(TransportCommand::Write(Bytes::from_static(b"\xAA\x00\x00\x55")))
        );
        assert_eq!(transport.pop_command(), Some(TransportCommand::Disconnect));
        assert!(transport.is_empty());
    }

    #[test]
    fn abort_drops_unsent_writes() {
        let mut transport = QueuedTransport::new();
        transport.write(b"one").unwrap();
        transport.write(b"two").unwrap();
        transport.abort();

        let pending: Vec<_> = transport.iter().cloned().collect();
        assert_eq!(pending, vec![TransportCommand::Abort]);
    }
}
