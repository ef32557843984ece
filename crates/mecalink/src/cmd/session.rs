use std::time::Duration;

use mecalink_link::{host_channel, run_host, HostHandle, LinkConfig, LinkEvent, LinkState};
use mecalink_transport::Endpoint;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::exit::{link_error, CliError, CliResult, FAILURE, INTERNAL, TIMEOUT, TRANSPORT_ERROR};

/// A host runtime spawned on the current tokio runtime, plus its event feed.
pub struct HostSession {
    pub handle: HostHandle,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HostSession {
    pub fn start(config: LinkConfig, cancel: CancellationToken) -> Self {
        let (handle, requests) = host_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_host(config, requests, events_tx, cancel.clone()));
        Self {
            handle,
            events,
            cancel,
            task,
        }
    }

    /// Connect once and wait for the outcome.
    ///
    /// A failed attempt is reported instead of retried.
    pub async fn connect(&mut self, endpoint: Endpoint, timeout: Duration) -> CliResult<()> {
        self.handle
            .connect(endpoint.clone())
            .map_err(|err| link_error("connect request failed", err))?;

        let deadline = Instant::now() + timeout;
        loop {
            let event = match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return Err(CliError::new(INTERNAL, "host runtime stopped unexpectedly"))
                }
                Err(_) => {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("connect to {endpoint} timed out after {timeout:?}"),
                    ))
                }
            };
            let LinkEvent::Status { state, message, .. } = event else {
                continue;
            };
            debug!(%state, %message, "link status");
            match state {
                LinkState::Connected => return Ok(()),
                LinkState::Connecting => continue,
                _ if self.cancel.is_cancelled() => {
                    return Err(CliError::new(FAILURE, "interrupted"))
                }
                LinkState::Reconnecting | LinkState::Disconnected => {
                    return Err(CliError::new(TRANSPORT_ERROR, message))
                }
            }
        }
    }

    /// Next event before `deadline`, or `None` once it passes.
    pub async fn next_event(&mut self, deadline: Instant) -> Option<LinkEvent> {
        tokio::time::timeout_at(deadline, self.events.recv())
            .await
            .ok()
            .flatten()
    }

    /// Disconnect, stop the runtime, and hand back any events it emitted on
    /// the way down.
    pub async fn close(mut self) -> Vec<LinkEvent> {
        let _ = self.handle.disconnect();
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            debug!(error = %err, "host task ended abnormally");
        }

        let mut remaining = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            remaining.push(event);
        }
        remaining
    }
}

/// Connect timeout handed to the runtime, kept past the caller's own
/// deadline so that a slow attempt reports as a timeout.
pub fn runtime_connect_timeout(timeout: Duration) -> Duration {
    timeout + Duration::from_secs(1)
}
