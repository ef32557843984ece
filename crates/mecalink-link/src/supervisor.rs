use std::collections::VecDeque;
use std::time::{Duration, Instant};

use mecalink_frame::{AssemblerStats, FrameAssembler};
use mecalink_transport::{Endpoint, Transport, TransportEvent};
use tracing::{debug, info, trace, warn};

use crate::command::{dispatch, Command, TargetCommand};
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::state::{LinkEvent, LinkState};

/// Periodic deadline. Stopped timers never fire.
#[derive(Debug, Clone, Copy)]
struct Timer {
    interval: Duration,
    next: Option<Instant>,
}

impl Timer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    fn start(&mut self, now: Instant) {
        self.next = Some(now + self.interval);
    }

    fn stop(&mut self) {
        self.next = None;
    }

    /// Fire if due, rescheduling one interval from `now`.
    fn fire(&mut self, now: Instant) -> bool {
        match self.next {
            Some(deadline) if now >= deadline => {
                self.next = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

/// Host-side connection lifecycle state machine.
///
/// The supervisor owns the link state, the reassembly buffer and both
/// timers. It performs no I/O: requests go to the [`Transport`], outcomes come
/// back through [`on_transport_event`](Self::on_transport_event), and time
/// only advances when the caller passes a new `now` to [`tick`](Self::tick).
/// Everything the application needs to know is queued as a [`LinkEvent`].
pub struct LinkSupervisor<T> {
    config: LinkConfig,
    transport: T,
    state: LinkState,
    endpoint: Option<Endpoint>,
    assembler: FrameAssembler,
    missed: u32,
    heartbeat: Timer,
    reconnect: Timer,
    heartbeat_sent_at: Option<Instant>,
    events: VecDeque<LinkEvent>,
}

impl<T: Transport> LinkSupervisor<T> {
    pub fn new(transport: T, config: LinkConfig) -> Self {
        Self {
            assembler: FrameAssembler::with_config(config.assembler),
            heartbeat: Timer::new(config.heartbeat_interval),
            reconnect: Timer::new(config.reconnect_interval),
            config,
            transport,
            state: LinkState::Disconnected,
            endpoint: None,
            missed: 0,
            heartbeat_sent_at: None,
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Endpoint of the current or most recent session.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Heartbeats sent since the last reply.
    pub fn missed_heartbeats(&self) -> u32 {
        self.missed
    }

    pub fn assembler_stats(&self) -> AssemblerStats {
        self.assembler.stats()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Explicit connect request. Ignored unless currently disconnected.
    pub fn connect(&mut self, endpoint: Endpoint) {
        if self.state != LinkState::Disconnected {
            debug!(state = %self.state, %endpoint, "connect request ignored");
            return;
        }
        let message = format!("Connecting to {endpoint}...");
        self.transport.connect(&endpoint);
        self.endpoint = Some(endpoint);
        self.transition(LinkState::Connecting, message);
    }

    /// Explicit user disconnect. Stops both timers and suppresses reconnect
    /// until the next [`connect`](Self::connect).
    pub fn disconnect(&mut self) {
        if self.state == LinkState::Disconnected {
            return;
        }
        self.heartbeat.stop();
        self.reconnect.stop();
        self.heartbeat_sent_at = None;
        self.transport.disconnect();
        self.transition(LinkState::Disconnected, "Disconnected".to_string());
    }

    /// Feed a notification from the transport.
    pub fn on_transport_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Connected => self.on_connected(now),
            TransportEvent::ConnectFailed(reason) => {
                if self.state != LinkState::Connecting {
                    trace!(state = %self.state, "stale connect failure ignored");
                    return;
                }
                let endpoint = self.endpoint_label();
                warn!(%endpoint, %reason, "connect failed");
                self.enter_reconnecting(
                    now,
                    format!(
                        "Connection to {endpoint} failed: {reason}; retrying in {:?}",
                        self.config.reconnect_interval
                    ),
                );
            }
            TransportEvent::Disconnected => {
                if self.state != LinkState::Connected {
                    trace!(state = %self.state, "disconnect notification ignored");
                    return;
                }
                self.heartbeat.stop();
                self.enter_reconnecting(
                    now,
                    format!(
                        "Connection lost; reconnecting in {:?}",
                        self.config.reconnect_interval
                    ),
                );
            }
            TransportEvent::Data(bytes) => {
                if self.state != LinkState::Connected {
                    trace!(state = %self.state, len = bytes.len(), "bytes outside session ignored");
                    return;
                }
                for frame in self.assembler.push(&bytes) {
                    if let Some(command) = dispatch(&frame) {
                        self.on_command(command, now);
                    }
                }
            }
        }
    }

    /// Run any timer that is due at `now`.
    pub fn tick(&mut self, now: Instant) {
        if self.heartbeat.fire(now) && self.state == LinkState::Connected {
            self.on_heartbeat_tick(now);
        }
        if self.reconnect.fire(now) && self.state == LinkState::Reconnecting {
            if let Some(endpoint) = self.endpoint.clone() {
                let message = format!("Reconnecting to {endpoint}...");
                self.transport.connect(&endpoint);
                self.transition(LinkState::Connecting, message);
            }
        }
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.heartbeat.next, self.reconnect.next) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Encode and transmit a command on the established link.
    pub fn send(&mut self, command: &Command) -> Result<()> {
        if self.state != LinkState::Connected {
            debug!(state = %self.state, kind = command.kind_name(), "send while not connected");
            return Err(LinkError::NotConnected { state: self.state });
        }
        let bytes = command.to_frame().to_bytes()?;
        self.transport.write(&bytes)?;
        trace!(kind = command.kind_name(), len = bytes.len(), "sent");
        Ok(())
    }

    /// Forward a target coordinate from the vision collaborator.
    pub fn send_target(&mut self, x: i16, y: i16) -> Result<()> {
        self.send(&Command::Target(TargetCommand { x, y }))
    }

    /// Send a heartbeat outside the periodic schedule and time its reply.
    pub fn send_heartbeat(&mut self, now: Instant) -> Result<()> {
        self.send(&Command::Heartbeat)?;
        self.heartbeat_sent_at = Some(now);
        Ok(())
    }

    /// Take the oldest pending event.
    pub fn poll_event(&mut self) -> Option<LinkEvent> {
        self.events.pop_front()
    }

    fn on_connected(&mut self, now: Instant) {
        if self.state != LinkState::Connecting {
            // The session this attempt belonged to was already abandoned.
            debug!(state = %self.state, "late connect completion dropped");
            self.transport.abort();
            return;
        }
        self.assembler.reset();
        self.missed = 0;
        self.heartbeat_sent_at = None;
        self.reconnect.stop();
        self.heartbeat.start(now);
        let message = format!("Connected to {}", self.endpoint_label());
        self.transition(LinkState::Connected, message);
    }

    fn on_heartbeat_tick(&mut self, now: Instant) {
        self.missed += 1;
        if self.missed > self.config.heartbeat_miss_limit {
            let missed = self.missed - 1;
            warn!(missed, endpoint = %self.endpoint_label(), "heartbeat timeout");
            self.heartbeat.stop();
            self.transport.abort();
            self.enter_reconnecting(
                now,
                format!("Heartbeat timeout after {missed} missed replies; reconnecting"),
            );
            return;
        }
        if let Err(err) = self.send_heartbeat(now) {
            warn!(error = %err, "heartbeat write failed");
        }
    }

    fn on_command(&mut self, command: Command, now: Instant) {
        match command {
            Command::Heartbeat => {
                self.missed = 0;
                let rtt = self
                    .heartbeat_sent_at
                    .take()
                    .map(|sent| now.saturating_duration_since(sent));
                trace!(?rtt, "heartbeat received");
                if self.config.echo_heartbeats {
                    if let Err(err) = self.send(&Command::Heartbeat) {
                        warn!(error = %err, "heartbeat echo failed");
                    }
                }
                self.events.push_back(LinkEvent::Heartbeat { rtt });
            }
            command => {
                debug!(kind = command.kind_name(), "received");
                self.events.push_back(LinkEvent::Received { command });
            }
        }
    }

    fn enter_reconnecting(&mut self, now: Instant, message: String) {
        self.heartbeat_sent_at = None;
        self.reconnect.start(now);
        self.transition(LinkState::Reconnecting, message);
    }

    fn transition(&mut self, next: LinkState, message: String) {
        info!(from = %self.state, to = %next, "{message}");
        self.state = next;
        self.events.push_back(LinkEvent::Status {
            state: next,
            connected: next.is_connected(),
            message,
        });
    }

    fn endpoint_label(&self) -> String {
        self.endpoint
            .as_ref()
            .map_or_else(|| "<none>".to_string(), ToString::to_string)
    }
}
