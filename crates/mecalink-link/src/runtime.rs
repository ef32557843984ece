//! Tokio runtimes for both ends of the link.
//!
//! Each runtime is one task that owns its state machine outright. Socket
//! reads, operator requests and timer deadlines are multiplexed with
//! `tokio::select!`, so the supervisor and device are only ever touched from
//! that task.

use std::future::{pending, Future};
use std::io;
use std::pin::Pin;
use std::time::{Duration, Instant};

use bytes::Bytes;
use mecalink_motion::WheelOutput;
use mecalink_transport::{
    connect, Endpoint, QueuedTransport, TcpServer, TransportCommand, TransportEvent,
};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::command::{Command, TargetCommand};
use crate::config::LinkConfig;
use crate::device::{DeviceEvent, DeviceLink};
use crate::error::{LinkError, Result};
use crate::intent::{Intent, OperatorConsole};
use crate::state::LinkEvent;
use crate::supervisor::LinkSupervisor;

const READ_CHUNK: usize = 512;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

type ConnectFuture =
    Pin<Box<dyn Future<Output = mecalink_transport::Result<TcpStream>> + Send>>;

/// Requests accepted by [`run_host`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    Connect(Endpoint),
    Disconnect,
    Send(Command),
    /// Send a heartbeat now and report its round-trip time.
    Heartbeat,
    Intent(Intent),
}

/// Cloneable sender side of a host runtime.
///
/// Requests are fire-and-forget; their outcome shows up as [`LinkEvent`]s.
#[derive(Debug, Clone)]
pub struct HostHandle {
    requests: mpsc::UnboundedSender<HostRequest>,
}

impl HostHandle {
    pub fn connect(&self, endpoint: Endpoint) -> Result<()> {
        self.request(HostRequest::Connect(endpoint))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.request(HostRequest::Disconnect)
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.request(HostRequest::Send(command))
    }

    pub fn send_target(&self, x: i16, y: i16) -> Result<()> {
        self.send(Command::Target(TargetCommand { x, y }))
    }

    pub fn heartbeat(&self) -> Result<()> {
        self.request(HostRequest::Heartbeat)
    }

    pub fn intent(&self, intent: Intent) -> Result<()> {
        self.request(HostRequest::Intent(intent))
    }

    fn request(&self, request: HostRequest) -> Result<()> {
        self.requests.send(request).map_err(|_| LinkError::Closed)
    }
}

/// Create a handle and the request stream to pass to [`run_host`].
pub fn host_channel() -> (HostHandle, mpsc::UnboundedReceiver<HostRequest>) {
    let (requests, receiver) = mpsc::unbounded_channel();
    (HostHandle { requests }, receiver)
}

/// Live socket halves for the current session.
#[derive(Default)]
struct Session {
    reader: Option<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    pending: Option<ConnectFuture>,
}

impl Session {
    fn close(&mut self) {
        self.reader = None;
        self.writer = None;
        self.pending = None;
    }
}

/// Drive a host-side link until `cancel` fires or every handle is dropped.
///
/// Link events, including every state change, are forwarded to `events`.
pub async fn run_host(
    config: LinkConfig,
    mut requests: mpsc::UnboundedReceiver<HostRequest>,
    events: mpsc::UnboundedSender<LinkEvent>,
    cancel: CancellationToken,
) {
    let limits = IoLimits {
        connect: config.connect_timeout,
        write: config.heartbeat_interval,
    };
    let mut supervisor = LinkSupervisor::new(QueuedTransport::new(), config);
    let mut console = OperatorConsole::new();
    let mut session = Session::default();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let deadline = supervisor.next_deadline();
        tokio::select! {
            _ = cancel.cancelled() => {
                // Requests issued before cancellation still go out.
                while let Ok(request) = requests.try_recv() {
                    handle_request(&mut supervisor, &mut console, request);
                    execute(&mut supervisor, &mut session, limits).await;
                }
                break;
            }
            request = requests.recv() => match request {
                Some(request) => handle_request(&mut supervisor, &mut console, request),
                None => break,
            },
            outcome = wait_connect(&mut session.pending) => {
                session.pending = None;
                match outcome {
                    Ok(stream) => {
                        let (reader, writer) = stream.into_split();
                        session.reader = Some(reader);
                        session.writer = Some(writer);
                        supervisor.on_transport_event(TransportEvent::Connected, Instant::now());
                    }
                    Err(err) => supervisor.on_transport_event(
                        TransportEvent::ConnectFailed(err.to_string()),
                        Instant::now(),
                    ),
                }
            }
            read = read_some(&mut session.reader, &mut buf) => match read {
                Ok(0) => {
                    debug!("peer closed the stream");
                    session.close();
                    supervisor.on_transport_event(TransportEvent::Disconnected, Instant::now());
                }
                Ok(n) => supervisor.on_transport_event(
                    TransportEvent::Data(Bytes::copy_from_slice(&buf[..n])),
                    Instant::now(),
                ),
                Err(err) => {
                    debug!(error = %err, "read failed");
                    session.close();
                    supervisor.on_transport_event(TransportEvent::Disconnected, Instant::now());
                }
            },
            _ = sleep_until(deadline) => supervisor.tick(Instant::now()),
        }

        execute(&mut supervisor, &mut session, limits).await;
        forward(&mut supervisor, &events);
    }

    supervisor.disconnect();
    execute(&mut supervisor, &mut session, limits).await;
    forward(&mut supervisor, &events);
    debug!("host runtime stopped");
}

fn handle_request(
    supervisor: &mut LinkSupervisor<QueuedTransport>,
    console: &mut OperatorConsole,
    request: HostRequest,
) {
    trace!(?request, "host request");
    let outcome = match request {
        HostRequest::Connect(endpoint) => {
            supervisor.connect(endpoint);
            Ok(())
        }
        HostRequest::Disconnect => {
            supervisor.disconnect();
            Ok(())
        }
        HostRequest::Send(command) => supervisor.send(&command),
        HostRequest::Heartbeat => supervisor.send_heartbeat(Instant::now()),
        HostRequest::Intent(intent) => {
            match console.apply(intent, supervisor.is_connected()) {
                Some(command) => supervisor.send(&command),
                None => Ok(()),
            }
        }
    };
    if let Err(err) = outcome {
        debug!(error = %err, "request not carried out");
    }
}

/// Time bounds for socket operations started by [`execute`].
#[derive(Debug, Clone, Copy)]
struct IoLimits {
    connect: Duration,
    /// A peer that stops reading must not stall the loop past one heartbeat.
    write: Duration,
}

/// Carry out everything the supervisor asked of its transport.
async fn execute(
    supervisor: &mut LinkSupervisor<QueuedTransport>,
    session: &mut Session,
    limits: IoLimits,
) {
    while let Some(command) = supervisor.transport_mut().pop_command() {
        match command {
            TransportCommand::Connect(endpoint) => {
                session.close();
                let timeout = limits.connect;
                session.pending = Some(Box::pin(async move {
                    connect(&endpoint, timeout).await
                }));
            }
            TransportCommand::Write(bytes) => {
                let Some(writer) = session.writer.as_mut() else {
                    debug!(len = bytes.len(), "write without stream dropped");
                    continue;
                };
                if let Err(err) = write_bounded(writer, &bytes, limits.write).await {
                    warn!(error = %err, len = bytes.len(), "write failed");
                    session.close();
                    supervisor.on_transport_event(TransportEvent::Disconnected, Instant::now());
                }
            }
            TransportCommand::Disconnect => {
                if let Some(mut writer) = session.writer.take() {
                    if let Err(err) = writer.shutdown().await {
                        debug!(error = %err, "shutdown failed");
                    }
                }
                session.close();
            }
            TransportCommand::Abort => session.close(),
        }
    }
}

async fn write_bounded<W: AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &[u8],
    limit: Duration,
) -> io::Result<()> {
    match tokio::time::timeout(limit, writer.write_all(bytes)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("peer not reading for {limit:?}"),
        )),
    }
}

fn forward(
    supervisor: &mut LinkSupervisor<QueuedTransport>,
    events: &mpsc::UnboundedSender<LinkEvent>,
) {
    while let Some(event) = supervisor.poll_event() {
        if events.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
}

async fn wait_connect(
    pending_connect: &mut Option<ConnectFuture>,
) -> mecalink_transport::Result<TcpStream> {
    match pending_connect {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn read_some(reader: &mut Option<OwnedReadHalf>, buf: &mut [u8]) -> io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => pending().await,
    }
}

/// Serve controllers on `server`, one connection at a time, until `cancel`
/// fires.
///
/// Every device event is forwarded to `events`. The wheels are braked
/// between sessions.
pub async fn serve_device<O: WheelOutput>(
    server: &TcpServer,
    device: &mut DeviceLink<O>,
    events: mpsc::UnboundedSender<DeviceEvent>,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = server.accept() => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        info!(%peer, "controller connected");
        device.on_connected();
        serve_connection(stream, device, &events, &cancel).await;
        device.on_disconnected();
        forward_device(device, &events);
        info!(%peer, "controller disconnected");
    }
    debug!("device runtime stopped");
}

async fn serve_connection<O: WheelOutput>(
    stream: TcpStream,
    device: &mut DeviceLink<O>,
    events: &mpsc::UnboundedSender<DeviceEvent>,
    cancel: &CancellationToken,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        if let Some(out) = device.take_outbound() {
            if let Err(err) = writer.write_all(&out).await {
                warn!(error = %err, "write failed");
                return;
            }
        }
        forward_device(device, events);

        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = reader.read(&mut buf) => read,
        };
        match read {
            Ok(0) => return,
            Ok(n) => device.on_bytes(&buf[..n]),
            Err(err) => {
                debug!(error = %err, "read failed");
                return;
            }
        }
    }
}

fn forward_device<O: WheelOutput>(
    device: &mut DeviceLink<O>,
    events: &mpsc::UnboundedSender<DeviceEvent>,
) {
    while let Some(event) = device.poll_event() {
        if events.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
}
