use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};

use bytes::{Buf, Bytes, BytesMut};
use mecalink_frame::{AssemblerStats, FrameAssembler};
use mecalink_motion::{mix, ActuatorDriver, WheelOutput, WheelSignal, WheelSpeeds};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::command::{dispatch, Command, ControlCommand, MoveCommand, TargetCommand};
use crate::config::DeviceConfig;

/// What the motion controller did in response to the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    Connected,
    /// The session ended and every wheel was braked.
    Disconnected,
    Moved {
        command: MoveCommand,
        speeds: WheelSpeeds,
        signals: [WheelSignal; 4],
    },
    Control { state: ControlCommand },
    Target { target: TargetCommand },
}

/// Outcome of one [`DeviceLink::poll`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Nothing to read right now.
    Idle,
    /// Bytes were consumed.
    Progress,
    /// The peer closed the stream.
    Closed,
}

/// Embedded endpoint of the link: decodes commands and drives the wheels.
///
/// Everything here returns promptly. Bytes go in through
/// [`on_bytes`](Self::on_bytes), replies accumulate until
/// [`take_outbound`](Self::take_outbound), and the wheels are braked whenever
/// no controller is connected.
pub struct DeviceLink<O> {
    config: DeviceConfig,
    assembler: FrameAssembler,
    driver: ActuatorDriver<O>,
    connected: bool,
    accessories: ControlCommand,
    target: Option<TargetCommand>,
    outbound: BytesMut,
    events: VecDeque<DeviceEvent>,
}

impl<O: WheelOutput> DeviceLink<O> {
    pub fn new(output: O, config: DeviceConfig) -> Self {
        Self {
            assembler: FrameAssembler::with_config(config.assembler),
            driver: ActuatorDriver::new(output),
            config,
            connected: false,
            accessories: ControlCommand::default(),
            target: None,
            outbound: BytesMut::new(),
            events: VecDeque::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Current accessory toggles and mode.
    pub fn accessories(&self) -> ControlCommand {
        self.accessories
    }

    /// Most recent advisory target, if any.
    pub fn target(&self) -> Option<TargetCommand> {
        self.target
    }

    pub fn driver(&self) -> &ActuatorDriver<O> {
        &self.driver
    }

    pub fn assembler_stats(&self) -> AssemblerStats {
        self.assembler.stats()
    }

    /// A controller connected. Starts a fresh session.
    pub fn on_connected(&mut self) {
        self.assembler.reset();
        self.outbound.clear();
        self.connected = true;
        if self.config.greet_on_connect {
            self.queue(&Command::Heartbeat);
        }
        self.events.push_back(DeviceEvent::Connected);
    }

    /// Feed newly arrived bytes.
    pub fn on_bytes(&mut self, data: &[u8]) {
        if !self.connected {
            trace!(len = data.len(), "bytes without session ignored");
            return;
        }
        for frame in self.assembler.push(data) {
            if let Some(command) = dispatch(&frame) {
                self.handle(command);
            }
        }
    }

    /// The controller went away. Brakes every wheel.
    pub fn on_disconnected(&mut self) {
        self.driver.brake_all();
        self.outbound.clear();
        if self.connected {
            self.connected = false;
            self.events.push_back(DeviceEvent::Disconnected);
        }
    }

    /// Take bytes waiting to be written to the controller.
    pub fn take_outbound(&mut self) -> Option<Bytes> {
        if self.outbound.is_empty() {
            None
        } else {
            Some(self.outbound.split().freeze())
        }
    }

    /// Take the oldest pending event.
    pub fn poll_event(&mut self) -> Option<DeviceEvent> {
        self.events.pop_front()
    }

    /// One cooperative pass over a non-blocking stream.
    ///
    /// Reads at most one chunk, then writes as much pending output as the
    /// stream accepts. `WouldBlock` on either side means "try again on the
    /// next pass". Any other I/O error ends the session (wheels braked) and is
    /// returned to the caller.
    pub fn poll<S: Read + Write>(
        &mut self,
        stream: &mut S,
        buf: &mut [u8],
    ) -> io::Result<PollStatus> {
        let status = match stream.read(buf) {
            Ok(0) => {
                self.on_disconnected();
                return Ok(PollStatus::Closed);
            }
            Ok(n) => {
                self.on_bytes(&buf[..n]);
                PollStatus::Progress
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                PollStatus::Idle
            }
            Err(err) => {
                self.on_disconnected();
                return Err(err);
            }
        };

        while !self.outbound.is_empty() {
            match stream.write(&self.outbound) {
                Ok(0) => {
                    self.on_disconnected();
                    return Err(ErrorKind::WriteZero.into());
                }
                Ok(n) => self.outbound.advance(n),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.on_disconnected();
                    return Err(err);
                }
            }
        }
        Ok(status)
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Heartbeat => {
                trace!("heartbeat echoed");
                self.queue(&Command::Heartbeat);
            }
            Command::Move(command) => {
                let speeds = mix(command.forward, command.lateral, command.rotation);
                self.driver.apply_all(&speeds);
                debug!(?speeds, "move applied");
                self.events.push_back(DeviceEvent::Moved {
                    command,
                    speeds,
                    signals: self.driver.signals(),
                });
            }
            Command::Control(state) => {
                info!(
                    primary = state.primary,
                    secondary = state.secondary,
                    mode = ?state.mode,
                    "accessory state updated"
                );
                self.accessories = state;
                if self.config.echo_control {
                    self.queue(&Command::Control(state));
                }
                self.events.push_back(DeviceEvent::Control { state });
            }
            Command::Target(target) => {
                info!(x = target.x, y = target.y, "target received");
                self.target = Some(target);
                self.events.push_back(DeviceEvent::Target { target });
            }
        }
    }

    fn queue(&mut self, command: &Command) {
        if let Err(err) = command.to_frame().encode(&mut self.outbound) {
            warn!(error = %err, "reply dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use mecalink_frame::FrameAssembler;
    use mecalink_motion::{Direction, SimulatedOutputs, Wheel};

    use super::*;
    use crate::command::Mode;

    /// Non-blocking stream double: scripted reads, a write budget per call.
    struct MockStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
        write_budget: Option<usize>,
    }

    impl MockStream {
        fn new(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into(),
                written: Vec::new(),
                write_budget: None,
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(err)) => Err(err),
                None => Err(ErrorKind::WouldBlock.into()),
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.write_budget {
                Some(0) => Err(ErrorKind::WouldBlock.into()),
                Some(budget) => {
                    let n = budget.min(buf.len());
                    self.written.extend_from_slice(&buf[..n]);
                    self.write_budget = Some(budget - n);
                    Ok(n)
                }
                None => {
                    self.written.extend_from_slice(buf);
                    Ok(buf.len())
                }
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn device() -> DeviceLink<SimulatedOutputs> {
        DeviceLink::new(SimulatedOutputs::new(), DeviceConfig::default())
    }

    fn bytes(command: Command) -> Vec<u8> {
        command.to_frame().to_bytes().unwrap().to_vec()
    }

    fn decode_all(data: &[u8]) -> Vec<Command> {
        let mut assembler = FrameAssembler::new();
        assembler
            .push(data)
            .iter()
            .filter_map(|f| Command::from_frame(f).ok())
            .collect()
    }

    #[test]
    fn wheels_braked_before_any_session() {
        let dev = device();
        for wheel in Wheel::ALL {
            assert!(dev.driver().output().signal(wheel).is_brake());
        }
    }

    #[test]
    fn greets_on_connect() {
        let mut dev = device();
        dev.on_connected();
        let out = dev.take_outbound().unwrap();
        assert_eq!(decode_all(&out), vec![Command::Heartbeat]);
        assert_eq!(dev.take_outbound(), None);
        assert_eq!(dev.poll_event(), Some(DeviceEvent::Connected));
    }

    #[test]
    fn greeting_can_be_disabled() {
        let config = DeviceConfig {
            greet_on_connect: false,
            ..DeviceConfig::default()
        };
        let mut dev = DeviceLink::new(SimulatedOutputs::new(), config);
        dev.on_connected();
        assert_eq!(dev.take_outbound(), None);
    }

    #[test]
    fn echoes_every_heartbeat() {
        let mut dev = device();
        dev.on_connected();
        dev.take_outbound();

        let mut input = bytes(Command::Heartbeat);
        input.extend(bytes(Command::Heartbeat));
        dev.on_bytes(&input);
        let out = dev.take_outbound().unwrap();
        assert_eq!(decode_all(&out), vec![Command::Heartbeat, Command::Heartbeat]);
    }

    #[test]
    fn heartbeat_with_payload_is_not_echoed() {
        let mut dev = device();
        dev.on_connected();
        dev.take_outbound();

        let malformed = mecalink_frame::Frame::new(mecalink_frame::HEARTBEAT, vec![1, 2, 3]);
        dev.on_bytes(&malformed.to_bytes().unwrap());
        assert_eq!(dev.take_outbound(), None);
        assert_eq!(dev.assembler_stats().frames, 1);
    }

    #[test]
    fn move_drives_wheels_through_kinematics() {
        let mut dev = device();
        dev.on_connected();
        dev.poll_event();

        dev.on_bytes(&bytes(Command::Move(MoveCommand::new(0, 0, 100))));
        let out = dev.driver().output();
        assert_eq!(out.signal(Wheel::FrontLeft).direction(), Direction::Forward);
        assert_eq!(out.signal(Wheel::FrontRight).direction(), Direction::Reverse);
        assert_eq!(out.signal(Wheel::RearRight).direction(), Direction::Reverse);
        assert_eq!(out.signal(Wheel::RearLeft).direction(), Direction::Forward);

        match dev.poll_event() {
            Some(DeviceEvent::Moved { speeds, .. }) => assert_eq!(speeds.front_right, -100),
            other => panic!("unexpected event {other:?}"),
        }
        // Move has no reply.
        assert_eq!(dev.take_outbound(), None);
    }

    #[test]
    fn stop_command_brakes() {
        let mut dev = device();
        dev.on_connected();
        dev.on_bytes(&bytes(Command::Move(MoveCommand::new(150, 0, 0))));
        dev.on_bytes(&bytes(Command::Move(MoveCommand::STOP)));
        assert!(dev.driver().signals().iter().all(WheelSignal::is_brake));
    }

    #[test]
    fn control_updates_state_and_echoes() {
        let mut dev = device();
        dev.on_connected();
        dev.take_outbound();

        let state = ControlCommand {
            primary: true,
            secondary: false,
            mode: Mode::Auto,
        };
        dev.on_bytes(&bytes(Command::Control(state)));
        assert_eq!(dev.accessories(), state);
        assert_eq!(
            decode_all(&dev.take_outbound().unwrap()),
            vec![Command::Control(state)]
        );
    }

    #[test]
    fn target_is_retained() {
        let mut dev = device();
        dev.on_connected();
        dev.on_bytes(&bytes(Command::Target(TargetCommand { x: 12, y: -4 })));
        assert_eq!(dev.target(), Some(TargetCommand { x: 12, y: -4 }));
    }

    #[test]
    fn disconnect_brakes_all_wheels() {
        let mut dev = device();
        dev.on_connected();
        dev.on_bytes(&bytes(Command::Move(MoveCommand::new(200, 0, 0))));
        assert!(!dev.driver().signal(Wheel::FrontLeft).is_brake());

        dev.on_disconnected();
        for wheel in Wheel::ALL {
            assert!(dev.driver().output().signal(wheel).is_brake());
        }
        assert!(!dev.is_connected());
    }

    #[test]
    fn malformed_frames_are_dropped_silently() {
        let mut dev = device();
        dev.on_connected();
        dev.take_outbound();
        while dev.poll_event().is_some() {}

        let mut input = vec![0xAA, 0x01, 0x02, 0x00, 0x00, 0x55];
        input.extend([0xAA, 0x7E, 0x00, 0x55]);
        dev.on_bytes(&input);
        assert_eq!(dev.poll_event(), None);
        assert_eq!(dev.take_outbound(), None);
    }

    #[test]
    fn poll_reads_and_replies_on_nonblocking_stream() {
        let mut dev = device();
        dev.on_connected();
        let hb = bytes(Command::Heartbeat);
        let mut stream = MockStream::new(vec![Ok(hb[..2].to_vec()), Ok(hb[2..].to_vec())]);
        let mut buf = [0u8; 64];

        assert_eq!(dev.poll(&mut stream, &mut buf).unwrap(), PollStatus::Progress);
        // Greeting flushed on the first pass.
        assert_eq!(decode_all(&stream.written), vec![Command::Heartbeat]);

        assert_eq!(dev.poll(&mut stream, &mut buf).unwrap(), PollStatus::Progress);
        assert_eq!(
            decode_all(&stream.written),
            vec![Command::Heartbeat, Command::Heartbeat]
        );

        assert_eq!(dev.poll(&mut stream, &mut buf).unwrap(), PollStatus::Idle);
    }

    #[test]
    fn poll_keeps_unwritten_bytes_for_next_pass() {
        let mut dev = device();
        dev.on_connected();
        let mut stream = MockStream::new(vec![]);
        stream.write_budget = Some(1);
        let mut buf = [0u8; 16];

        assert_eq!(dev.poll(&mut stream, &mut buf).unwrap(), PollStatus::Idle);
        assert_eq!(stream.written, vec![0xAA]);

        stream.write_budget = None;
        dev.poll(&mut stream, &mut buf).unwrap();
        assert_eq!(stream.written, bytes(Command::Heartbeat));
    }

    #[test]
    fn poll_eof_closes_session() {
        let mut dev = device();
        dev.on_connected();
        dev.on_bytes(&bytes(Command::Move(MoveCommand::new(50, 0, 0))));
        let mut stream = MockStream::new(vec![Ok(Vec::new())]);
        let mut buf = [0u8; 16];

        assert_eq!(dev.poll(&mut stream, &mut buf).unwrap(), PollStatus::Closed);
        assert!(!dev.is_connected());
        assert!(dev.driver().signals().iter().all(WheelSignal::is_brake));
    }

    #[test]
    fn poll_error_brakes_and_propagates() {
        let mut dev = device();
        dev.on_connected();
        let mut stream = MockStream::new(vec![Err(ErrorKind::ConnectionReset.into())]);
        let mut buf = [0u8; 16];

        let err = dev.poll(&mut stream, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
        assert!(!dev.is_connected());
    }
}
