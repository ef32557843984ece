use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mecalink_link::{Command, DeviceEvent, LinkEvent, Mode};
use mecalink_motion::{Direction, Wheel};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct Timestamped<'a, T: Serialize> {
    timestamp: String,
    #[serde(flatten)]
    body: &'a T,
}

/// One JSON object per line, stamped with the wall-clock second.
pub fn print_json<T: Serialize>(body: &T) {
    let out = Timestamped {
        timestamp: now_unix_seconds(),
        body,
    };
    println!(
        "{}",
        serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn print_link_event(event: &LinkEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(event),
        OutputFormat::Table => {
            let (name, detail) = link_event_parts(event);
            print_table(&["EVENT", "DETAIL"], vec![vec![name.to_string(), detail]]);
        }
        OutputFormat::Pretty => {
            let (name, detail) = link_event_parts(event);
            println!("{name:<9} {detail}");
        }
        OutputFormat::Raw => {
            if let LinkEvent::Received { command } = event {
                print_command_bytes(command);
            }
        }
    }
}

pub fn print_device_event(event: &DeviceEvent, format: OutputFormat) {
    match (format, event) {
        (OutputFormat::Json, _) => print_json(event),
        (OutputFormat::Table, DeviceEvent::Moved { speeds, signals, .. }) => {
            let rows = Wheel::ALL
                .iter()
                .zip(signals)
                .map(|(wheel, signal)| {
                    vec![
                        wheel.name().to_string(),
                        speeds.get(*wheel).to_string(),
                        direction_name(signal.direction()).to_string(),
                        u8::from(signal.in1).to_string(),
                        u8::from(signal.in2).to_string(),
                        signal.duty.to_string(),
                    ]
                })
                .collect();
            print_table(&["WHEEL", "SPEED", "DIRECTION", "IN1", "IN2", "DUTY"], rows);
        }
        (OutputFormat::Table, _) => {
            let (name, detail) = device_event_parts(event);
            print_table(&["EVENT", "DETAIL"], vec![vec![name.to_string(), detail]]);
        }
        (OutputFormat::Pretty, _) => {
            let (name, detail) = device_event_parts(event);
            println!("{name:<9} {detail}");
        }
        (OutputFormat::Raw, DeviceEvent::Moved { command, .. }) => {
            print_command_bytes(&Command::Move(*command));
        }
        (OutputFormat::Raw, DeviceEvent::Control { state }) => {
            print_command_bytes(&Command::Control(*state));
        }
        (OutputFormat::Raw, DeviceEvent::Target { target }) => {
            print_command_bytes(&Command::Target(*target));
        }
        (OutputFormat::Raw, _) => {}
    }
}

/// One-line human description of a command.
pub fn describe_command(command: &Command) -> String {
    match command {
        Command::Heartbeat => "heartbeat".to_string(),
        Command::Move(m) => format!(
            "move forward={} lateral={} rotation={}",
            m.forward, m.lateral, m.rotation
        ),
        Command::Control(c) => format!(
            "control primary={} secondary={} mode={}",
            on_off(c.primary),
            on_off(c.secondary),
            mode_name(c.mode)
        ),
        Command::Target(t) => format!("target x={} y={}", t.x, t.y),
    }
}

pub fn mode_name(mode: Mode) -> String {
    match mode {
        Mode::Manual => "manual".to_string(),
        Mode::Auto => "auto".to_string(),
        Mode::Other(value) => format!("0x{value:02x}"),
    }
}

fn link_event_parts(event: &LinkEvent) -> (&'static str, String) {
    match event {
        LinkEvent::Status { state, message, .. } => ("status", format!("[{state}] {message}")),
        LinkEvent::Received { command } => ("received", describe_command(command)),
        LinkEvent::Heartbeat { rtt: Some(rtt) } => (
            "heartbeat",
            format!("rtt={:.1}ms", rtt.as_secs_f64() * 1000.0),
        ),
        LinkEvent::Heartbeat { rtt: None } => ("heartbeat", "unsolicited".to_string()),
    }
}

fn device_event_parts(event: &DeviceEvent) -> (&'static str, String) {
    match event {
        DeviceEvent::Connected => ("session", "controller connected".to_string()),
        DeviceEvent::Disconnected => ("session", "controller gone, wheels braked".to_string()),
        DeviceEvent::Moved {
            command, signals, ..
        } => {
            let wheels = Wheel::ALL
                .iter()
                .zip(signals)
                .map(|(wheel, signal)| {
                    format!(
                        "{}={}:{}",
                        wheel.name(),
                        direction_name(signal.direction()),
                        signal.duty
                    )
                })
                .collect::<Vec<_>>()
                .join(" ");
            (
                "moved",
                format!("{} | {wheels}", describe_command(&Command::Move(*command))),
            )
        }
        DeviceEvent::Control { state } => {
            ("control", describe_command(&Command::Control(*state)))
        }
        DeviceEvent::Target { target } => ("target", describe_command(&Command::Target(*target))),
    }
}

fn direction_name(direction: Direction) -> &'static str {
    match direction {
        Direction::Forward => "fwd",
        Direction::Reverse => "rev",
        Direction::Brake => "brake",
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn print_command_bytes(command: &Command) {
    if let Ok(bytes) = command.to_frame().to_bytes() {
        print_raw(&bytes);
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
