use std::future::Future;
use std::time::Duration;

use clap::{Args, Subcommand};
use mecalink_link::{LinkConfig, Mode};
use mecalink_transport::Endpoint;
use tokio_util::sync::CancellationToken;

use crate::exit::{io_error, transport_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod device;
pub mod drive;
pub mod probe;
pub mod send;
pub mod session;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulated motion controller.
    Device(DeviceArgs),
    /// Drive interactively from stdin.
    Drive(DriveArgs),
    /// Send a single command.
    Send(SendArgs),
    /// Measure heartbeat round-trip time.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Device(args) => device::run(args, format),
        Command::Drive(args) => drive::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub bind: String,
    /// Reassembly buffer size in bytes.
    #[arg(long, default_value_t = 128)]
    pub buffer: usize,
    /// Do not send a heartbeat when a controller connects.
    #[arg(long)]
    pub no_greeting: bool,
    /// Do not echo accessory state after Control commands.
    #[arg(long)]
    pub no_control_echo: bool,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

/// Link supervision tuning shared by host-side commands.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Heartbeat period (e.g. 2s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "2s", value_parser = parse_duration)]
    pub heartbeat: Duration,
    /// Delay between reconnect attempts.
    #[arg(long, value_name = "DURATION", default_value = "3s", value_parser = parse_duration)]
    pub reconnect: Duration,
    /// Unanswered heartbeats tolerated before reconnecting.
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub miss_limit: u32,
}

impl LinkArgs {
    pub fn to_config(&self) -> LinkConfig {
        LinkConfig {
            heartbeat_interval: self.heartbeat,
            reconnect_interval: self.reconnect,
            heartbeat_miss_limit: self.miss_limit,
            ..LinkConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct DriveArgs {
    /// Device address (host:port).
    pub endpoint: String,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device address (host:port).
    pub endpoint: String,
    #[command(subcommand)]
    pub command: SendCommand,
    /// Wait for one reply command and print it.
    #[arg(long, global = true)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, global = true, default_value = "5s", value_parser = parse_duration)]
    pub wait_timeout: Duration,
    /// Maximum time to establish the connection.
    #[arg(long, global = true, default_value = "3s", value_parser = parse_duration)]
    pub timeout: Duration,
}

#[derive(Subcommand, Debug)]
pub enum SendCommand {
    /// Body velocity: forward, lateral, rotation.
    #[command(allow_negative_numbers = true)]
    Move {
        forward: i16,
        lateral: i16,
        rotation: i16,
    },
    /// Accessory toggles and device mode.
    Control {
        /// Switch the primary actuator on.
        #[arg(long)]
        primary: bool,
        /// Switch the secondary actuator on.
        #[arg(long)]
        secondary: bool,
        /// manual, auto, or a raw mode byte.
        #[arg(long, default_value = "manual", value_parser = parse_mode)]
        mode: Mode,
    },
    /// Advisory target coordinate.
    #[command(allow_negative_numbers = true)]
    Target { x: i16, y: i16 },
    /// A bare heartbeat.
    Heartbeat,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Device address (host:port).
    pub endpoint: String,
    /// Overall time budget (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub timeout: Duration,
    /// Number of heartbeat round trips to measure.
    #[arg(long, default_value_t = 3)]
    pub count: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_endpoint(input: &str) -> CliResult<Endpoint> {
    input
        .parse()
        .map_err(|err| transport_error("invalid endpoint", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn parse_mode(input: &str) -> CliResult<Mode> {
    match input.trim().to_ascii_lowercase().as_str() {
        "manual" => Ok(Mode::Manual),
        "auto" => Ok(Mode::Auto),
        other => other
            .parse::<u8>()
            .map(Mode::from)
            .map_err(|_| CliError::new(USAGE, format!("invalid mode: {input}"))),
    }
}

/// Run `future` to completion on a single-threaded runtime.
pub fn block_on<F: Future>(future: F) -> CliResult<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    let output = runtime.block_on(future);
    // Blocking stdin reads must not hold up process exit.
    runtime.shutdown_background();
    Ok(output)
}

pub fn cancel_on_ctrlc(cancel: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || cancel.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
