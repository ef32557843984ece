mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "mecalink",
    version,
    about = "Drive and simulate mecanum motion controllers"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mecalink_link::Mode;

    use super::*;
    use crate::cmd::SendCommand;

    #[test]
    fn parses_send_move_with_negative_values() {
        let cli = Cli::try_parse_from(["mecalink", "send", "robot:8080", "move", "100", "-50", "-3"])
            .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert!(matches!(
            args.command,
            SendCommand::Move {
                forward: 100,
                lateral: -50,
                rotation: -3
            }
        ));
        assert!(!args.wait);
    }

    #[test]
    fn parses_send_control_with_wait() {
        let cli = Cli::try_parse_from([
            "mecalink",
            "send",
            "robot",
            "control",
            "--primary",
            "--mode",
            "auto",
            "--wait",
            "--wait-timeout",
            "500ms",
        ])
        .expect("control args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert!(args.wait);
        assert_eq!(args.wait_timeout, Duration::from_millis(500));
        assert!(matches!(
            args.command,
            SendCommand::Control {
                primary: true,
                secondary: false,
                mode: Mode::Auto
            }
        ));
    }

    #[test]
    fn rejects_out_of_range_move() {
        let err = Cli::try_parse_from(["mecalink", "send", "robot", "move", "40000", "0", "0"])
            .expect_err("i16 overflow should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_drive_link_tuning() {
        let cli = Cli::try_parse_from([
            "mecalink",
            "drive",
            "10.0.0.5:8080",
            "--heartbeat",
            "1s",
            "--miss-limit",
            "5",
        ])
        .expect("drive args should parse");

        let Command::Drive(args) = cli.command else {
            panic!("expected drive");
        };
        assert_eq!(args.link.heartbeat, Duration::from_secs(1));
        assert_eq!(args.link.reconnect, Duration::from_secs(3));
        assert_eq!(args.link.miss_limit, 5);
    }

    #[test]
    fn parses_device_defaults() {
        let cli = Cli::try_parse_from(["mecalink", "device"]).expect("device args should parse");
        let Command::Device(args) = cli.command else {
            panic!("expected device");
        };
        assert_eq!(args.bind, "0.0.0.0:8080");
        assert_eq!(args.buffer, 128);
        assert_eq!(args.count, None);
    }

    #[test]
    fn parses_probe_subcommand() {
        let cli = Cli::try_parse_from(["mecalink", "probe", "robot", "--timeout", "3s", "--count", "5"])
            .expect("probe args should parse");
        assert!(matches!(cli.command, Command::Probe(_)));
    }

    #[test]
    fn bad_duration_is_rejected() {
        let err = Cli::try_parse_from(["mecalink", "probe", "robot", "--timeout", "soon"])
            .expect_err("duration should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
