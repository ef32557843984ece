use std::io::BufRead;

use mecalink_link::{DriveDirection, Intent, LinkConfig, MAX_LEVEL};
use mecalink_transport::Endpoint;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cmd::session::HostSession;
use crate::cmd::{block_on, cancel_on_ctrlc, parse_endpoint, DriveArgs};
use crate::exit::{io_error, link_error, CliResult, SUCCESS};
use crate::output::{print_link_event, OutputFormat};

const HELP: &str = "keys: w/s/a/d move, q/e rotate, x stop, speed N, enable, target X Y, quit";

/// One line of operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveLine {
    Intent(Intent),
    Target(i16, i16),
    Help,
    Quit,
}

/// Parse one stdin line. A blank line releases the drive buttons.
pub fn parse_line(line: &str) -> Result<DriveLine, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(DriveLine::Intent(Intent::Release));
    };

    let parsed = match word.to_ascii_lowercase().as_str() {
        "w" => DriveLine::Intent(Intent::Press(DriveDirection::Forward)),
        "s" => DriveLine::Intent(Intent::Press(DriveDirection::Backward)),
        "a" => DriveLine::Intent(Intent::Press(DriveDirection::Left)),
        "d" => DriveLine::Intent(Intent::Press(DriveDirection::Right)),
        "q" => DriveLine::Intent(Intent::Press(DriveDirection::RotateLeft)),
        "e" => DriveLine::Intent(Intent::Press(DriveDirection::RotateRight)),
        "x" | "stop" => DriveLine::Intent(Intent::Release),
        "enable" | "toggle" => DriveLine::Intent(Intent::ToggleEnable),
        "speed" => {
            let level = words
                .next()
                .and_then(|word| word.parse::<u8>().ok())
                .filter(|level| *level <= MAX_LEVEL)
                .ok_or_else(|| format!("speed takes a value from 0 to {MAX_LEVEL}"))?;
            DriveLine::Intent(Intent::SetSpeed(level))
        }
        "target" => {
            let mut coord = || words.next().and_then(|word| word.parse::<i16>().ok());
            match (coord(), coord()) {
                (Some(x), Some(y)) => DriveLine::Target(x, y),
                _ => return Err("target takes two integer coordinates".to_string()),
            }
        }
        "help" | "?" => DriveLine::Help,
        "quit" | "exit" => DriveLine::Quit,
        other => return Err(format!("unknown input: {other}")),
    };

    if words.next().is_some() {
        return Err(format!("unexpected trailing input: {}", line.trim()));
    }
    Ok(parsed)
}

pub fn run(args: DriveArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let config = args.link.to_config();

    let cancel = CancellationToken::new();
    cancel_on_ctrlc(cancel.clone())?;
    block_on(drive(endpoint, config, format, cancel))?
}

async fn drive(
    endpoint: Endpoint,
    config: LinkConfig,
    format: OutputFormat,
    cancel: CancellationToken,
) -> CliResult<i32> {
    let mut session = HostSession::start(config, cancel.clone());
    session
        .handle
        .connect(endpoint)
        .map_err(|err| link_error("connect request failed", err))?;

    let mut lines = spawn_stdin_reader();
    eprintln!("{HELP}");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = session.events.recv() => match event {
                Some(event) => print_link_event(&event, format),
                None => break,
            },
            line = lines.recv() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(err)) => return Err(io_error("stdin read failed", err)),
                    None => {
                        debug!("stdin closed");
                        break;
                    }
                };
                let outcome = match parse_line(&line) {
                    Ok(DriveLine::Quit) => break,
                    Ok(DriveLine::Help) => {
                        eprintln!("{HELP}");
                        Ok(())
                    }
                    Ok(DriveLine::Intent(intent)) => session.handle.intent(intent),
                    Ok(DriveLine::Target(x, y)) => session.handle.send_target(x, y),
                    Err(message) => {
                        eprintln!("{message}");
                        Ok(())
                    }
                };
                outcome.map_err(|err| link_error("request failed", err))?;
            }
        }
    }

    for event in session.close().await {
        print_link_event(&event, format);
    }
    Ok(SUCCESS)
}

/// Read stdin on a dedicated thread. The receiver closes at end of input.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_drive_buttons() {
        assert_eq!(
            parse_line("w"),
            Ok(DriveLine::Intent(Intent::Press(DriveDirection::Forward)))
        );
        assert_eq!(
            parse_line(" D "),
            Ok(DriveLine::Intent(Intent::Press(DriveDirection::Right)))
        );
        assert_eq!(
            parse_line("q"),
            Ok(DriveLine::Intent(Intent::Press(DriveDirection::RotateLeft)))
        );
    }

    #[test]
    fn blank_line_and_x_release() {
        assert_eq!(parse_line(""), Ok(DriveLine::Intent(Intent::Release)));
        assert_eq!(parse_line("x"), Ok(DriveLine::Intent(Intent::Release)));
    }

    #[test]
    fn speed_is_bounded() {
        assert_eq!(
            parse_line("speed 75"),
            Ok(DriveLine::Intent(Intent::SetSpeed(75)))
        );
        assert!(parse_line("speed 101").is_err());
        assert!(parse_line("speed").is_err());
    }

    #[test]
    fn target_takes_signed_coordinates() {
        assert_eq!(parse_line("target -20 35"), Ok(DriveLine::Target(-20, 35)));
        assert!(parse_line("target 1").is_err());
        assert!(parse_line("target 1 2 3").is_err());
    }

    #[test]
    fn misc_commands() {
        assert_eq!(
            parse_line("enable"),
            Ok(DriveLine::Intent(Intent::ToggleEnable))
        );
        assert_eq!(parse_line("quit"), Ok(DriveLine::Quit));
        assert_eq!(parse_line("?"), Ok(DriveLine::Help));
        assert!(parse_line("jump").is_err());
    }
}
