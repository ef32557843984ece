use std::time::Duration;

use mecalink_link::{Command, ControlCommand, LinkConfig, LinkEvent, MoveCommand, TargetCommand};
use mecalink_transport::Endpoint;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::session::{runtime_connect_timeout, HostSession};
use crate::cmd::{block_on, cancel_on_ctrlc, parse_endpoint, SendArgs, SendCommand};
use crate::exit::{link_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{describe_command, print_link_event, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let command = to_command(&args.command);

    let cancel = CancellationToken::new();
    cancel_on_ctrlc(cancel.clone())?;
    block_on(send(endpoint, command, &args, format, cancel))?
}

fn to_command(command: &SendCommand) -> Command {
    match *command {
        SendCommand::Move {
            forward,
            lateral,
            rotation,
        } => Command::Move(MoveCommand::new(forward, lateral, rotation)),
        SendCommand::Control {
            primary,
            secondary,
            mode,
        } => Command::Control(ControlCommand {
            primary,
            secondary,
            mode,
        }),
        SendCommand::Target { x, y } => Command::Target(TargetCommand { x, y }),
        SendCommand::Heartbeat => Command::Heartbeat,
    }
}

async fn send(
    endpoint: Endpoint,
    command: Command,
    args: &SendArgs,
    format: OutputFormat,
    cancel: CancellationToken,
) -> CliResult<i32> {
    let config = LinkConfig {
        connect_timeout: runtime_connect_timeout(args.timeout),
        ..LinkConfig::default()
    };
    let mut session = HostSession::start(config, cancel);

    let result = exchange(&mut session, endpoint, command, args, format).await;
    session.close().await;
    result
}

async fn exchange(
    session: &mut HostSession,
    endpoint: Endpoint,
    command: Command,
    args: &SendArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    session.connect(endpoint.clone(), args.timeout).await?;
    session
        .handle
        .send(command)
        .map_err(|err| link_error("send failed", err))?;
    info!(%endpoint, command = %describe_command(&command), "sent");

    if args.wait {
        let reply = wait_for_reply(session, args.wait_timeout).await?;
        print_link_event(&reply, format);
    }
    Ok(SUCCESS)
}

/// Wait for the first non-heartbeat command from the device.
async fn wait_for_reply(session: &mut HostSession, timeout: Duration) -> CliResult<LinkEvent> {
    let deadline = Instant::now() + timeout;
    while let Some(event) = session.next_event(deadline).await {
        if matches!(event, LinkEvent::Received { .. }) {
            return Ok(event);
        }
    }
    Err(CliError::new(
        TIMEOUT,
        format!("no reply within {timeout:?}"),
    ))
}
