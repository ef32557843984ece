use mecalink_frame::{AssemblerConfig, MIN_FRAME_SIZE};
use mecalink_link::{serve_device, DeviceConfig, DeviceEvent, DeviceLink};
use mecalink_motion::SimulatedOutputs;
use mecalink_transport::{Endpoint, TcpServer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::{block_on, cancel_on_ctrlc, parse_endpoint, DeviceArgs};
use crate::exit::{transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_device_event, OutputFormat};

pub fn run(args: DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.bind)?;
    if args.buffer < MIN_FRAME_SIZE {
        return Err(CliError::new(
            USAGE,
            format!("--buffer must hold at least one frame ({MIN_FRAME_SIZE} bytes)"),
        ));
    }
    if args.count == Some(0) {
        return Err(CliError::new(USAGE, "--count must be greater than zero"));
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrlc(cancel.clone())?;
    block_on(serve(endpoint, args, format, cancel))?
}

async fn serve(
    endpoint: Endpoint,
    args: DeviceArgs,
    format: OutputFormat,
    cancel: CancellationToken,
) -> CliResult<i32> {
    let server = TcpServer::bind(&endpoint)
        .await
        .map_err(|err| transport_error("bind failed", err))?;

    let config = DeviceConfig {
        assembler: AssemblerConfig {
            capacity: args.buffer,
        },
        greet_on_connect: !args.no_greeting,
        echo_control: !args.no_control_echo,
    };
    let mut device = DeviceLink::new(SimulatedOutputs::new(), config);
    let (events_tx, mut events) = mpsc::unbounded_channel::<DeviceEvent>();

    let limit = args.count;
    let printer_cancel = cancel.clone();
    let printer = async move {
        let mut printed = 0usize;
        while let Some(event) = events.recv().await {
            print_device_event(&event, format);
            printed += 1;
            if limit.is_some_and(|limit| printed >= limit) {
                printer_cancel.cancel();
                break;
            }
        }
        printed
    };

    let ((), printed) = tokio::join!(
        serve_device(&server, &mut device, events_tx, cancel.clone()),
        printer
    );
    info!(events = printed, writes = device.driver().output().writes(), "device stopped");
    Ok(SUCCESS)
}
