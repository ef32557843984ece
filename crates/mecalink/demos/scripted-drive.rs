//! Scripted host: connect, drive a short square, stop.
//!
//! Run with:
//!   cargo run --example scripted-drive --features async -- 127.0.0.1:8080

use std::time::Duration;

use mecalink::link::{host_channel, run_host, DriveDirection, Intent, LinkConfig, LinkEvent};
use mecalink::transport::Endpoint;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint: Endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()?;

    let cancel = CancellationToken::new();
    let (handle, requests) = host_channel();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let host = tokio::spawn(run_host(
        LinkConfig::default(),
        requests,
        events_tx,
        cancel.clone(),
    ));

    handle.connect(endpoint)?;
    while let Some(event) = events.recv().await {
        eprintln!("{event:?}");
        if matches!(event, LinkEvent::Status { connected: true, .. }) {
            break;
        }
    }

    handle.intent(Intent::SetSpeed(40))?;
    for direction in [
        DriveDirection::Forward,
        DriveDirection::Right,
        DriveDirection::Backward,
        DriveDirection::Left,
    ] {
        handle.intent(Intent::Press(direction))?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.intent(Intent::Release)?;
    }

    handle.disconnect()?;
    cancel.cancel();
    host.await?;
    Ok(())
}
