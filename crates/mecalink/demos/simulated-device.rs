//! Motion controller simulator driven by a cooperative, non-blocking loop.
//!
//! Mirrors how the firmware services the link: one poll per pass, never
//! blocking or sleeping while a controller is connected. An idle pass only
//! yields the thread.
//!
//! Run with:
//!   cargo run --example simulated-device
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:8080 move 100 0 0

use std::net::TcpListener;
use std::thread;

use mecalink::link::{DeviceConfig, DeviceEvent, DeviceLink, PollStatus};
use mecalink::motion::{SimulatedOutputs, Wheel};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:8080")?;
    eprintln!("Listening on {}", listener.local_addr()?);

    let mut device = DeviceLink::new(SimulatedOutputs::new(), DeviceConfig::default());
    let mut buf = [0u8; 128];

    loop {
        let (mut stream, peer) = listener.accept()?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        eprintln!("Controller connected: {peer}");
        device.on_connected();

        loop {
            let status = match device.poll(&mut stream, &mut buf) {
                Ok(status) => status,
                Err(e) => {
                    eprintln!("Link error: {e}");
                    break;
                }
            };
            while let Some(event) = device.poll_event() {
                report(&event);
            }
            match status {
                PollStatus::Closed => break,
                PollStatus::Idle => thread::yield_now(),
                PollStatus::Progress => {}
            }
        }
        device.on_disconnected();
        while let Some(event) = device.poll_event() {
            report(&event);
        }
    }
}

fn report(event: &DeviceEvent) {
    match event {
        DeviceEvent::Moved { signals, .. } => {
            for (wheel, signal) in Wheel::ALL.iter().zip(signals) {
                eprintln!(
                    "  {:<12} in1={} in2={} duty={}",
                    wheel.name(),
                    u8::from(signal.in1),
                    u8::from(signal.in2),
                    signal.duty
                );
            }
        }
        other => eprintln!("{other:?}"),
    }
}
