use std::time::Duration;

use mecalink_link::{LinkConfig, LinkEvent};
use mecalink_transport::Endpoint;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cmd::session::{runtime_connect_timeout, HostSession};
use crate::cmd::{block_on, cancel_on_ctrlc, parse_endpoint, ProbeArgs};
use crate::exit::{link_error, CliError, CliResult, SUCCESS, TIMEOUT, TRANSPORT_ERROR, USAGE};
use crate::output::{print_json, print_table, OutputFormat};

/// Quiet period after connecting, long enough to swallow the device greeting.
const SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub endpoint: String,
    pub samples: Vec<f64>,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

impl ProbeReport {
    fn new(endpoint: &Endpoint, samples: &[Duration]) -> Self {
        let millis: Vec<f64> = samples
            .iter()
            .map(|rtt| rtt.as_secs_f64() * 1000.0)
            .collect();
        let min_ms = millis.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = millis.iter().copied().fold(0.0, f64::max);
        let avg_ms = if millis.is_empty() {
            0.0
        } else {
            millis.iter().sum::<f64>() / millis.len() as f64
        };
        Self {
            endpoint: endpoint.to_string(),
            min_ms: if millis.is_empty() { 0.0 } else { min_ms },
            avg_ms,
            max_ms,
            samples: millis,
        }
    }
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be greater than zero"));
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrlc(cancel.clone())?;
    block_on(probe(endpoint, args, format, cancel))?
}

async fn probe(
    endpoint: Endpoint,
    args: ProbeArgs,
    format: OutputFormat,
    cancel: CancellationToken,
) -> CliResult<i32> {
    // Periodic heartbeats stay out of the way for the whole probe.
    let config = LinkConfig {
        heartbeat_interval: args.timeout * 2,
        connect_timeout: runtime_connect_timeout(args.timeout),
        ..LinkConfig::default()
    };
    let deadline = Instant::now() + args.timeout;
    let mut session = HostSession::start(config, cancel);

    let result = measure(&mut session, &endpoint, args, deadline).await;
    session.close().await;

    let report = ProbeReport::new(&endpoint, &result?);
    print_report(&report, format);
    Ok(SUCCESS)
}

async fn measure(
    session: &mut HostSession,
    endpoint: &Endpoint,
    args: ProbeArgs,
    deadline: Instant,
) -> CliResult<Vec<Duration>> {
    session
        .connect(endpoint.clone(), deadline.saturating_duration_since(Instant::now()))
        .await?;

    let settle = (Instant::now() + SETTLE).min(deadline);
    while session.next_event(settle).await.is_some() {}

    let mut samples = Vec::with_capacity(args.count as usize);
    while samples.len() < args.count as usize {
        session
            .handle
            .heartbeat()
            .map_err(|err| link_error("heartbeat request failed", err))?;
        samples.push(next_rtt(session, deadline, args.timeout).await?);
    }
    Ok(samples)
}

async fn next_rtt(
    session: &mut HostSession,
    deadline: Instant,
    timeout: Duration,
) -> CliResult<Duration> {
    while let Some(event) = session.next_event(deadline).await {
        match event {
            LinkEvent::Heartbeat { rtt: Some(rtt) } => return Ok(rtt),
            LinkEvent::Status { state, message, .. } if !state.is_connected() => {
                return Err(CliError::new(
                    TRANSPORT_ERROR,
                    format!("link dropped during probe: {message}"),
                ))
            }
            _ => {}
        }
    }
    Err(CliError::new(
        TIMEOUT,
        format!("no heartbeat reply within {timeout:?}"),
    ))
}

fn print_report(report: &ProbeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => print_table(
            &["ENDPOINT", "SAMPLES", "MIN MS", "AVG MS", "MAX MS"],
            vec![vec![
                report.endpoint.clone(),
                report.samples.len().to_string(),
                format!("{:.2}", report.min_ms),
                format!("{:.2}", report.avg_ms),
                format!("{:.2}", report.max_ms),
            ]],
        ),
        OutputFormat::Pretty => {
            println!("Endpoint: {}", report.endpoint);
            println!("Samples: {}", report.samples.len());
            println!(
                "RTT min/avg/max: {:.2}/{:.2}/{:.2} ms",
                report.min_ms, report.avg_ms, report.max_ms
            );
        }
        OutputFormat::Raw => println!("{:.3}", report.avg_ms),
    }
}
