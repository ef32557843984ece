use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Crates whose events follow `--log-level`. Everything else is held at warn.
const OWN_TARGETS: [&str; 5] = [
    "mecalink",
    "mecalink_transport",
    "mecalink_frame",
    "mecalink_motion",
    "mecalink_link",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn targets(level: LogLevel) -> Targets {
    let quiet = level.as_filter().min(LevelFilter::WARN);
    OWN_TARGETS
        .iter()
        .fold(Targets::new().with_default(quiet), |targets, target| {
            targets.with_target(*target, level.as_filter())
        })
}

/// Install the stderr subscriber. Stdout is reserved for command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let registry = tracing_subscriber::registry().with(targets(level));
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_crates_follow_requested_level() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("mecalink_link", &tracing::Level::TRACE));
        assert!(!filter.would_enable("tokio", &tracing::Level::DEBUG));
        assert!(filter.would_enable("tokio", &tracing::Level::WARN));
    }

    #[test]
    fn quiet_level_is_never_louder_than_requested() {
        let filter = targets(LogLevel::Error);
        assert!(!filter.would_enable("tokio", &tracing::Level::WARN));
        assert!(!filter.would_enable("mecalink_frame", &tracing::Level::WARN));
    }
}
