//! Logging initialization using `tracing` and `tracing-subscriber`.

use std::str::FromStr;

use tracing_subscriber::{EnvFilter, fmt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "staticms=info,tower_http=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: human, json", s),
        }
    }
}

/// Initialize the global tracing subscriber. Safe to call multiple times;
/// subsequent calls are no-ops.
pub fn init_logging(format: LogFormat, verbose: bool) {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let default = if verbose {
        "staticms=debug,tower_http=debug"
    } else {
        DEFAULT_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    // try_init so double-init in tests doesn't panic
    match format {
        LogFormat::Human => {
            let _ = builder.finish().try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().finish().try_init();
        }
    }
}
