use crate::config::TelemetryConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Crates whose events are noisy at `debug` and below.
const QUIET_TARGETS: [&str; 3] = ["hyper", "reqwest", "h2"];

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log level/filter '{value}': unable to build EnvFilter")]
    EnvFilter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("telemetry error: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.log_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(config.ansi)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// Bare levels are expanded so HTTP client internals stay at `info`; full
/// directive strings are used as given.
pub(crate) fn build_filter(log_level: &str) -> Result<EnvFilter, TelemetryError> {
    let value = log_level.trim();
    let directives = if is_bare_level(value) && !matches!(value, "info" | "warn" | "error") {
        let mut directives = value.to_string();
        for target in QUIET_TARGETS {
            directives.push_str(&format!(",{target}=info"));
        }
        directives
    } else {
        value.to_string()
    };

    EnvFilter::try_new(&directives).map_err(|source| TelemetryError::EnvFilter {
        value: log_level.to_string(),
        source,
    })
}

fn is_bare_level(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    )
}
