use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::scheduling::{BusinessHours, BusinessHoursError};

const DEFAULT_GOOGLE_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_OUTLOOK_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the booking service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scheduling: SchedulingConfig,
    pub providers: ProviderConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let opens = env::var("APP_BUSINESS_HOURS_START").unwrap_or_else(|_| "09:00".to_string());
        let closes = env::var("APP_BUSINESS_HOURS_END").unwrap_or_else(|_| "17:00".to_string());
        let business_hours = BusinessHours::parse(&opens, &closes)
            .map_err(|source| ConfigError::InvalidBusinessHours { source })?;

        let timeout_secs = env::var("APP_PROVIDER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidProviderTimeout)?;

        let google_api_base = env::var("APP_GOOGLE_API_BASE")
            .unwrap_or_else(|_| DEFAULT_GOOGLE_API_BASE.to_string());
        let outlook_api_base = env::var("APP_OUTLOOK_API_BASE")
            .unwrap_or_else(|_| DEFAULT_OUTLOOK_API_BASE.to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
            scheduling: SchedulingConfig { business_hours },
            providers: ProviderConfig {
                request_timeout: Duration::from_secs(timeout_secs),
                google_api_base,
                outlook_api_base,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Colored output, only enabled for local development.
    pub ansi: bool,
}

/// Defaults applied when a caller does not supply its own business hours.
#[derive(Debug, Clone, Copy)]
pub struct SchedulingConfig {
    pub business_hours: BusinessHours,
}

/// Endpoints and the per-call bound for external calendar providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub request_timeout: Duration,
    pub google_api_base: String,
    pub outlook_api_base: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            google_api_base: DEFAULT_GOOGLE_API_BASE.to_string(),
            outlook_api_base: DEFAULT_OUTLOOK_API_BASE.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidBusinessHours { source: BusinessHoursError },
    InvalidProviderTimeout,
    HttpClient { detail: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidBusinessHours { source } => write!(
                f,
                "APP_BUSINESS_HOURS_START/APP_BUSINESS_HOURS_END are invalid: {source}"
            ),
            ConfigError::InvalidProviderTimeout => {
                write!(f, "APP_PROVIDER_TIMEOUT_SECS must be a positive integer")
            }
            ConfigError::HttpClient { detail } => {
                write!(f, "calendar HTTP client could not be built: {detail}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidProviderTimeout
            | ConfigError::HttpClient { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidBusinessHours { source } => Some(source),
        }
    }
}
