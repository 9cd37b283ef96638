//! External calendar adapters.
//!
//! Each vendor gets a flat client that translates its wire format to and from
//! [`Interval`]s and [`EventRef`]s. The engine only talks to the
//! [`CalendarGateway`] seam; [`HttpCalendarGateway`] dispatches on the
//! connection's [`ProviderKind`].

mod google;
mod outlook;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::domain::{CalendarConnection, Credential, EventDetails, EventRef, ProviderKind};
use super::interval::Interval;
use crate::config::{ConfigError, ProviderConfig};

pub use google::GoogleCalendar;
pub use outlook::OutlookCalendar;

/// Upper bound on pages followed for one busy-interval fetch.
const MAX_PAGES: usize = 25;

/// Failure talking to an external calendar. Never interpreted as "no events".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} calendar rejected the credential: {detail}")]
    Unauthorized {
        provider: ProviderKind,
        detail: String,
    },
    #[error("{provider} calendar is rate limiting requests")]
    RateLimited {
        provider: ProviderKind,
        retry_after_secs: Option<u64>,
    },
    #[error("{provider} calendar is unreachable: {detail}")]
    Unreachable {
        provider: ProviderKind,
        detail: String,
    },
    #[error("{provider} calendar returned an unexpected response: {detail}")]
    Malformed {
        provider: ProviderKind,
        detail: String,
    },
}

impl ProviderError {
    pub fn provider(&self) -> ProviderKind {
        match self {
            ProviderError::Unauthorized { provider, .. }
            | ProviderError::RateLimited { provider, .. }
            | ProviderError::Unreachable { provider, .. }
            | ProviderError::Malformed { provider, .. } => *provider,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            ProviderError::Unauthorized { .. } => "provider_unauthorized",
            ProviderError::RateLimited { .. } => "provider_rate_limited",
            ProviderError::Unreachable { .. } => "provider_unreachable",
            ProviderError::Malformed { .. } => "provider_malformed",
        }
    }

    pub(crate) fn malformed(provider: ProviderKind, detail: impl Into<String>) -> Self {
        ProviderError::Malformed {
            provider,
            detail: detail.into(),
        }
    }

    pub(crate) fn timed_out(provider: ProviderKind, limit: Duration) -> Self {
        ProviderError::Unreachable {
            provider,
            detail: format!("no response within {}ms", limit.as_millis()),
        }
    }
}

/// Seam between the engine and whichever calendars a school has connected.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    /// Busy spans on the connected calendar that intersect `window`.
    async fn fetch_busy_intervals(
        &self,
        connection: &CalendarConnection,
        window: Interval,
    ) -> Result<Vec<Interval>, ProviderError>;

    async fn create_event(
        &self,
        connection: &CalendarConnection,
        details: &EventDetails,
    ) -> Result<EventRef, ProviderError>;
}

/// Production gateway backed by the Google Calendar and Microsoft Graph APIs.
#[derive(Debug, Clone)]
pub struct HttpCalendarGateway {
    google: GoogleCalendar,
    outlook: OutlookCalendar,
}

impl HttpCalendarGateway {
    pub fn new(google: GoogleCalendar, outlook: OutlookCalendar) -> Self {
        Self { google, outlook }
    }

    /// One shared client serves both vendors, so a build failure is a
    /// configuration problem rather than a provider outage.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("tour-booking/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ConfigError::HttpClient {
                detail: err.to_string(),
            })?;

        Ok(Self::new(
            GoogleCalendar::new(http.clone(), &config.google_api_base),
            OutlookCalendar::new(http, &config.outlook_api_base),
        ))
    }
}

#[async_trait]
impl CalendarGateway for HttpCalendarGateway {
    async fn fetch_busy_intervals(
        &self,
        connection: &CalendarConnection,
        window: Interval,
    ) -> Result<Vec<Interval>, ProviderError> {
        match connection.provider {
            ProviderKind::Google => {
                self.google
                    .fetch_busy_intervals(&connection.credential, window)
                    .await
            }
            ProviderKind::Outlook => {
                self.outlook
                    .fetch_busy_intervals(&connection.credential, window)
                    .await
            }
        }
    }

    async fn create_event(
        &self,
        connection: &CalendarConnection,
        details: &EventDetails,
    ) -> Result<EventRef, ProviderError> {
        match connection.provider {
            ProviderKind::Google => self.google.create_event(&connection.credential, details).await,
            ProviderKind::Outlook => {
                self.outlook
                    .create_event(&connection.credential, details)
                    .await
            }
        }
    }
}

/// Runs a provider call under `limit`; an elapsed deadline reads as unreachable.
pub(crate) async fn within_deadline<T, F>(
    provider: ProviderKind,
    limit: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::timed_out(provider, limit)),
    }
}

fn bearer(provider: ProviderKind, credential: &Credential) -> Result<&str, ProviderError> {
    credential
        .bearer_token()
        .ok_or_else(|| ProviderError::Unauthorized {
            provider,
            detail: "calendar is connected without an access token".to_string(),
        })
}

fn transport_error(provider: ProviderKind, err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::malformed(provider, err.to_string())
    } else {
        ProviderError::Unreachable {
            provider,
            detail: err.to_string(),
        }
    }
}

/// Both vendors wrap failures as `{"error": {"message": ...}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

fn status_error(
    provider: ProviderKind,
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> ProviderError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("http status {status}"));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Unauthorized { provider, detail }
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            provider,
            retry_after_secs,
        },
        status if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT => {
            ProviderError::Unreachable { provider, detail }
        }
        _ => ProviderError::Malformed { provider, detail },
    }
}

/// Reads a response body as JSON, classifying non-success statuses first.
async fn read_json<T>(provider: ProviderKind, response: reqwest::Response) -> Result<T, ProviderError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    let retry_after_secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = response
        .text()
        .await
        .map_err(|err| transport_error(provider, err))?;

    if !status.is_success() {
        return Err(status_error(provider, status, retry_after_secs, &body));
    }

    serde_json::from_str(&body).map_err(|err| ProviderError::malformed(provider, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_provider_errors() {
        let google = ProviderKind::Google;
        assert!(matches!(
            status_error(google, StatusCode::UNAUTHORIZED, None, ""),
            ProviderError::Unauthorized { .. }
        ));
        assert!(matches!(
            status_error(google, StatusCode::FORBIDDEN, None, ""),
            ProviderError::Unauthorized { .. }
        ));
        assert_eq!(
            status_error(google, StatusCode::TOO_MANY_REQUESTS, Some(30), ""),
            ProviderError::RateLimited {
                provider: google,
                retry_after_secs: Some(30)
            }
        );
        assert!(matches!(
            status_error(google, StatusCode::BAD_GATEWAY, None, ""),
            ProviderError::Unreachable { .. }
        ));
        assert!(matches!(
            status_error(google, StatusCode::NOT_FOUND, None, ""),
            ProviderError::Malformed { .. }
        ));
    }

    #[test]
    fn errors_name_the_provider_they_came_from() {
        let outlook = status_error(ProviderKind::Outlook, StatusCode::BAD_GATEWAY, None, "");
        assert_eq!(outlook.provider(), ProviderKind::Outlook);
        let timed_out = ProviderError::timed_out(ProviderKind::Google, Duration::from_secs(5));
        assert_eq!(timed_out.provider(), ProviderKind::Google);
        assert_eq!(timed_out.code(), "provider_unreachable");
    }

    #[test]
    fn status_error_prefers_vendor_message() {
        let body = r#"{"error":{"code":"InvalidAuthenticationToken","message":"Access token has expired."}}"#;
        match status_error(ProviderKind::Outlook, StatusCode::UNAUTHORIZED, None, body) {
            ProviderError::Unauthorized { detail, .. } => {
                assert_eq!(detail, "Access token has expired.")
            }
            other => panic!("expected unauthorized, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_reads_as_unreachable() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, ProviderError>(Vec::<Interval>::new())
        };
        let result = within_deadline(ProviderKind::Outlook, Duration::from_secs(5), slow).await;
        assert!(matches!(
            result,
            Err(ProviderError::Unreachable {
                provider: ProviderKind::Outlook,
                ..
            })
        ));
    }
}
