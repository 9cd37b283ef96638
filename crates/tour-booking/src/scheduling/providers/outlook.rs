use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{bearer, read_json, transport_error, ProviderError, MAX_PAGES};
use crate::scheduling::domain::{Credential, EventDetails, EventRef, ProviderKind};
use crate::scheduling::interval::Interval;

const PROVIDER: ProviderKind = ProviderKind::Outlook;

/// Asks Graph to render every `dateTime` in UTC.
const PREFER_UTC: &str = "outlook.timezone=\"UTC\"";

/// Microsoft Graph client for the signed-in user's default calendar.
#[derive(Debug, Clone)]
pub struct OutlookCalendar {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CalendarView {
    #[serde(default)]
    value: Vec<OutlookEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutlookEvent {
    #[serde(default)]
    is_cancelled: bool,
    start: Option<DateTimeTimeZone>,
    end: Option<DateTimeTimeZone>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateTimeTimeZone {
    date_time: String,
    #[serde(default)]
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    #[serde(default)]
    id: String,
}

impl OutlookCalendar {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_busy_intervals(
        &self,
        credential: &Credential,
        window: Interval,
    ) -> Result<Vec<Interval>, ProviderError> {
        let token = bearer(PROVIDER, credential)?;

        let first_page = self
            .http
            .get(format!("{}/me/calendarView", self.base_url))
            .query(&[
                ("startDateTime", rfc3339(window.start())),
                ("endDateTime", rfc3339(window.end())),
            ]);

        let mut busy = Vec::new();
        let mut request = Some(first_page);
        for _ in 0..MAX_PAGES {
            let Some(pending) = request.take() else {
                return Ok(busy);
            };

            let response = pending
                .bearer_auth(token)
                .header("Prefer", PREFER_UTC)
                .send()
                .await
                .map_err(|err| transport_error(PROVIDER, err))?;
            let page: CalendarView = read_json(PROVIDER, response).await?;

            for event in &page.value {
                if let Some(interval) = event_interval(event)? {
                    busy.push(interval);
                }
            }

            // nextLink is absolute and already carries the paging state.
            request = page
                .next_link
                .filter(|link| !link.is_empty())
                .map(|link| self.http.get(link));
        }

        match request {
            None => Ok(busy),
            Some(_) => Err(ProviderError::malformed(
                PROVIDER,
                format!("calendar view exceeded {MAX_PAGES} pages"),
            )),
        }
    }

    pub async fn create_event(
        &self,
        credential: &Credential,
        details: &EventDetails,
    ) -> Result<EventRef, ProviderError> {
        let token = bearer(PROVIDER, credential)?;
        let body = json!({
            "subject": details.title,
            "body": { "contentType": "text", "content": details.description },
            "start": { "dateTime": rfc3339(details.slot.start()), "timeZone": "UTC" },
            "end": { "dateTime": rfc3339(details.slot.end()), "timeZone": "UTC" },
        });

        let response = self
            .http
            .post(format!("{}/me/events", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        let created: CreatedEvent = read_json(PROVIDER, response).await?;

        if created.id.is_empty() {
            return Err(ProviderError::malformed(PROVIDER, "created event has no id"));
        }

        Ok(EventRef {
            provider: PROVIDER,
            event_id: created.id,
        })
    }
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn event_interval(event: &OutlookEvent) -> Result<Option<Interval>, ProviderError> {
    if event.is_cancelled {
        return Ok(None);
    }

    let start = event
        .start
        .as_ref()
        .ok_or_else(|| ProviderError::malformed(PROVIDER, "event without start"))
        .and_then(parse_graph_time)?;
    let end = event
        .end
        .as_ref()
        .ok_or_else(|| ProviderError::malformed(PROVIDER, "event without end"))
        .and_then(parse_graph_time)?;

    if end < start {
        return Err(ProviderError::malformed(
            PROVIDER,
            format!("event ends at {end} before it starts at {start}"),
        ));
    }
    Ok(Interval::new(start, end).ok())
}

/// Graph returns local wall-clock strings such as `2025-10-01T13:00:00.0000000`
/// tagged with a zone name; with the UTC preference header that zone is UTC.
fn parse_graph_time(value: &DateTimeTimeZone) -> Result<DateTime<Utc>, ProviderError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&value.date_time) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let zone = value.time_zone.as_deref().unwrap_or("UTC");
    if !zone.eq_ignore_ascii_case("UTC") {
        return Err(ProviderError::malformed(
            PROVIDER,
            format!("expected UTC times, got zone '{zone}'"),
        ));
    }

    NaiveDateTime::parse_from_str(&value.date_time, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            ProviderError::malformed(PROVIDER, format!("bad dateTime '{}'", value.date_time))
        })
}
