use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{bearer, read_json, transport_error, ProviderError, MAX_PAGES};
use crate::scheduling::domain::{Credential, EventDetails, EventRef, ProviderKind};
use crate::scheduling::interval::Interval;

const PROVIDER: ProviderKind = ProviderKind::Google;

/// Google Calendar v3 client scoped to the account's `primary` calendar.
#[derive(Debug, Clone)]
pub struct GoogleCalendar {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    #[serde(default)]
    status: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    #[serde(default)]
    id: String,
}

impl GoogleCalendar {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/primary/events", self.base_url)
    }

    pub async fn fetch_busy_intervals(
        &self,
        credential: &Credential,
        window: Interval,
    ) -> Result<Vec<Interval>, ProviderError> {
        let token = bearer(PROVIDER, credential)?;
        let time_min = rfc3339(window.start());
        let time_max = rfc3339(window.end());

        let mut busy = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("timeMin", time_min.clone()),
                ("timeMax", time_max.clone()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let response = self
                .http
                .get(self.events_url())
                .bearer_auth(token)
                .query(&query)
                .send()
                .await
                .map_err(|err| transport_error(PROVIDER, err))?;
            let page: EventList = read_json(PROVIDER, response).await?;

            for event in &page.items {
                if let Some(interval) = event_interval(event)? {
                    busy.push(interval);
                }
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => return Ok(busy),
            }
        }

        Err(ProviderError::malformed(
            PROVIDER,
            format!("event listing exceeded {MAX_PAGES} pages"),
        ))
    }

    pub async fn create_event(
        &self,
        credential: &Credential,
        details: &EventDetails,
    ) -> Result<EventRef, ProviderError> {
        let token = bearer(PROVIDER, credential)?;
        let body = json!({
            "summary": details.title,
            "description": details.description,
            "start": { "dateTime": rfc3339(details.slot.start()), "timeZone": "UTC" },
            "end": { "dateTime": rfc3339(details.slot.end()), "timeZone": "UTC" },
        });

        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        let created: CreatedEvent = read_json(PROVIDER, response).await?;

        if created.id.is_empty() {
            return Err(ProviderError::malformed(
                PROVIDER,
                "created event has no id",
            ));
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

/// Effective span of an event. All-day events carry `date` only and cover
/// whole UTC days; the end date is exclusive. Cancelled and zero-length
/// entries occupy nothing.
fn event_interval(event: &GoogleEvent) -> Result<Option<Interval>, ProviderError> {
    if event.status.as_deref() == Some("cancelled") {
        return Ok(None);
    }

    let start = event
        .start
        .as_ref()
        .ok_or_else(|| ProviderError::malformed(PROVIDER, "event without start"))
        .and_then(parse_event_time)?;
    let end = event
        .end
        .as_ref()
        .ok_or_else(|| ProviderError::malformed(PROVIDER, "event without end"))
        .and_then(parse_event_time)?;

    if end < start {
        return Err(ProviderError::malformed(
            PROVIDER,
            format!("event ends at {end} before it starts at {start}"),
        ));
    }
    Ok(Interval::new(start, end).ok())
}

fn parse_event_time(time: &EventTime) -> Result<DateTime<Utc>, ProviderError> {
    if let Some(raw) = time.date_time.as_deref() {
        return DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|_| ProviderError::malformed(PROVIDER, format!("bad dateTime '{raw}'")));
    }

    if let Some(raw) = time.date.as_deref() {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc())
            .map_err(|_| ProviderError::malformed(PROVIDER, format!("bad date '{raw}'")));
    }

    Err(ProviderError::malformed(
        PROVIDER,
        "event time has neither dateTime nor date",
    ))
}
