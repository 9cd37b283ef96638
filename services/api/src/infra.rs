use chrono::{NaiveDate, NaiveTime};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tour_booking::config::AppConfig;
use tour_booking::error::AppError;
use tour_booking::scheduling::{
    CalendarConnection, HttpCalendarGateway, InMemoryBookingStore, InMemoryConnectionStore,
    NoopNotifier, TourScheduler,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Engine wired to the real calendar APIs and process-local stores.
pub(crate) fn build_scheduler(
    config: &AppConfig,
    connections: InMemoryConnectionStore,
) -> Result<TourScheduler, AppError> {
    let gateway = HttpCalendarGateway::from_config(&config.providers)?;

    Ok(TourScheduler::new(
        Arc::new(connections),
        Arc::new(InMemoryBookingStore::default()),
        Arc::new(gateway),
        Arc::new(NoopNotifier),
        config.providers.request_timeout,
    )
    .with_business_hours(config.scheduling.business_hours))
}

/// Reads a JSON array of calendar connections, as exported by tenant settings.
pub(crate) fn load_connections(path: &Path) -> Result<InMemoryConnectionStore, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let connections = parse_connections(&raw)?;
    Ok(connections.into_iter().collect())
}

pub(crate) fn parse_connections(raw: &str) -> Result<Vec<CalendarConnection>, AppError> {
    serde_json::from_str(raw).map_err(|err| {
        AppError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid calendar connections file: {err}"),
        ))
    })
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Parses `HH:MM-HH:MM` into an ordered pair of clock times.
pub(crate) fn parse_clock_span(raw: &str) -> Result<(NaiveTime, NaiveTime), String> {
    let (from, to) = raw
        .split_once('-')
        .ok_or_else(|| format!("expected HH:MM-HH:MM, got '{raw}'"))?;
    let parse = |value: &str| {
        NaiveTime::parse_from_str(value.trim(), "%H:%M")
            .map_err(|err| format!("failed to parse '{value}' as HH:MM ({err})"))
    };
    let (from, to) = (parse(from)?, parse(to)?);
    if from >= to {
        return Err(format!("span '{raw}' must end after it starts"));
    }
    Ok((from, to))
}
