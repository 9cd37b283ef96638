use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::domain::{CalendarConnection, ProviderKind, SchoolId};
use super::interval::{self, Interval};
use super::providers::{within_deadline, CalendarGateway, ProviderError};
use super::repository::{BookingRepository, ConnectionStore, RepositoryError};

/// Busy spans for one school over one query window. Recomputed per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusySet {
    intervals: Vec<Interval>,
}

impl BusySet {
    pub fn new(intervals: Vec<Interval>) -> Self {
        Self { intervals }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn overlaps(&self, candidate: &Interval) -> bool {
        self.intervals
            .iter()
            .any(|busy| interval::overlaps(busy, candidate))
    }

    /// Same overlap answers with fewer intervals.
    pub fn coalesced(self) -> Self {
        Self {
            intervals: interval::merge(self.intervals),
        }
    }
}

impl Extend<Interval> for BusySet {
    fn extend<I: IntoIterator<Item = Interval>>(&mut self, iter: I) {
        self.intervals.extend(iter);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("booking store unavailable: {0}")]
    Store(#[from] RepositoryError),
}

/// Busy-set plus the calendar it was observed on, so a commit writes to the
/// same calendar it checked.
#[derive(Debug, Clone)]
pub(crate) struct Observation {
    pub(crate) busy: BusySet,
    pub(crate) connection: Option<CalendarConnection>,
}

/// Merges the connected calendar's busy time with the school's own bookings.
pub struct BusySetAggregator {
    connections: Arc<dyn ConnectionStore>,
    bookings: Arc<dyn BookingRepository>,
    calendars: Arc<dyn CalendarGateway>,
    provider_timeout: Duration,
}

impl BusySetAggregator {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        bookings: Arc<dyn BookingRepository>,
        calendars: Arc<dyn CalendarGateway>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            connections,
            bookings,
            calendars,
            provider_timeout,
        }
    }

    pub(crate) fn calendars(&self) -> &Arc<dyn CalendarGateway> {
        &self.calendars
    }

    pub(crate) fn bookings(&self) -> &Arc<dyn BookingRepository> {
        &self.bookings
    }

    pub(crate) fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }

    /// Busy-set for `school` over `window`.
    ///
    /// A connected calendar that cannot be read fails the whole call; a school
    /// without a connected calendar contributes only its own bookings.
    pub async fn busy_set(
        &self,
        school: &SchoolId,
        window: Interval,
    ) -> Result<BusySet, AggregationError> {
        self.observe(school, window)
            .await
            .map(|observation| observation.busy)
    }

    pub(crate) async fn observe(
        &self,
        school: &SchoolId,
        window: Interval,
    ) -> Result<Observation, AggregationError> {
        let connection = self
            .connections
            .connection(school, &ProviderKind::PREFERENCE)
            .await?;

        let mut busy = BusySet::default();
        match &connection {
            Some(connection) => {
                let fetched = within_deadline(
                    connection.provider,
                    self.provider_timeout,
                    self.calendars.fetch_busy_intervals(connection, window),
                )
                .await
                .map_err(|err| {
                    warn!(school = %school, provider = %connection.provider, error = %err, "calendar busy fetch failed");
                    err
                })?;
                debug!(school = %school, provider = %connection.provider, events = fetched.len(), "calendar busy intervals fetched");
                busy.extend(fetched);
            }
            None => {
                debug!(school = %school, "no calendar connected; using bookings only");
            }
        }

        let booked = self.bookings.find_bookings(school, window).await?;
        busy.extend(booked.iter().map(|booking| booking.interval()));

        Ok(Observation { busy, connection })
    }
}
