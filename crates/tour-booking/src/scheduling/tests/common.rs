use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::scheduling::domain::{
    slot_length, Booking, BookingRequest, CalendarConnection, ContactDetails, Credential,
    EventDetails, EventRef, ProviderKind, SchoolId,
};
use crate::scheduling::interval::Interval;
use crate::scheduling::memory::{InMemoryBookingStore, InMemoryConnectionStore, InMemoryNotifier};
use crate::scheduling::providers::{CalendarGateway, ProviderError};
use crate::scheduling::repository::{
    BookingNotice, BookingNotifier, BookingRepository, NotifyError, RepositoryError,
};
use crate::scheduling::service::TourScheduler;

pub(super) const PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) fn school() -> SchoolId {
    SchoolId("maple-grove-montessori".to_string())
}

pub(super) fn tour_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 1).expect("valid date")
}

pub(super) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, hour, minute, 0).unwrap()
}

pub(super) fn slot(hour: u32, minute: u32) -> Interval {
    Interval::starting_at(at(hour, minute), slot_length()).expect("valid slot")
}

pub(super) fn span(from: (u32, u32), to: (u32, u32)) -> Interval {
    Interval::new(at(from.0, from.1), at(to.0, to.1)).expect("valid span")
}

pub(super) fn contact() -> ContactDetails {
    ContactDetails {
        name: "Priya Raman".to_string(),
        phone: "+15155550142".to_string(),
        email: "priya@example.com".to_string(),
        child_age: "4".to_string(),
        reason: "Pre-K enrollment for next fall".to_string(),
    }
}

pub(super) fn request_at(hour: u32, minute: u32) -> BookingRequest {
    let candidate = slot(hour, minute);
    BookingRequest {
        start: candidate.start(),
        end: candidate.end(),
        contact: contact(),
        source_call_ref: None,
    }
}

pub(super) fn connection(provider: ProviderKind) -> CalendarConnection {
    CalendarConnection {
        school_id: school(),
        provider,
        connected: true,
        credential: Credential::new(format!("{provider}-access-token")),
        last_connected_at: Some(at(8, 0)),
    }
}

/// Everything a scheduler test needs to poke at after the fact.
pub(super) struct Harness {
    pub(super) scheduler: Arc<TourScheduler>,
    pub(super) bookings: InMemoryBookingStore,
    pub(super) calendar: FakeCalendar,
    pub(super) notifier: InMemoryNotifier,
}

pub(super) fn harness(connections: Vec<CalendarConnection>) -> Harness {
    harness_with(connections, FakeCalendar::default())
}

pub(super) fn harness_with(connections: Vec<CalendarConnection>, calendar: FakeCalendar) -> Harness {
    let bookings = InMemoryBookingStore::default();
    let notifier = InMemoryNotifier::default();
    let store: InMemoryConnectionStore = connections.into_iter().collect();
    let scheduler = TourScheduler::new(
        Arc::new(store),
        Arc::new(bookings.clone()),
        Arc::new(calendar.clone()),
        Arc::new(notifier.clone()),
        PROVIDER_TIMEOUT,
    );
    Harness {
        scheduler: Arc::new(scheduler),
        bookings,
        calendar,
        notifier,
    }
}

pub(super) fn scheduler_over(
    connections: Vec<CalendarConnection>,
    bookings: Arc<dyn BookingRepository>,
    calendar: FakeCalendar,
    notifier: Arc<dyn BookingNotifier>,
) -> TourScheduler {
    let store: InMemoryConnectionStore = connections.into_iter().collect();
    TourScheduler::new(
        Arc::new(store),
        bookings,
        Arc::new(calendar),
        notifier,
        PROVIDER_TIMEOUT,
    )
}

#[derive(Default)]
struct CalendarState {
    busy: Vec<Interval>,
    fetch_failure: Option<ProviderError>,
    create_failure: Option<ProviderError>,
    fetch_delay: Option<Duration>,
    fetches: Vec<(ProviderKind, Interval)>,
    created: Vec<(ProviderKind, EventDetails)>,
}

/// Calendar that behaves like a single shared external calendar: created
/// events show up as busy time on the next fetch.
#[derive(Clone, Default)]
pub(super) struct FakeCalendar {
    state: Arc<Mutex<CalendarState>>,
}

impl FakeCalendar {
    pub(super) fn with_busy(busy: Vec<Interval>) -> Self {
        let calendar = Self::default();
        calendar.state.lock().expect("calendar mutex poisoned").busy = busy;
        calendar
    }

    pub(super) fn failing_fetch(error: ProviderError) -> Self {
        let calendar = Self::default();
        calendar
            .state
            .lock()
            .expect("calendar mutex poisoned")
            .fetch_failure = Some(error);
        calendar
    }

    pub(super) fn failing_create(error: ProviderError) -> Self {
        let calendar = Self::default();
        calendar
            .state
            .lock()
            .expect("calendar mutex poisoned")
            .create_failure = Some(error);
        calendar
    }

    pub(super) fn slow(delay: Duration) -> Self {
        let calendar = Self::default();
        calendar
            .state
            .lock()
            .expect("calendar mutex poisoned")
            .fetch_delay = Some(delay);
        calendar
    }

    pub(super) fn created(&self) -> Vec<(ProviderKind, EventDetails)> {
        self.state
            .lock()
            .expect("calendar mutex poisoned")
            .created
            .clone()
    }

    pub(super) fn fetches(&self) -> Vec<(ProviderKind, Interval)> {
        self.state
            .lock()
            .expect("calendar mutex poisoned")
            .fetches
            .clone()
    }
}

#[async_trait]
impl CalendarGateway for FakeCalendar {
    async fn fetch_busy_intervals(
        &self,
        connection: &CalendarConnection,
        window: Interval,
    ) -> Result<Vec<Interval>, ProviderError> {
        let delay = {
            let mut guard = self.state.lock().expect("calendar mutex poisoned");
            guard.fetches.push((connection.provider, window));
            guard.fetch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let guard = self.state.lock().expect("calendar mutex poisoned");
        if let Some(error) = &guard.fetch_failure {
            return Err(error.clone());
        }
        Ok(guard
            .busy
            .iter()
            .copied()
            .filter(|busy| busy.overlaps(&window))
            .collect())
    }

    async fn create_event(
        &self,
        connection: &CalendarConnection,
        details: &EventDetails,
    ) -> Result<EventRef, ProviderError> {
        let mut guard = self.state.lock().expect("calendar mutex poisoned");
        if let Some(error) = &guard.create_failure {
            return Err(error.clone());
        }
        guard.busy.push(details.slot);
        guard.created.push((connection.provider, details.clone()));
        Ok(EventRef {
            provider: connection.provider,
            event_id: format!("evt-{}", guard.created.len()),
        })
    }
}

/// Booking store as seen from another process that has not yet observed a
/// concurrent insert: reads are empty, claims and inserts still hit the shared store.
#[derive(Clone, Default)]
pub(super) struct StaleReadStore {
    pub(super) shared: InMemoryBookingStore,
}

#[async_trait]
impl BookingRepository for StaleReadStore {
    async fn find_bookings(
        &self,
        _school: &SchoolId,
        _window: Interval,
    ) -> Result<Vec<Booking>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn reserve_slot(
        &self,
        school: &SchoolId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.shared.reserve_slot(school, scheduled_at).await
    }

    async fn release_slot(
        &self,
        school: &SchoolId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.shared.release_slot(school, scheduled_at).await
    }

    async fn insert_booking(&self, booking: Booking) -> Result<Booking, RepositoryError> {
        self.shared.insert_booking(booking).await
    }

    async fn recent_bookings(
        &self,
        school: &SchoolId,
        limit: usize,
    ) -> Result<Vec<Booking>, RepositoryError> {
        self.shared.recent_bookings(school, limit).await
    }
}

pub(super) struct UnavailableStore;

#[async_trait]
impl BookingRepository for UnavailableStore {
    async fn find_bookings(
        &self,
        _school: &SchoolId,
        _window: Interval,
    ) -> Result<Vec<Booking>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn reserve_slot(
        &self,
        _school: &SchoolId,
        _scheduled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn release_slot(
        &self,
        _school: &SchoolId,
        _scheduled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn insert_booking(&self, _booking: Booking) -> Result<Booking, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn recent_bookings(
        &self,
        _school: &SchoolId,
        _limit: usize,
    ) -> Result<Vec<Booking>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) struct BrokenNotifier;

#[async_trait]
impl BookingNotifier for BrokenNotifier {
    async fn tour_booked(&self, _notice: BookingNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("sms gateway down".to_string()))
    }
}

pub(super) fn unreachable(provider: ProviderKind) -> ProviderError {
    ProviderError::Unreachable {
        provider,
        detail: "connection reset by peer".to_string(),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json body")
}
