//! Process-local stores used by the API service, the demo and tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{Booking, CalendarConnection, ProviderKind, SchoolId};
use super::interval::Interval;
use super::repository::{
    BookingNotice, BookingNotifier, BookingRepository, ConnectionStore, NotifyError,
    RepositoryError,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

/// Booking store keyed by `(school, scheduled_at)`, which doubles as the
/// uniqueness constraint. Claims share the same lock as the bookings.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBookingStore {
    ledger: Arc<Mutex<BookingLedger>>,
}

#[derive(Debug, Default)]
struct BookingLedger {
    bookings: HashMap<SchoolId, BTreeMap<DateTime<Utc>, Booking>>,
    claims: HashSet<(SchoolId, DateTime<Utc>)>,
}

impl BookingLedger {
    fn is_booked(&self, school: &SchoolId, scheduled_at: DateTime<Utc>) -> bool {
        self.bookings
            .get(school)
            .is_some_and(|per_school| per_school.contains_key(&scheduled_at))
    }
}

impl InMemoryBookingStore {
    pub fn all(&self) -> Vec<Booking> {
        match self.ledger.lock() {
            Ok(guard) => guard
                .bookings
                .values()
                .flat_map(|per_school| per_school.values().cloned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Keys currently claimed and not yet booked or released.
    pub fn open_claims(&self) -> usize {
        self.ledger.lock().map(|guard| guard.claims.len()).unwrap_or(0)
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingStore {
    async fn find_bookings(
        &self,
        school: &SchoolId,
        window: Interval,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let guard = lock(&self.ledger)?;
        let Some(per_school) = guard.bookings.get(school) else {
            return Ok(Vec::new());
        };

        Ok(per_school
            .range(..window.end())
            .map(|(_, booking)| booking)
            .filter(|booking| booking.interval().overlaps(&window))
            .cloned()
            .collect())
    }

    async fn reserve_slot(
        &self,
        school: &SchoolId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.ledger)?;
        let key = (school.clone(), scheduled_at);
        if guard.is_booked(school, scheduled_at) || guard.claims.contains(&key) {
            return Err(RepositoryError::UniqueConstraintViolation {
                school: school.clone(),
                scheduled_at,
            });
        }
        guard.claims.insert(key);
        Ok(())
    }

    async fn release_slot(
        &self,
        school: &SchoolId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.ledger)?;
        guard.claims.remove(&(school.clone(), scheduled_at));
        Ok(())
    }

    async fn insert_booking(&self, booking: Booking) -> Result<Booking, RepositoryError> {
        let mut guard = lock(&self.ledger)?;
        if guard.is_booked(&booking.school_id, booking.scheduled_at) {
            return Err(RepositoryError::UniqueConstraintViolation {
                school: booking.school_id.clone(),
                scheduled_at: booking.scheduled_at,
            });
        }
        guard
            .claims
            .remove(&(booking.school_id.clone(), booking.scheduled_at));
        guard
            .bookings
            .entry(booking.school_id.clone())
            .or_default()
            .insert(booking.scheduled_at, booking.clone());
        Ok(booking)
    }

    async fn recent_bookings(
        &self,
        school: &SchoolId,
        limit: usize,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let guard = lock(&self.ledger)?;
        Ok(guard
            .bookings
            .get(school)
            .map(|per_school| per_school.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Calendar links keyed by `(school, provider)`; at most one per pair.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConnectionStore {
    connections: Arc<Mutex<HashMap<(SchoolId, ProviderKind), CalendarConnection>>>,
}

impl InMemoryConnectionStore {
    pub fn upsert(&self, connection: CalendarConnection) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.connections)?;
        guard.insert(
            (connection.school_id.clone(), connection.provider),
            connection,
        );
        Ok(())
    }
}

impl FromIterator<CalendarConnection> for InMemoryConnectionStore {
    fn from_iter<I: IntoIterator<Item = CalendarConnection>>(iter: I) -> Self {
        let connections = iter
            .into_iter()
            .map(|connection| ((connection.school_id.clone(), connection.provider), connection))
            .collect();
        Self {
            connections: Arc::new(Mutex::new(connections)),
        }
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn connection(
        &self,
        school: &SchoolId,
        preference: &[ProviderKind],
    ) -> Result<Option<CalendarConnection>, RepositoryError> {
        let guard = lock(&self.connections)?;
        Ok(preference.iter().find_map(|provider| {
            guard
                .get(&(school.clone(), *provider))
                .filter(|connection| connection.connected)
                .cloned()
        }))
    }
}

/// Keeps every notice in memory so callers can inspect what would be sent.
#[derive(Debug, Default, Clone)]
pub struct InMemoryNotifier {
    notices: Arc<Mutex<Vec<BookingNotice>>>,
}

impl InMemoryNotifier {
    pub fn notices(&self) -> Vec<BookingNotice> {
        self.notices
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BookingNotifier for InMemoryNotifier {
    async fn tour_booked(&self, notice: BookingNotice) -> Result<(), NotifyError> {
        let mut guard = self
            .notices
            .lock()
            .map_err(|_| NotifyError::Transport("notice log poisoned".to_string()))?;
        guard.push(notice);
        Ok(())
    }
}
