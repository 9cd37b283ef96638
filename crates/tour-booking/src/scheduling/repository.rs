use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Booking, BookingId, CalendarConnection, EventRef, ProviderKind, SchoolId};
use super::interval::Interval;

/// Persistence for committed bookings.
///
/// Implementations must reject a second booking for the same
/// `(school, scheduled_at)` at insert time with
/// [`RepositoryError::UniqueConstraintViolation`], even when several engine
/// processes share the store. Bookings start on the slot grid and last one
/// slot, so that key is enough to keep them from overlapping.
///
/// A commit claims its key with [`reserve_slot`](Self::reserve_slot) before
/// writing the calendar event. A held claim blocks other claims on the key; [`insert_booking`](Self::insert_booking) turns it
/// into the stored booking and [`release_slot`](Self::release_slot) gives it
/// up.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Bookings of `school` whose occupied span intersects `window`.
    async fn find_bookings(
        &self,
        school: &SchoolId,
        window: Interval,
    ) -> Result<Vec<Booking>, RepositoryError>;

    /// Claims `(school, scheduled_at)`. Fails with
    /// [`RepositoryError::UniqueConstraintViolation`] when a booking or another
    /// claim already holds it.
    async fn reserve_slot(
        &self,
        school: &SchoolId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Drops a claim that will not become a booking. Unknown keys are ignored.
    async fn release_slot(
        &self,
        school: &SchoolId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Stores `booking`, consuming the caller's claim on its key.
    async fn insert_booking(&self, booking: Booking) -> Result<Booking, RepositoryError>;

    /// Newest `scheduled_at` first.
    async fn recent_bookings(
        &self,
        school: &SchoolId,
        limit: usize,
    ) -> Result<Vec<Booking>, RepositoryError>;
}

/// Read access to the tenant-settings calendar links.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// First connected calendar of `school`, trying providers in `preference` order.
    async fn connection(
        &self,
        school: &SchoolId,
        preference: &[ProviderKind],
    ) -> Result<Option<CalendarConnection>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("a booking already exists for school {school} at {scheduled_at}")]
    UniqueConstraintViolation {
        school: SchoolId,
        scheduled_at: DateTime<Utc>,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound hook for the SMS/e-mail dispatcher.
#[async_trait]
pub trait BookingNotifier: Send + Sync {
    async fn tour_booked(&self, notice: BookingNotice) -> Result<(), NotifyError>;
}

/// Payload handed to the dispatcher once a booking is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingNotice {
    pub template: &'static str,
    pub booking_id: BookingId,
    pub school_id: SchoolId,
    pub scheduled_at: DateTime<Utc>,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub calendar_event: Option<EventRef>,
}

impl BookingNotice {
    pub const TOUR_BOOKED: &'static str = "tour_booked";

    pub fn for_booking(booking: &Booking) -> Self {
        Self {
            template: Self::TOUR_BOOKED,
            booking_id: booking.id,
            school_id: booking.school_id.clone(),
            scheduled_at: booking.scheduled_at,
            contact_name: booking.contact.name.clone(),
            contact_phone: booking.contact.phone.clone(),
            contact_email: booking.contact.email.clone(),
            calendar_event: booking.external_event.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Notifier for deployments without a dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl BookingNotifier for NoopNotifier {
    async fn tour_booked(&self, _notice: BookingNotice) -> Result<(), NotifyError> {
        Ok(())
    }
}
