//! Availability and booking engine.
//!
//! Free slots are computed from a per-request busy-set: the busy spans of the
//! school's connected calendar plus its committed bookings. Commits repeat the
//! check inside a per-school critical section and rely on the booking store's
//! `(school, scheduled_at)` uniqueness constraint across processes.

pub mod availability;
pub mod booking;
pub mod busy;
pub mod domain;
pub mod interval;
pub mod memory;
pub mod providers;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use availability::{candidate_slots, free_slots_in, AvailabilityService};
pub use booking::{BookingError, BookingOrchestrator};
pub use busy::{AggregationError, BusySet, BusySetAggregator};
pub use domain::{
    slot_length, Booking, BookingId, BookingRequest, BusinessHours, BusinessHoursError,
    CalendarConnection, CallRef, ContactDetails, Credential, DayAvailability, EventDetails,
    EventRef, ProviderKind, SchoolId, SlotInterval, SLOT_MINUTES,
};
pub use interval::{merge, overlaps, Interval, IntervalError};
pub use memory::{InMemoryBookingStore, InMemoryConnectionStore, InMemoryNotifier};
pub use providers::{CalendarGateway, HttpCalendarGateway, ProviderError};
pub use repository::{
    BookingNotice, BookingNotifier, BookingRepository, ConnectionStore, NoopNotifier,
    NotifyError, RepositoryError,
};
pub use router::scheduling_router;
pub use service::TourScheduler;
