use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::busy::{AggregationError, BusySetAggregator};
use super::domain::{
    slot_length, Booking, BookingId, BookingRequest, EventRef, SchoolId, SLOT_MINUTES,
};
use super::interval::Interval;
use super::providers::{within_deadline, ProviderError};
use super::repository::{BookingNotice, BookingNotifier, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid booking request: {0}")]
    InvalidRequest(String),
    #[error("availability could not be confirmed: {0}")]
    AvailabilityUnknown(#[source] AggregationError),
    #[error("the slot starting {start} is no longer available")]
    SlotTaken { start: DateTime<Utc> },
    #[error("calendar event could not be created: {0}")]
    CalendarWriteFailed(#[source] ProviderError),
    #[error("booking store unavailable: {0}")]
    Store(#[source] RepositoryError),
}

impl BookingError {
    pub const fn code(&self) -> &'static str {
        match self {
            BookingError::InvalidRequest(_) => "invalid_request",
            BookingError::AvailabilityUnknown(_) => "availability_unknown",
            BookingError::SlotTaken { .. } => "slot_taken",
            BookingError::CalendarWriteFailed(_) => "calendar_write_failed",
            BookingError::Store(_) => "store_unavailable",
        }
    }
}

/// One async mutex per school, created on first use.
#[derive(Default)]
struct SchoolLocks {
    handles: Mutex<HashMap<SchoolId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SchoolLocks {
    fn handle(&self, school: &SchoolId) -> Arc<tokio::sync::Mutex<()>> {
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handles.entry(school.clone()).or_default().clone()
    }
}

/// Commits tour bookings: re-check, claim the slot, write the calendar event,
/// persist.
///
/// The steps run inside a per-school critical section. The store's claim on
/// `(school, scheduled_at)` covers other processes and is taken before any
/// external write, so a lost race never leaves an event behind.
pub struct BookingOrchestrator {
    aggregator: Arc<BusySetAggregator>,
    notifier: Arc<dyn BookingNotifier>,
    locks: SchoolLocks,
}

impl BookingOrchestrator {
    pub fn new(aggregator: Arc<BusySetAggregator>, notifier: Arc<dyn BookingNotifier>) -> Self {
        Self {
            aggregator,
            notifier,
            locks: SchoolLocks::default(),
        }
    }

    pub async fn book_slot(
        &self,
        school: &SchoolId,
        request: BookingRequest,
    ) -> Result<Booking, BookingError> {
        let BookingRequest {
            start,
            end,
            contact,
            source_call_ref,
        } = request;

        let candidate = validate_candidate(start, end)?;

        let handle = self.locks.handle(school);
        let critical_section = handle.lock_owned().await;

        let observation = self
            .aggregator
            .observe(school, candidate.align_outward(slot_length()))
            .await
            .map_err(BookingError::AvailabilityUnknown)?;

        if observation.busy.overlaps(&candidate) {
            info!(school = %school, slot = %candidate.start(), "slot already taken at commit time");
            return Err(BookingError::SlotTaken {
                start: candidate.start(),
            });
        }

        let bookings = self.aggregator.bookings();
        bookings
            .reserve_slot(school, candidate.start())
            .await
            .map_err(|err| match err {
                RepositoryError::UniqueConstraintViolation { scheduled_at, .. } => {
                    info!(school = %school, slot = %scheduled_at, "slot claimed by another commit");
                    BookingError::SlotTaken {
                        start: scheduled_at,
                    }
                }
                other => BookingError::Store(other),
            })?;

        let external_event = match &observation.connection {
            Some(connection) => {
                let details = contact.event_details(candidate);
                let created = within_deadline(
                    connection.provider,
                    self.aggregator.provider_timeout(),
                    self.aggregator.calendars().create_event(connection, &details),
                )
                .await;
                match created {
                    Ok(event) => Some(event),
                    Err(err) => {
                        warn!(
                            school = %school,
                            provider = %err.provider(),
                            code = err.code(),
                            error = %err,
                            "calendar event creation failed"
                        );
                        self.release_claim(school, candidate.start()).await;
                        return Err(BookingError::CalendarWriteFailed(err));
                    }
                }
            }
            None => None,
        };

        let booking = Booking {
            id: BookingId::generate(),
            school_id: school.clone(),
            contact,
            scheduled_at: candidate.start(),
            duration_minutes: SLOT_MINUTES,
            external_event,
            source_call: source_call_ref,
            created_at: Utc::now(),
        };
        let pending_event = booking.external_event.clone();

        let stored = match bookings.insert_booking(booking).await {
            Ok(stored) => stored,
            Err(err) => {
                if let Some(event) = &pending_event {
                    report_orphaned_event(school, event, &err);
                }
                return Err(match err {
                    RepositoryError::UniqueConstraintViolation { scheduled_at, .. } => {
                        info!(school = %school, slot = %scheduled_at, "storage rejected duplicate booking");
                        BookingError::SlotTaken {
                            start: scheduled_at,
                        }
                    }
                    other => {
                        self.release_claim(school, candidate.start()).await;
                        BookingError::Store(other)
                    }
                });
            }
        };
        drop(critical_section);

        info!(
            school = %school,
            booking = %stored.id.0,
            slot = %stored.scheduled_at,
            provider = stored.external_event.as_ref().map(|event| event.provider.label()).unwrap_or("none"),
            "tour booked"
        );

        if let Err(err) = self
            .notifier
            .tour_booked(BookingNotice::for_booking(&stored))
            .await
        {
            warn!(school = %school, booking = %stored.id.0, error = %err, "booking notification failed");
        }

        Ok(stored)
    }

    async fn release_claim(&self, school: &SchoolId, start: DateTime<Utc>) {
        if let Err(err) = self.aggregator.bookings().release_slot(school, start).await {
            warn!(school = %school, slot = %start, error = %err, "slot claim could not be released");
        }
    }

    /// Read-only form of the commit-time check. Never reports a slot as free
    /// when the busy-set cannot be built.
    pub async fn is_slot_available(
        &self,
        school: &SchoolId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, BookingError> {
        let candidate =
            Interval::new(start, end).map_err(|err| BookingError::InvalidRequest(err.to_string()))?;
        let busy = self
            .aggregator
            .busy_set(school, candidate.align_outward(slot_length()))
            .await
            .map_err(BookingError::AvailabilityUnknown)?;
        Ok(!busy.overlaps(&candidate))
    }

    pub async fn recent_bookings(
        &self,
        school: &SchoolId,
        limit: usize,
    ) -> Result<Vec<Booking>, BookingError> {
        self.aggregator
            .bookings()
            .recent_bookings(school, limit)
            .await
            .map_err(BookingError::Store)
    }
}

fn validate_candidate(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Interval, BookingError> {
    let candidate =
        Interval::new(start, end).map_err(|err| BookingError::InvalidRequest(err.to_string()))?;
    if candidate.duration() != slot_length() {
        return Err(BookingError::InvalidRequest(format!(
            "tour slots are {SLOT_MINUTES} minutes long, got {} minutes",
            candidate.duration().num_minutes()
        )));
    }
    if candidate.align_outward(slot_length()) != candidate {
        return Err(BookingError::InvalidRequest(format!(
            "tour slots start on a {SLOT_MINUTES}-minute boundary, got {}",
            candidate.start().format("%H:%M:%S")
        )));
    }
    Ok(candidate)
}

fn report_orphaned_event(school: &SchoolId, event: &EventRef, err: &RepositoryError) {
    warn!(
        school = %school,
        provider = %event.provider,
        event_id = %event.event_id,
        error = %err,
        "calendar event created but booking was not persisted"
    );
}
