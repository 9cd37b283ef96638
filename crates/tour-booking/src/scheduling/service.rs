use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use super::availability::AvailabilityService;
use super::booking::{BookingError, BookingOrchestrator};
use super::busy::{AggregationError, BusySetAggregator};
use super::domain::{Booking, BookingRequest, BusinessHours, DayAvailability, SchoolId};
use super::providers::CalendarGateway;
use super::repository::{BookingNotifier, BookingRepository, ConnectionStore};

/// Entry point used by the HTTP router and the voice agent tools.
///
/// Reads and commits share one [`BusySetAggregator`], so the slots a caller
/// was offered and the commit-time check see the same sources.
pub struct TourScheduler {
    availability: AvailabilityService,
    booking: BookingOrchestrator,
    business_hours: BusinessHours,
}

impl TourScheduler {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        bookings: Arc<dyn BookingRepository>,
        calendars: Arc<dyn CalendarGateway>,
        notifier: Arc<dyn BookingNotifier>,
        provider_timeout: Duration,
    ) -> Self {
        let aggregator = Arc::new(BusySetAggregator::new(
            connections,
            bookings,
            calendars,
            provider_timeout,
        ));
        Self {
            availability: AvailabilityService::new(aggregator.clone()),
            booking: BookingOrchestrator::new(aggregator, notifier),
            business_hours: BusinessHours::default(),
        }
    }

    pub fn with_business_hours(mut self, hours: BusinessHours) -> Self {
        self.business_hours = hours;
        self
    }

    pub fn business_hours(&self) -> BusinessHours {
        self.business_hours
    }

    pub async fn free_slots(
        &self,
        school: &SchoolId,
        date: NaiveDate,
        hours: Option<BusinessHours>,
    ) -> Result<DayAvailability, AggregationError> {
        self.availability
            .free_slots(school, date, hours.unwrap_or(self.business_hours))
            .await
    }

    pub async fn is_slot_available(
        &self,
        school: &SchoolId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, BookingError> {
        self.booking.is_slot_available(school, start, end).await
    }

    pub async fn book_slot(
        &self,
        school: &SchoolId,
        request: BookingRequest,
    ) -> Result<Booking, BookingError> {
        self.booking.book_slot(school, request).await
    }

    pub async fn recent_bookings(
        &self,
        school: &SchoolId,
        limit: usize,
    ) -> Result<Vec<Booking>, BookingError> {
        self.booking.recent_bookings(school, limit).await
    }
}
