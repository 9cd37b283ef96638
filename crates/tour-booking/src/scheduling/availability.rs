use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::debug;

use super::busy::{AggregationError, BusySet, BusySetAggregator};
use super::domain::{slot_length, BusinessHours, DayAvailability, SchoolId, SlotInterval};
use super::interval::Interval;

/// Full-width slots of `length` tiling `range` from its start. A trailing
/// remainder shorter than `length` is dropped.
pub fn candidate_slots(range: Interval, length: Duration) -> impl Iterator<Item = Interval> {
    let end = range.end();
    let mut cursor = range.start();
    std::iter::from_fn(move || {
        if length <= Duration::zero() {
            return None;
        }
        let slot_end = cursor + length;
        if slot_end > end {
            return None;
        }
        let slot = Interval::from_ordered(cursor, slot_end);
        cursor = slot_end;
        Some(slot)
    })
}

/// Candidate slots of `range` that overlap nothing in `busy`, in order.
pub fn free_slots_in(range: Interval, length: Duration, busy: &BusySet) -> Vec<Interval> {
    candidate_slots(range, length)
        .filter(|slot| !busy.overlaps(slot))
        .collect()
}

/// Lists bookable tour slots for a school's day.
pub struct AvailabilityService {
    aggregator: Arc<BusySetAggregator>,
}

impl AvailabilityService {
    pub fn new(aggregator: Arc<BusySetAggregator>) -> Self {
        Self { aggregator }
    }

    /// Free 15-minute slots within `hours` on `date`. Fails instead of
    /// returning a partial list when the busy-set cannot be built.
    pub async fn free_slots(
        &self,
        school: &SchoolId,
        date: NaiveDate,
        hours: BusinessHours,
    ) -> Result<DayAvailability, AggregationError> {
        let range = hours.window_on(date);
        let busy = self.aggregator.busy_set(school, range).await?.coalesced();
        let free_slots: Vec<SlotInterval> = free_slots_in(range, slot_length(), &busy)
            .into_iter()
            .map(SlotInterval::from)
            .collect();

        debug!(school = %school, %date, busy = busy.len(), free = free_slots.len(), "computed availability");

        Ok(DayAvailability { date, free_slots })
    }
}
