use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open span of time `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("interval end {end} must be after start {start}")]
pub struct IntervalError {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, IntervalError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(IntervalError { start, end })
        }
    }

    /// Callers guarantee `start < end` through their own invariants.
    pub(crate) fn from_ordered(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "interval bounds out of order");
        Self { start, end }
    }

    /// Interval of `length` starting at `start`; `length` must be positive.
    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Result<Self, IntervalError> {
        Self::new(start, start + length)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        overlaps(self, other)
    }

    /// Smallest interval whose bounds sit on multiples of `granularity`
    /// (counted from the Unix epoch) and that contains `self`.
    pub fn align_outward(&self, granularity: Duration) -> Interval {
        let step = granularity.num_seconds();
        if step <= 0 {
            return *self;
        }

        let start_secs = self.start.timestamp().div_euclid(step) * step;
        let end_secs = {
            let raw = self.end.timestamp();
            let floored = raw.div_euclid(step) * step;
            let has_fraction = raw != floored || self.end.timestamp_subsec_nanos() > 0;
            if has_fraction {
                floored + step
            } else {
                floored
            }
        };

        match (
            DateTime::from_timestamp(start_secs, 0),
            DateTime::from_timestamp(end_secs, 0),
        ) {
            (Some(start), Some(end)) => Interval { start, end },
            _ => *self,
        }
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Interval::new(raw.start, raw.end).map_err(serde::de::Error::custom)
    }
}

/// `true` when the two half-open intervals share at least one instant.
pub fn overlaps(a: &Interval, b: &Interval) -> bool {
    a.start < b.end && b.start < a.end
}

/// Coalesces overlapping and touching intervals into a sorted, disjoint list.
///
/// Any interval overlaps the result exactly when it overlaps the input.
pub fn merge(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort();
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}
