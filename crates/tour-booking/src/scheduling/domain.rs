use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::interval::Interval;

/// Width of every candidate slot and every booking.
pub const SLOT_MINUTES: u32 = 15;

pub fn slot_length() -> Duration {
    Duration::minutes(i64::from(SLOT_MINUTES))
}

/// Tenant identifier; every calendar lookup and booking is scoped to one school.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchoolId(pub String);

impl fmt::Display for SchoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External calendar vendors. Declaration order is the connection preference
/// order (alphabetical by name), so `Google` wins when both are connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Outlook,
}

impl ProviderKind {
    pub const PREFERENCE: [ProviderKind; 2] = [ProviderKind::Google, ProviderKind::Outlook];

    pub const fn label(self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Outlook => "outlook",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque bearer credential handed over by the tenant-settings subsystem.
/// Never parsed here and never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn bearer_token(&self) -> Option<&str> {
        let token = self.0.trim();
        (!token.is_empty()).then_some(token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Per-school calendar link. Read-only from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarConnection {
    pub school_id: SchoolId,
    pub provider: ProviderKind,
    pub connected: bool,
    pub credential: Credential,
    #[serde(default)]
    pub last_connected_at: Option<DateTime<Utc>>,
}

/// Handle to an event created on an external calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRef {
    pub provider: ProviderKind,
    pub event_id: String,
}

/// Fields a provider needs to create a tour event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDetails {
    pub title: String,
    pub slot: Interval,
    pub description: String,
}

/// Visitor details captured by the voice agent or the booking form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactDetails {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub child_age: String,
    pub reason: String,
}

impl ContactDetails {
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() {
            "Prospective family"
        } else {
            name
        }
    }

    /// Event title and description written to the school's calendar.
    pub fn event_details(&self, slot: Interval) -> EventDetails {
        let mut lines = Vec::new();
        for (label, value) in [
            ("Parent", &self.name),
            ("Phone", &self.phone),
            ("Email", &self.email),
            ("Child age", &self.child_age),
            ("Reason", &self.reason),
        ] {
            if !value.trim().is_empty() {
                lines.push(format!("{label}: {}", value.trim()));
            }
        }

        EventDetails {
            title: format!("School tour: {}", self.display_name()),
            slot,
            description: lines.join("\n"),
        }
    }
}

/// Reference to the call record that produced a booking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallRef(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub Uuid);

impl BookingId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Committed tour booking. Created once per successful commit and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub school_id: SchoolId,
    pub contact: ContactDetails,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub external_event: Option<EventRef>,
    pub source_call: Option<CallRef>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Occupied span `[scheduled_at, scheduled_at + duration)`.
    pub fn interval(&self) -> Interval {
        let minutes = self.duration_minutes.max(1);
        Interval::from_ordered(
            self.scheduled_at,
            self.scheduled_at + Duration::minutes(i64::from(minutes)),
        )
    }
}

/// Input to a booking attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub contact: ContactDetails,
    #[serde(default)]
    pub source_call_ref: Option<CallRef>,
}

/// Opening window used to build candidate slots for a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    opens: NaiveTime,
    closes: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusinessHoursError {
    #[error("'{0}' is not a valid HH:MM time")]
    InvalidTime(String),
    #[error("business hours must open before they close ({opens} >= {closes})")]
    Inverted { opens: NaiveTime, closes: NaiveTime },
    #[error("business hours must open on a {SLOT_MINUTES}-minute boundary, got {0}")]
    OffGrid(NaiveTime),
}

impl BusinessHours {
    /// Slots tile from `opens`, so it has to sit on the slot grid for every
    /// offered slot to be bookable. `closes` may fall anywhere.
    pub fn new(opens: NaiveTime, closes: NaiveTime) -> Result<Self, BusinessHoursError> {
        if opens >= closes {
            return Err(BusinessHoursError::Inverted { opens, closes });
        }
        if !on_slot_grid(opens) {
            return Err(BusinessHoursError::OffGrid(opens));
        }
        Ok(Self { opens, closes })
    }

    pub fn parse(opens: &str, closes: &str) -> Result<Self, BusinessHoursError> {
        Self::new(parse_clock(opens)?, parse_clock(closes)?)
    }

    pub fn opens(&self) -> NaiveTime {
        self.opens
    }

    pub fn closes(&self) -> NaiveTime {
        self.closes
    }

    /// Resolves the hours against a calendar date, in UTC.
    pub fn window_on(&self, date: NaiveDate) -> Interval {
        Interval::from_ordered(
            date.and_time(self.opens).and_utc(),
            date.and_time(self.closes).and_utc(),
        )
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        let opens = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default();
        let closes = NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default();
        Self { opens, closes }
    }
}

fn on_slot_grid(time: NaiveTime) -> bool {
    time.second() == 0 && time.nanosecond() == 0 && time.minute() % SLOT_MINUTES == 0
}

fn parse_clock(raw: &str) -> Result<NaiveTime, BusinessHoursError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| BusinessHoursError::InvalidTime(raw.to_string()))
}

/// One bookable slot as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<Interval> for SlotInterval {
    fn from(value: Interval) -> Self {
        Self {
            start: value.start(),
            end: value.end(),
        }
    }
}

/// Free slots for one school on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub free_slots: Vec<SlotInterval>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn provider_preference_is_alphabetical() {
        let mut kinds = vec![ProviderKind::Outlook, ProviderKind::Google];
        kinds.sort();
        assert_eq!(kinds, ProviderKind::PREFERENCE.to_vec());
        assert!(ProviderKind::Google.label() < ProviderKind::Outlook.label());
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("ya29.secret-token");
        assert!(!format!("{credential:?}").contains("secret"));
        assert_eq!(credential.bearer_token(), Some("ya29.secret-token"));
        assert_eq!(Credential::new("  ").bearer_token(), None);
    }

    #[test]
    fn business_hours_parse_and_resolve() {
        let hours = BusinessHours::parse("08:30", "12:00").expect("valid hours");
        let date = NaiveDate::from_ymd_opt(2025, 10, 1).expect("valid date");
        let window = hours.window_on(date);
        assert_eq!(
            window.start(),
            Utc.with_ymd_and_hms(2025, 10, 1, 8, 30, 0).unwrap()
        );
        assert_eq!(
            window.end(),
            Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn business_hours_reject_bad_input() {
        assert!(matches!(
            BusinessHours::parse("9am", "17:00"),
            Err(BusinessHoursError::InvalidTime(_))
        ));
        assert!(matches!(
            BusinessHours::parse("17:00", "17:00"),
            Err(BusinessHoursError::Inverted { .. })
        ));
        assert!(matches!(
            BusinessHours::parse("09:10", "17:00"),
            Err(BusinessHoursError::OffGrid(_))
        ));
        assert!(BusinessHours::parse("09:45", "16:50").is_ok());
    }

    #[test]
    fn event_details_skip_blank_contact_fields() {
        let contact = ContactDetails {
            name: "Dana Whitfield".to_string(),
            phone: "+15155550100".to_string(),
            reason: "Kindergarten tour".to_string(),
            ..ContactDetails::default()
        };
        let slot = Interval::starting_at(
            Utc.with_ymd_and_hms(2025, 10, 1, 10, 0, 0).unwrap(),
            slot_length(),
        )
        .expect("slot");
        let details = contact.event_details(slot);
        assert_eq!(details.title, "School tour: Dana Whitfield");
        assert!(details.description.contains("Phone: +15155550100"));
        assert!(!details.description.contains("Email"));

        let anonymous = ContactDetails::default().event_details(slot);
        assert_eq!(anonymous.title, "School tour: Prospective family");
    }
}
