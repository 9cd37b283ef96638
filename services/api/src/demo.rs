use crate::infra::{parse_clock_span, parse_date};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::Args;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tour_booking::error::AppError;
use tour_booking::scheduling::{
    slot_length, BookingError, BookingRequest, CalendarConnection, CalendarGateway, ContactDetails,
    Credential, EventDetails, EventRef, InMemoryBookingStore, InMemoryConnectionStore,
    InMemoryNotifier, Interval, ProviderError, ProviderKind, SchoolId, TourScheduler,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Tour date (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// School identifier used for the demo stores.
    #[arg(long, default_value = "demo-school")]
    pub(crate) school: String,
    /// Busy span on a simulated Google calendar (HH:MM-HH:MM, repeatable).
    /// Without any, the school has no calendar connected.
    #[arg(long, value_parser = parse_clock_span)]
    pub(crate) busy: Vec<(NaiveTime, NaiveTime)>,
    /// Slot start to book (HH:MM). Defaults to the first free slot.
    #[arg(long, value_parser = parse_clock)]
    pub(crate) book: Option<NaiveTime>,
    /// Visitor name written on the calendar event.
    #[arg(long, default_value = "Jordan Ellis")]
    pub(crate) visitor: String,
}

fn parse_clock(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|err| format!("failed to parse '{raw}' as HH:MM ({err})"))
}

/// Calendar stand-in with fixed busy time; accepts every event it is sent.
struct DemoCalendar {
    busy: Vec<Interval>,
    created: AtomicUsize,
}

#[async_trait]
impl CalendarGateway for DemoCalendar {
    async fn fetch_busy_intervals(
        &self,
        _connection: &CalendarConnection,
        window: Interval,
    ) -> Result<Vec<Interval>, ProviderError> {
        Ok(self
            .busy
            .iter()
            .copied()
            .filter(|busy| busy.overlaps(&window))
            .collect())
    }

    async fn create_event(
        &self,
        connection: &CalendarConnection,
        _details: &EventDetails,
    ) -> Result<EventRef, ProviderError> {
        let sequence = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(EventRef {
            provider: connection.provider,
            event_id: format!("demo-event-{sequence}"),
        })
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        date,
        school,
        busy,
        book,
        visitor,
    } = args;

    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let school = SchoolId(school);
    let busy: Vec<Interval> = busy
        .into_iter()
        .filter_map(|(from, to)| {
            Interval::new(date.and_time(from).and_utc(), date.and_time(to).and_utc()).ok()
        })
        .collect();

    let connections = InMemoryConnectionStore::default();
    if !busy.is_empty() {
        connections
            .upsert(CalendarConnection {
                school_id: school.clone(),
                provider: ProviderKind::Google,
                connected: true,
                credential: Credential::new("demo-token"),
                last_connected_at: Some(Utc::now()),
            })
            .map_err(BookingError::Store)?;
    }

    let notifier = InMemoryNotifier::default();
    let scheduler = TourScheduler::new(
        Arc::new(connections),
        Arc::new(InMemoryBookingStore::default()),
        Arc::new(DemoCalendar {
            busy: busy.clone(),
            created: AtomicUsize::new(0),
        }),
        Arc::new(notifier.clone()),
        Duration::from_secs(5),
    );

    println!("Tour booking demo");
    println!("  School: {school}");
    println!("  Date: {date}");
    let hours = scheduler.business_hours();
    println!(
        "  Business hours (UTC): {} - {}",
        hours.opens().format("%H:%M"),
        hours.closes().format("%H:%M")
    );
    if busy.is_empty() {
        println!("  Calendar: none connected (bookings only)");
    } else {
        println!("  Calendar: google (simulated)");
        for span in &busy {
            println!(
                "    busy {} - {}",
                span.start().format("%H:%M"),
                span.end().format("%H:%M")
            );
        }
    }

    let day = scheduler
        .free_slots(&school, date, None)
        .await
        .map_err(BookingError::AvailabilityUnknown)?;

    println!("\nFree slots ({})", day.free_slots.len());
    for row in day.free_slots.chunks(8) {
        let line: Vec<String> = row
            .iter()
            .map(|slot| slot.start.format("%H:%M").to_string())
            .collect();
        println!("  {}", line.join("  "));
    }

    let start = match book {
        Some(time) => date.and_time(time).and_utc(),
        None => match day.free_slots.first() {
            Some(slot) => slot.start,
            None => {
                println!("\nNo free slots to book.");
                return Ok(());
            }
        },
    };

    let request = BookingRequest {
        start,
        end: start + slot_length(),
        contact: ContactDetails {
            name: visitor,
            reason: "Campus tour".to_string(),
            ..ContactDetails::default()
        },
        source_call_ref: None,
    };

    println!("\nBooking {}", start.format("%H:%M"));
    let booking = scheduler.book_slot(&school, request.clone()).await?;
    println!("  Booking id: {}", booking.id.0);
    match &booking.external_event {
        Some(event) => println!("  Calendar event: {} ({})", event.event_id, event.provider),
        None => println!("  Calendar event: none (local booking)"),
    }
    for notice in notifier.notices() {
        println!(
            "  Notice queued: {} for {}",
            notice.template, notice.contact_name
        );
    }

    println!("\nBooking the same slot again");
    match scheduler.book_slot(&school, request).await {
        Ok(duplicate) => println!("  Unexpectedly booked twice: {}", duplicate.id.0),
        Err(err) => println!("  Rejected ({}): {}", err.code(), err),
    }

    Ok(())
}
