use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::booking::BookingError;
use super::busy::AggregationError;
use super::domain::{BookingRequest, BusinessHours, SchoolId};
use super::service::TourScheduler;

pub const DEFAULT_BOOKING_LIMIT: usize = 50;
const MAX_BOOKING_LIMIT: usize = 500;

/// Router exposing availability and booking endpoints for every school.
pub fn scheduling_router(scheduler: Arc<TourScheduler>) -> Router {
    Router::new()
        .route(
            "/api/v1/schools/:school_id/availability",
            get(availability_handler),
        )
        .route(
            "/api/v1/schools/:school_id/availability/check",
            get(check_handler),
        )
        .route(
            "/api/v1/schools/:school_id/bookings",
            get(list_bookings_handler).post(book_handler),
        )
        .with_state(scheduler)
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailabilityQuery {
    date: NaiveDate,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckQuery {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    limit: Option<usize>,
}

pub(crate) async fn availability_handler(
    State(scheduler): State<Arc<TourScheduler>>,
    Path(school_id): Path<String>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return invalid_request(rejection.body_text()),
    };

    let hours = match (query.start.as_deref(), query.end.as_deref()) {
        (None, None) => None,
        (Some(start), Some(end)) => match BusinessHours::parse(start, end) {
            Ok(hours) => Some(hours),
            Err(err) => return invalid_request(err.to_string()),
        },
        _ => return invalid_request("start and end must be given together".to_string()),
    };

    let school = SchoolId(school_id);
    match scheduler.free_slots(&school, query.date, hours).await {
        Ok(day) => (StatusCode::OK, axum::Json(day)).into_response(),
        Err(err) => aggregation_failure(&err),
    }
}

pub(crate) async fn check_handler(
    State(scheduler): State<Arc<TourScheduler>>,
    Path(school_id): Path<String>,
    query: Result<Query<CheckQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return invalid_request(rejection.body_text()),
    };

    let school = SchoolId(school_id);
    match scheduler
        .is_slot_available(&school, query.start, query.end)
        .await
    {
        Ok(available) => {
            (StatusCode::OK, axum::Json(json!({ "available": available }))).into_response()
        }
        Err(err) => booking_failure(&err),
    }
}

pub(crate) async fn book_handler(
    State(scheduler): State<Arc<TourScheduler>>,
    Path(school_id): Path<String>,
    payload: Result<axum::Json<BookingRequest>, JsonRejection>,
) -> Response {
    let axum::Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_request(rejection.body_text()),
    };

    let school = SchoolId(school_id);
    match scheduler.book_slot(&school, request).await {
        Ok(booking) => (StatusCode::CREATED, axum::Json(booking)).into_response(),
        Err(err) => booking_failure(&err),
    }
}

pub(crate) async fn list_bookings_handler(
    State(scheduler): State<Arc<TourScheduler>>,
    Path(school_id): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return invalid_request(rejection.body_text()),
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_BOOKING_LIMIT)
        .clamp(1, MAX_BOOKING_LIMIT);

    let school = SchoolId(school_id);
    match scheduler.recent_bookings(&school, limit).await {
        Ok(bookings) => (StatusCode::OK, axum::Json(bookings)).into_response(),
        Err(err) => booking_failure(&err),
    }
}

pub(crate) fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::SlotTaken { .. } => StatusCode::CONFLICT,
        BookingError::AvailabilityUnknown(inner) => aggregation_status(inner),
        BookingError::CalendarWriteFailed(_) => StatusCode::BAD_GATEWAY,
        BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn aggregation_status(err: &AggregationError) -> StatusCode {
    match err {
        AggregationError::Provider(_) => StatusCode::SERVICE_UNAVAILABLE,
        AggregationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn booking_failure(err: &BookingError) -> Response {
    let status = booking_status(err);
    if status.is_server_error() {
        error!(code = err.code(), error = %err, "booking request failed");
    }
    error_body(status, err.code(), err.to_string())
}

pub(crate) fn aggregation_failure(err: &AggregationError) -> Response {
    let code = match err {
        AggregationError::Provider(_) => "availability_unknown",
        AggregationError::Store(_) => "store_unavailable",
    };
    error!(code, error = %err, "availability request failed");
    error_body(aggregation_status(err), code, err.to_string())
}

fn invalid_request(reason: String) -> Response {
    error_body(StatusCode::UNPROCESSABLE_ENTITY, "invalid_request", reason)
}

fn error_body(status: StatusCode, code: &str, reason: String) -> Response {
    let payload = json!({
        "error": code,
        "reason": reason,
    });
    (status, axum::Json(payload)).into_response()
}
