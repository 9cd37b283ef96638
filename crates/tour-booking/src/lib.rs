//! Availability and booking engine for school tour scheduling.
//!
//! The [`scheduling`] module computes free tour slots for a school by merging
//! busy time from a connected Google or Outlook calendar with the engine's own
//! bookings, and commits new bookings exactly once per slot.

pub mod config;
pub mod error;
pub mod scheduling;
pub mod telemetry;
