//! Textual timestamp format shared by measurement producers and the
//! edge-delta computation in the state listener.
//!
//! The format is fixed: both sides of the wire must agree, and parsing a
//! formatted value must round-trip to millisecond precision.

use chrono::NaiveDateTime;

use crate::error::DetectError;

pub const TIME_STR_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub fn now_str() -> String {
    format_timestamp(now())
}

pub fn format_timestamp(t: NaiveDateTime) -> String {
    t.format(TIME_STR_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, DetectError> {
    NaiveDateTime::parse_from_str(s, TIME_STR_FORMAT)
        .map_err(|e| DetectError::parse(s, e.to_string()))
}

/// Millisecond delta `t2 - t1`, negative when `t2` precedes `t1`.
pub fn delta_ms(t1: NaiveDateTime, t2: NaiveDateTime) -> f64 {
    (t2 - t1).num_microseconds().map_or_else(
        || (t2 - t1).num_milliseconds() as f64,
        |us| us as f64 / 1000.0,
    )
}
