//! Host-time helpers.
//!
//! All scheduling in this system is expressed in absolute epoch seconds as
//! `f64`, matching the device's fractional-second time registers. This module
//! holds the conversions between that representation, `SystemTime`, and the
//! rendered forms used in outbound messages and capture file names, plus the
//! PPS edge arithmetic used by the clock-sync supervisor.

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current host time as fractional epoch seconds.
pub fn host_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Render epoch seconds as `s.uuuuuu` (six fractional digits), the wire form
/// used in outbound status messages.
pub fn format_epoch(t: f64) -> String {
    format!("{t:.6}")
}

/// Render epoch seconds as a `YYYY-MM-DD-HH:MM:SS.mmm` UTC date stamp for
/// capture file names.
pub fn datestamp(t: f64) -> String {
    let secs = t.floor() as i64;
    let nanos = ((t - t.floor()) * 1e9) as u32;
    let dt: DateTime<Utc> = DateTime::from_timestamp(secs, nanos).unwrap_or_default();
    dt.format("%Y-%m-%d-%H:%M:%S%.3f").to_string()
}

/// Epoch time of the next PPS edge strictly after `now`.
pub fn next_edge(now: f64, period: f64) -> f64 {
    (now / period).floor() * period + period
}

/// True when `now` sits within `slack` seconds of a PPS edge, on either side.
///
/// Writing the device time registers inside this window risks racing the
/// hardware's own edge-driven latch, so the supervisor waits it out.
pub fn near_edge(now: f64, slack: f64, period: f64) -> bool {
    let phase = now.rem_euclid(period);
    phase <= slack || phase + slack >= period
}
