//! Monotonic and GPS time helpers, grounded on `flux::time::timestamp_secs` but generalized to the
//! typed-value kernel's `time64` (nanoseconds) requirement.

use std::time::{Instant, SystemTime};

/// GPS epoch (1980-01-06T00:00:00Z) expressed as seconds since the Unix epoch.
const GPS_EPOCH_UNIX_SECS: i64 = 315_964_800;

/// Leap seconds inserted between the GPS epoch and the Unix epoch's leap-second count as of this
/// spec (GPS time does not observe leap seconds, so the offset grows by one every time a leap
/// second is inserted after 1980). This is a fixed table, not a live lookup: updating it for a
/// newly announced leap second is a deliberate, reviewed change.
const LEAP_SECONDS_SINCE_GPS_EPOCH: i64 = 18;

/// Returns the current unix timestamp in seconds elapsed since 1970-01-01.
#[inline]
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs()
}

/// Returns a monotonic clock reading suitable for measuring elapsed durations (meter pacing,
/// housekeeping intervals, handshake/ingress timeouts). Never goes backwards within a process.
#[inline]
pub fn monotonic_now() -> Instant {
    Instant::now()
}

/// Returns the current time in nanoseconds since the GPS epoch, the `time64` representation used
/// by the typed value kernel for `TIME_COLUMN` data.
#[inline]
pub fn gps_now_ns() -> i64 {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock is before the unix epoch");

    let unix_secs = now.as_secs() as i64;
    let gps_secs = unix_secs - GPS_EPOCH_UNIX_SECS + LEAP_SECONDS_SINCE_GPS_EPOCH;

    gps_secs * 1_000_000_000 + now.subsec_nanos() as i64
}

/// Converts a GPS time64 value (nanoseconds since the GPS epoch) to Unix nanoseconds.
#[inline]
pub fn gps_ns_to_unix_ns(gps_ns: i64) -> i64 {
    gps_ns - (GPS_EPOCH_UNIX_SECS - LEAP_SECONDS_SINCE_GPS_EPOCH) * 1_000_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_round_trip_is_close_to_unix() {
        let gps_ns = gps_now_ns();
        let unix_ns = gps_ns_to_unix_ns(gps_ns);
        let now_unix_ns = unix_now_secs() as i64 * 1_000_000_000;

        assert!((unix_ns - now_unix_ns).abs() < 2_000_000_000);
    }
}
