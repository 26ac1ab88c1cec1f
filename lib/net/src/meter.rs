//! Rate meter (§4.3.3): a READER periodically reports its receive publisher's occupancy as a
//! single byte on `[0, 255]`; a WRITER gates outgoing frames on the last value it has seen.

use std::time::Duration;

/// How often a READER samples its publisher occupancy and sends a fresh meter byte.
pub const METER_PERIOD: Duration = Duration::from_millis(1000);

/// A WRITER sends outgoing frames only while `meter < METER_SEND_THRESH` (50% of the scale),
/// unless the connection is blind.
pub const METER_SEND_THRESH: gdf_kernel::Meter = 128;

/// `meter = (count * 255) / depth`, saturating at 255 for a zero-depth publisher (treated as
/// always-full so a misconfigured depth never silently reports an empty queue).
#[inline]
pub fn compute_meter(count: usize, depth: usize) -> gdf_kernel::Meter {
    if depth == 0 {
        return 255;
    }
    let value = (count as u64 * 255) / depth as u64;
    value.min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_first_meter_byte_matches_the_worked_example() {
        assert_eq!(compute_meter(80, 100), 204);
    }

    #[test]
    fn below_half_is_under_send_threshold() {
        assert!(compute_meter(49, 100) < METER_SEND_THRESH);
        assert!(compute_meter(51, 100) >= METER_SEND_THRESH);
    }
}
