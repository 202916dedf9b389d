//! Time and duration conversion utilities.
//!
//! The library stores lengths in nanoseconds, MPRIS speaks microseconds and
//! the lyric engine works in milliseconds; these helpers convert between
//! them with explicit saturation instead of truncating casts.

use std::time::Duration;

/// Extension trait for saturating Duration conversions.
pub trait DurationExt {
    /// Milliseconds as u64, saturating at `u64::MAX`.
    fn as_millis_u64(&self) -> u64;

    /// Microseconds as i64, saturating at `i64::MAX`. Used for MPRIS positions.
    fn as_micros_i64(&self) -> i64;

    /// Nanoseconds as i64, saturating at `i64::MAX`. Used by the library file.
    fn as_nanos_i64(&self) -> i64;

    /// Seconds as u32, saturating at `u32::MAX`.
    fn as_secs_u32(&self) -> u32;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }

    fn as_micros_i64(&self) -> i64 {
        i64::try_from(self.as_micros()).unwrap_or(i64::MAX)
    }

    fn as_nanos_i64(&self) -> i64 {
        i64::try_from(self.as_nanos()).unwrap_or(i64::MAX)
    }

    fn as_secs_u32(&self) -> u32 {
        u32::try_from(self.as_secs()).unwrap_or(u32::MAX)
    }
}

/// Build a duration from signed microseconds; negative values clamp to zero.
#[must_use]
pub fn from_micros_i64(micros: i64) -> Duration {
    u64::try_from(micros).map_or(Duration::ZERO, Duration::from_micros)
}

/// Build a duration from signed nanoseconds; negative values clamp to zero.
#[must_use]
pub fn from_nanos_i64(nanos: i64) -> Duration {
    u64::try_from(nanos).map_or(Duration::ZERO, Duration::from_nanos)
}

/// Shift a duration by a signed number of microseconds, clamping at zero.
#[must_use]
pub fn offset_micros(base: Duration, delta: i64) -> Duration {
    let magnitude = Duration::from_micros(delta.unsigned_abs());
    if delta >= 0 {
        base.saturating_add(magnitude)
    } else {
        base.saturating_sub(magnitude)
    }
}

/// Format a duration as `m:ss` for display.
#[must_use]
pub fn format_clock(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_millis_u64() {
        assert_eq!(Duration::from_millis(1234).as_millis_u64(), 1234);
        assert_eq!(Duration::ZERO.as_millis_u64(), 0);
    }

    #[test]
    fn test_as_micros_i64() {
        assert_eq!(Duration::from_millis(5).as_micros_i64(), 5000);
    }

    #[test]
    fn test_as_nanos_i64() {
        assert_eq!(Duration::from_secs(2).as_nanos_i64(), 2_000_000_000);
    }

    #[test]
    fn test_as_secs_u32_large() {
        let duration = Duration::from_secs(u64::from(u32::MAX) + 1);
        assert_eq!(duration.as_secs_u32(), u32::MAX);
    }

    #[test]
    fn test_from_signed_clamps_negative() {
        assert_eq!(from_micros_i64(-5), Duration::ZERO);
        assert_eq!(from_nanos_i64(-1), Duration::ZERO);
        assert_eq!(from_micros_i64(1500), Duration::from_micros(1500));
    }

    #[test]
    fn test_offset_micros() {
        let base = Duration::from_secs(10);
        assert_eq!(offset_micros(base, 2_000_000), Duration::from_secs(12));
        assert_eq!(offset_micros(base, -3_000_000), Duration::from_secs(7));
        assert_eq!(offset_micros(base, -30_000_000), Duration::ZERO);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(Duration::from_secs(0)), "0:00");
        assert_eq!(format_clock(Duration::from_secs(185)), "3:05");
    }
}
