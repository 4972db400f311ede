//! Virtual time for the simulation
//!
//! The simulation runs in virtual time with nanosecond resolution. A
//! [`SimTime`] is an absolute point on that clock (nanoseconds since
//! midnight); durations are plain `i64` nanosecond counts. Wall clock time
//! plays no role anywhere in the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

const NS_PER_SEC: i64 = 1_000_000_000;
const NS_PER_MIN: i64 = 60 * NS_PER_SEC;
const NS_PER_HOUR: i64 = 60 * NS_PER_MIN;

/// An absolute point in virtual time, nanosecond resolution.
///
/// `SimTime` is ordered and supports adding signed nanosecond durations,
/// which is all the scheduling machinery needs.
///
/// # Example
/// ```
/// use market_simulator_core_rs::SimTime;
///
/// let open = SimTime::from_hours(9) + 30 * 60 * 1_000_000_000;
/// let close = SimTime::from_hours(16);
/// assert!(open < close);
/// assert_eq!(close - open, 23_400_000_000_000); // 6.5 hours in ns
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(i64);

impl SimTime {
    /// Construct from nanoseconds since midnight.
    pub const fn from_ns(ns: i64) -> Self {
        Self(ns)
    }

    /// Construct from whole seconds since midnight.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * NS_PER_SEC)
    }

    /// Construct from whole minutes since midnight.
    pub const fn from_minutes(minutes: i64) -> Self {
        Self(minutes * NS_PER_MIN)
    }

    /// Construct from whole hours since midnight.
    pub const fn from_hours(hours: i64) -> Self {
        Self(hours * NS_PER_HOUR)
    }

    /// Nanoseconds since midnight.
    pub const fn as_ns(self) -> i64 {
        self.0
    }
}

impl Add<i64> for SimTime {
    type Output = SimTime;

    fn add(self, ns: i64) -> SimTime {
        SimTime(self.0 + ns)
    }
}

impl AddAssign<i64> for SimTime {
    fn add_assign(&mut self, ns: i64) {
        self.0 += ns;
    }
}

impl Sub<i64> for SimTime {
    type Output = SimTime;

    fn sub(self, ns: i64) -> SimTime {
        SimTime(self.0 - ns)
    }
}

impl Sub for SimTime {
    type Output = i64;

    /// Signed duration in nanoseconds between two points.
    fn sub(self, other: SimTime) -> i64 {
        self.0 - other.0
    }
}

impl fmt::Display for SimTime {
    /// Renders as `HH:MM:SS.nnnnnnnnn`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ns = self.0;
        let sign = if ns < 0 {
            ns = -ns;
            "-"
        } else {
            ""
        };
        let hr = ns / NS_PER_HOUR;
        ns -= hr * NS_PER_HOUR;
        let min = ns / NS_PER_MIN;
        ns -= min * NS_PER_MIN;
        let sec = ns / NS_PER_SEC;
        ns -= sec * NS_PER_SEC;
        write!(f, "{}{:02}:{:02}:{:02}.{:09}", sign, hr, min, sec, ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_ns() {
        assert_eq!(SimTime::from_secs(2).as_ns(), 2_000_000_000);
        assert_eq!(SimTime::from_minutes(1).as_ns(), 60_000_000_000);
        assert_eq!(SimTime::from_hours(1), SimTime::from_minutes(60));
    }

    #[test]
    fn test_add_and_sub_durations() {
        let t = SimTime::from_ns(5_000);
        assert_eq!((t + 10).as_ns(), 5_010);
        assert_eq!((t - 10).as_ns(), 4_990);

        let mut u = t;
        u += 1_000;
        assert_eq!(u.as_ns(), 6_000);
        assert_eq!(u - t, 1_000);
    }

    #[test]
    fn test_display_format() {
        let t = SimTime::from_hours(9) + 5 * NS_PER_MIN + 7 * NS_PER_SEC + 42;
        assert_eq!(t.to_string(), "09:05:07.000000042");
        assert_eq!(SimTime::from_ns(0).to_string(), "00:00:00.000000000");
    }

    #[test]
    fn test_ordering() {
        assert!(SimTime::from_ns(1) < SimTime::from_ns(2));
        assert!(SimTime::from_ns(2) <= SimTime::from_ns(2));
    }
}
