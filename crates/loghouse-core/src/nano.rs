//! Nanosecond Time Scalars
//!
//! Time is a first-class type in the record model: [`Ts`] is a signed
//! 64-bit count of nanoseconds since the Unix epoch, and [`Span`] is a
//! half-open interval `[ts, ts + dur)` used to describe the time range a
//! batch of records covers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Nanoseconds since the Unix epoch.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Ts(pub i64);

impl Ts {
    pub const MIN: Ts = Ts(i64::MIN);
    pub const MAX: Ts = Ts(i64::MAX);

    pub const fn new(nanos: i64) -> Self {
        Ts(nanos)
    }

    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Truncate down to a multiple of `bin` nanoseconds (floor division, so
    /// negative timestamps land in the bin below zero rather than above).
    pub fn trunc(self, bin: i64) -> Ts {
        Ts(self.0.div_euclid(bin) * bin)
    }

    /// Seconds since the epoch, losing sub-second precision.
    pub const fn secs(self) -> i64 {
        self.0 / 1_000_000_000
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let frac = (self.0 % 1_000_000_000).unsigned_abs();
        let sign = if self.0 < 0 && secs == 0 { "-" } else { "" };
        if frac == 0 {
            write!(f, "{}{}", sign, secs)
        } else {
            let s = format!("{:09}", frac);
            write!(f, "{}{}.{}", sign, secs, s.trim_end_matches('0'))
        }
    }
}

/// A half-open time interval `[ts, ts + dur)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start of the interval.
    pub ts: Ts,
    /// Length of the interval in nanoseconds.
    pub dur: i64,
}

impl Span {
    pub const fn new(ts: Ts, dur: i64) -> Self {
        Span { ts, dur }
    }

    /// The span covering all representable time.
    pub const fn max() -> Self {
        Span {
            ts: Ts::MIN,
            dur: i64::MAX,
        }
    }

    pub const fn end(&self) -> Ts {
        Ts(self.ts.0.saturating_add(self.dur))
    }

    pub fn covers(&self, ts: Ts) -> bool {
        ts >= self.ts && ts < self.end()
    }

    /// Grow the span so that it includes `ts` (inclusive of the instant
    /// itself, so the duration is extended by one nanosecond when `ts` lands
    /// at or past the current end).
    pub fn extend(&mut self, ts: Ts) {
        if ts < self.ts {
            self.dur += self.ts.0 - ts.0;
            self.ts = ts;
        } else if ts >= self.end() {
            self.dur = ts.0 - self.ts.0 + 1;
        }
    }

    /// A span covering exactly one instant.
    pub const fn instant(ts: Ts) -> Self {
        Span { ts, dur: 1 }
    }
}
