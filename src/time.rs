//! Total order over the `"sec.usec"` timestamps returned by the store.
//!
//! Lock records store their first-grant time as `{sec}.{usec}`, and victim
//! selection needs a total order over these strings. The subtlety
//! the name hides: the part after the dot is a *count of microseconds*, not
//! a decimal fraction, so `"0.30"` (30 microseconds) is strictly greater
//! than `"0.4"` (4 microseconds) even though `0.30 < 0.4` as decimals.

use std::cmp::Ordering;

/// A parsed `sec.usec` timestamp, comparable as `(sec, usec)` integer pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub sec: i64,
    pub usec: i64,
}

impl Timestamp {
    pub fn new(sec: i64, usec: i64) -> Self {
        Timestamp { sec, usec }
    }

    /// Parse a `"sec.usec"` string as stored in a lock record.
    ///
    /// Returns `None` if the string isn't of the form `digits.digits`.
    pub fn parse(s: &str) -> Option<Self> {
        let (sec, usec) = s.split_once('.')?;
        let sec: i64 = sec.parse().ok()?;
        let usec: i64 = usec.parse().ok()?;
        Some(Timestamp { sec, usec })
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.sec, self.usec)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sec.cmp(&other.sec).then(self.usec.cmp(&other.usec))
    }
}

/// Compare two `"sec.usec"` strings the way victim selection requires:
/// primary key `sec`, secondary key `usec`, both parsed as integers.
///
/// Malformed input parses as `(0, 0)` so a corrupt record never panics this
/// comparison; callers that can distinguish "missing" from "malformed"
/// should do so before calling this (see [`Timestamp::parse`]).
pub fn cmp(a: &str, b: &str) -> Ordering {
    let ta = Timestamp::parse(a).unwrap_or(Timestamp::new(0, 0));
    let tb = Timestamp::parse(b).unwrap_or(Timestamp::new(0, 0));
    ta.cmp(&tb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_second_component_is_numeric_not_decimal() {
        assert!(cmp("0.30", "0.4") > Ordering::Equal);
        assert!(cmp("0.3", "0.3") == Ordering::Equal);
        assert!(cmp("0.3", "0.4") < Ordering::Equal);
    }

    #[test]
    fn seconds_part_dominates() {
        assert!(cmp("30.0", "4.0") > Ordering::Equal);
        assert!(cmp("30.1", "4.2") > Ordering::Equal);
        assert!(cmp("30.2", "4.1") > Ordering::Equal);
        assert!(cmp("3.0", "4.0") < Ordering::Equal);
        assert!(cmp("3.1", "4.2") < Ordering::Equal);
        assert!(cmp("3.2", "4.1") < Ordering::Equal);
    }

    #[test]
    fn parses_roundtrip() {
        let t = Timestamp::parse("123.456").unwrap();
        assert_eq!(t.sec, 123);
        assert_eq!(t.usec, 456);
        assert_eq!(t.to_string(), "123.456");
    }

    #[test]
    fn malformed_input_does_not_panic() {
        assert!(Timestamp::parse("not-a-time").is_none());
        assert_eq!(cmp("not-a-time", "0.1"), Ordering::Less);
    }
}
