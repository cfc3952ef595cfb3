use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp of a reading. Stored as a plain UTC instant so it serializes to
/// an ISO-8601 string wherever the store state is exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DTime {
    pub datetime: DateTime<Utc>,
}

impl DTime {
    pub fn new(datetime: DateTime<Utc>) -> Self {
        Self { datetime }
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Builds a timestamp from fractional Unix seconds. Returns `None` for
    /// non-finite or out-of-range input.
    pub fn from_unix_seconds(seconds: f64) -> Option<Self> {
        if !seconds.is_finite() {
            return None;
        }
        let whole = seconds.floor();
        let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
        Self::from_seconds_nanos(whole as i64, nanos)
    }

    pub fn from_seconds_nanos(seconds: i64, nanos: u32) -> Option<Self> {
        Utc.timestamp_opt(seconds, nanos).single().map(Self::new)
    }

    /// ISO-8601 form with millisecond precision, e.g. `2017-01-01T12:00:00.000Z`.
    pub fn to_iso_string(&self) -> String {
        self.datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn converts_fractional_unix_seconds() {
        let t = DTime::from_unix_seconds(1_483_272_000.5).expect("valid timestamp");
        assert_eq!(t.datetime.year(), 2017);
        assert_eq!(t.to_iso_string(), "2017-01-01T12:00:00.500Z");
    }

    #[test]
    fn rejects_non_finite_seconds() {
        assert!(DTime::from_unix_seconds(f64::NAN).is_none());
        assert!(DTime::from_unix_seconds(f64::INFINITY).is_none());
    }
}
