//! Time periods, bucket granularity, and bucket-date parsing.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Dashboard time-period presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimePeriod {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "yesterday")]
    Yesterday,
    #[default]
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
    #[serde(rename = "month")]
    ThisMonth,
}

impl TimePeriod {
    pub const ALL: [Self; 6] = [
        Self::Today,
        Self::Yesterday,
        Self::Last7Days,
        Self::Last30Days,
        Self::Last90Days,
        Self::ThisMonth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
            Self::Last90Days => "90d",
            Self::ThisMonth => "month",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Yesterday => "Yesterday",
            Self::Last7Days => "Last 7 days",
            Self::Last30Days => "Last 30 days",
            Self::Last90Days => "Last 90 days",
            Self::ThisMonth => "This month",
        }
    }

    /// First and last local calendar day covered by this period.
    pub fn local_days(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Self::Today => (today, today),
            Self::Yesterday => {
                let y = today - Duration::days(1);
                (y, y)
            }
            Self::Last7Days => (today - Duration::days(6), today),
            Self::Last30Days => (today - Duration::days(29), today),
            Self::Last90Days => (today - Duration::days(89), today),
            Self::ThisMonth => (today.with_day(1).unwrap_or(today), today),
        }
    }

    /// Inclusive range for this period as seen from `now`'s local offset:
    /// first day at 00:00:00 through last day at 23:59:59.
    pub fn date_range(&self, now: DateTime<FixedOffset>) -> DateRange {
        let (first, last) = self.local_days(now.date_naive());
        DateRange::from_local_days(first, last, *now.offset())
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown time period: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    #[default]
    Day,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    /// Buckets off midnight are hourly. Bare dates and midnight timestamps
    /// (`2024-03-01T00:00:00Z`) are daily.
    pub fn infer(date: &str) -> Self {
        match parse_bucket_instant(date) {
            Some(t) if t.time() != NaiveTime::MIN => Self::Hour,
            _ => Self::Day,
        }
    }

    /// One granularity for a whole series, so the midnight bucket of an
    /// hourly series still renders its `00:00`.
    pub fn infer_series<'a>(dates: impl IntoIterator<Item = &'a str>) -> Self {
        if dates.into_iter().any(|d| Self::infer(d) == Self::Hour) {
            Self::Hour
        } else {
            Self::Day
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hourly" => Ok(Self::Hour),
            "day" | "daily" => Ok(Self::Day),
            other => Err(format!("unknown granularity: {other}")),
        }
    }
}

/// Inclusive UTC range sent to the stats backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn from_local_days(first: NaiveDate, last: NaiveDate, offset: FixedOffset) -> Self {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        let start = first.and_time(NaiveTime::MIN) - offset;
        let end = last.and_time(end_of_day) - offset;
        Self {
            start: start.and_utc(),
            end: end.and_utc(),
        }
    }

    pub fn start_iso(&self) -> String {
        to_iso(self.start)
    }

    pub fn end_iso(&self) -> String {
        to_iso(self.end)
    }
}

/// `2024-03-01T05:00:00.000Z`, the form the backends expect.
pub fn to_iso(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse a bucket date: `YYYY-MM-DD`, a naive `YYYY-MM-DD[T ]HH:MM:SS[.f]`
/// (read as UTC), or RFC 3339.
pub fn parse_bucket_instant(date: &str) -> Option<NaiveDateTime> {
    let date = date.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(date) {
        return Some(t.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(date, fmt) {
            return Some(t);
        }
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Parse any timestamp the backends emit into a UTC instant.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    parse_bucket_instant(ts).map(|t| t.and_utc())
}

/// Chronological sort key for bucket dates. Unparseable dates order before
/// parseable ones and among themselves by their text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub instant: Option<NaiveDateTime>,
    pub text: String,
}

impl BucketKey {
    pub fn new(date: &str) -> Self {
        Self {
            instant: parse_bucket_instant(date),
            text: date.to_string(),
        }
    }
}

/// Axis label for a bucket: `Mar 1` for daily buckets, `Mar 1 14:00` for hourly.
pub fn display_bucket_date(date: &str, granularity: Granularity) -> String {
    let Some(t) = parse_bucket_instant(date) else {
        return date.to_string();
    };
    match granularity {
        Granularity::Day => t.format("%b %-d").to_string(),
        Granularity::Hour => t.format("%b %-d %H:00").to_string(),
    }
}
