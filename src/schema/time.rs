//! Time quantums and time-bucketed view names
//!
//! A quantum is an ordered subset of `Y`, `M`, `D`, `H`. A timestamped bit
//! lands in one view per unit, e.g. quantum `YMDH` at 2017-03-02T04:00Z:
//!
//! ```text
//! standard_2017, standard_201703, standard_20170302, standard_2017030204
//! ```

use crate::index::error::{IndexError, IndexResult};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const VALID_QUANTUMS: [&str; 11] = ["", "Y", "YM", "YMD", "YMDH", "M", "MD", "MDH", "D", "DH", "H"];

/// Time granularity of a frame's time views
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeQuantum(String);

impl TimeQuantum {
    pub fn new(quantum: &str) -> IndexResult<Self> {
        let upper = quantum.to_ascii_uppercase();
        if !VALID_QUANTUMS.contains(&upper.as_str()) {
            return Err(IndexError::InvalidTimeQuantum(quantum.to_string()));
        }
        Ok(Self(upper))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_year(&self) -> bool {
        self.0.contains('Y')
    }

    pub fn has_month(&self) -> bool {
        self.0.contains('M')
    }

    pub fn has_day(&self) -> bool {
        self.0.contains('D')
    }

    pub fn has_hour(&self) -> bool {
        self.0.contains('H')
    }

    /// Units in coarse-to-fine order
    pub fn units(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars()
    }
}

impl fmt::Display for TimeQuantum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TimeQuantum {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TimeQuantum {
    type Error = IndexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<TimeQuantum> for String {
    fn from(q: TimeQuantum) -> Self {
        q.0
    }
}

/// Convert a bit timestamp (nanoseconds since the epoch) to UTC
pub fn timestamp_to_datetime(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// Nanoseconds since the epoch, saturating outside the representable range
pub fn datetime_to_timestamp(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or(if t.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

/// Layout accepted for timestamps in imported records
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Parse an RFC 3339 or `TIMESTAMP_FORMAT` timestamp as UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

/// View name for one time unit
pub fn view_by_time_unit(base: &str, t: DateTime<Utc>, unit: char) -> Option<String> {
    if !matches!(unit, 'Y' | 'M' | 'D' | 'H') {
        return None;
    }
    Some(format!("{}_{}", base, unit_suffix(t, unit)))
}

/// Every view a bit at `t` lands in for the quantum
pub fn views_by_time(base: &str, t: DateTime<Utc>, quantum: &TimeQuantum) -> Vec<String> {
    quantum
        .units()
        .filter_map(|unit| view_by_time_unit(base, t, unit))
        .collect()
}

fn add_months(t: DateTime<Utc>, n: u32) -> DateTime<Utc> {
    t.checked_add_months(Months::new(n)).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn next_year_gte(t: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    let next = add_months(t, 12);
    next.year() == end.year() || end > next
}

fn next_month_gte(t: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    let next = add_months(t, 1);
    (next.year() == end.year() && next.month() == end.month()) || end > next
}

fn next_day_gte(t: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    let next = t + Duration::days(1);
    next.date_naive() == end.date_naive() || end > next
}

/// Minimal set of views covering `[start, end)`
///
/// Walks up from the finest unit until `t` is aligned to a larger bucket,
/// then back down taking the largest bucket that still fits. Partial buckets
/// at the edges are only covered when the quantum has a unit fine enough.
pub fn views_by_time_range(
    base: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    quantum: &TimeQuantum,
) -> Vec<String> {
    let (has_year, has_month, has_day, has_hour) = (
        quantum.has_year(),
        quantum.has_month(),
        quantum.has_day(),
        quantum.has_hour(),
    );
    let mut results = Vec::new();
    let mut t = start;

    let name = |t: DateTime<Utc>, unit: char| format!("{}_{}", base, unit_suffix(t, unit));

    if has_hour || has_day || has_month {
        while t < end {
            if has_hour {
                if !next_day_gte(t, end) {
                    break;
                } else if t.hour() != 0 {
                    results.push(name(t, 'H'));
                    t += Duration::hours(1);
                    continue;
                }
            }
            if has_day {
                if !next_month_gte(t, end) {
                    break;
                } else if t.day() != 1 {
                    results.push(name(t, 'D'));
                    t += Duration::days(1);
                    continue;
                }
            }
            if has_month {
                if !next_year_gte(t, end) {
                    break;
                } else if t.month() != 1 {
                    results.push(name(t, 'M'));
                    t = add_months(t, 1);
                    continue;
                }
            }
            break;
        }
    }

    while t < end {
        if has_year && next_year_gte(t, end) {
            results.push(name(t, 'Y'));
            t = add_months(t, 12);
        } else if has_month && next_month_gte(t, end) {
            results.push(name(t, 'M'));
            t = add_months(t, 1);
        } else if has_day && next_day_gte(t, end) {
            results.push(name(t, 'D'));
            t += Duration::days(1);
        } else if has_hour {
            results.push(name(t, 'H'));
            t += Duration::hours(1);
        } else {
            break;
        }
    }

    results
}

fn unit_suffix(t: DateTime<Utc>, unit: char) -> String {
    match unit {
        'Y' => t.format("%Y").to_string(),
        'M' => t.format("%Y%m").to_string(),
        'D' => t.format("%Y%m%d").to_string(),
        _ => t.format("%Y%m%d%H").to_string(),
    }
}
