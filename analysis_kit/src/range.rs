//! Time range resolution
//!
//! Turns a named or custom range into a concrete, inclusive pair of
//! timestamps. Named ranges count a fixed number of days back from "now";
//! custom ranges count back from their `to` date. The first covered day
//! starts at 00:00:00 and the last one ends at 23:59:59.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Format accepted for custom `from`/`to` bounds, e.g. `2023-06-01-0-0-0`
pub const CUSTOM_DATE_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Offset of 23:59:59 from midnight
const LAST_SECOND_OF_DAY: i64 = 86_399;

/// Kind of range requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    All,
    PastDay,
    PastWeek,
    PastMonth,
    Past3Month,
    PastYear,
    Custom,
}

impl RangeKind {
    /// Number of days covered by a named range, `None` for `Custom`
    pub fn day_count(&self) -> Option<i64> {
        match self {
            RangeKind::All => Some(366),
            RangeKind::PastDay => Some(2),
            RangeKind::PastWeek => Some(8),
            RangeKind::PastMonth => Some(31),
            RangeKind::Past3Month => Some(91),
            RangeKind::PastYear => Some(366),
            RangeKind::Custom => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RangeKind::All => "ALL",
            RangeKind::PastDay => "PAST_DAY",
            RangeKind::PastWeek => "PAST_WEEK",
            RangeKind::PastMonth => "PAST_MONTH",
            RangeKind::Past3Month => "PAST_3_MONTH",
            RangeKind::PastYear => "PAST_YEAR",
            RangeKind::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeKind {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ALL" => Ok(RangeKind::All),
            "PAST_DAY" => Ok(RangeKind::PastDay),
            "PAST_WEEK" => Ok(RangeKind::PastWeek),
            "PAST_MONTH" => Ok(RangeKind::PastMonth),
            "PAST_3_MONTH" => Ok(RangeKind::Past3Month),
            "PAST_YEAR" => Ok(RangeKind::PastYear),
            "CUSTOM" => Ok(RangeKind::Custom),
            other => Err(RangeError::InvalidRange(format!(
                "range type '{}' should be one of: ALL, PAST_DAY, PAST_WEEK, PAST_MONTH, \
                 PAST_3_MONTH, PAST_YEAR, CUSTOM",
                other
            ))),
        }
    }
}

/// Unresolved range as given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpec {
    pub kind: RangeKind,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl RangeSpec {
    pub fn named(kind: RangeKind) -> Self {
        Self {
            kind,
            date_from: None,
            date_to: None,
        }
    }

    pub fn custom(date_from: impl Into<String>, date_to: impl Into<String>) -> Self {
        Self {
            kind: RangeKind::Custom,
            date_from: Some(date_from.into()),
            date_to: Some(date_to.into()),
        }
    }

    /// Resolve against the given "now"
    pub fn resolve(&self, now: NaiveDateTime) -> Result<TimeRange, RangeError> {
        let (day_count, base) = match self.kind.day_count() {
            Some(days) => (days, now.date()),
            None => {
                let from = parse_custom_bound("date_from", self.date_from.as_deref())?;
                let to = parse_custom_bound("date_to", self.date_to.as_deref())?;
                if to < from {
                    return Err(RangeError::InvalidRange(format!(
                        "date_to ({}) precedes date_from ({})",
                        to, from
                    )));
                }
                // Same-day custom ranges still cover the `to` day
                ((to - from).num_days().max(1), to.date())
            }
        };

        let first_day = base - Duration::days(day_count - 1);
        let start = first_day.and_time(NaiveTime::MIN);
        let end = base.and_time(NaiveTime::MIN) + Duration::seconds(LAST_SECOND_OF_DAY);

        log::debug!(
            "Resolved {} range over {} day(s): {} .. {}",
            self.kind,
            day_count,
            start,
            end
        );
        Ok(TimeRange { start, end })
    }
}

/// Inclusive time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start, self.end)
    }
}

fn parse_custom_bound(name: &str, value: Option<&str>) -> Result<NaiveDateTime, RangeError> {
    let value = value.ok_or_else(|| {
        RangeError::InvalidRange(format!("CUSTOM range requires {}", name))
    })?;
    NaiveDateTime::parse_from_str(value.trim(), CUSTOM_DATE_FORMAT).map_err(|source| {
        RangeError::InvalidDateFormat {
            value: value.to_string(),
            source,
        }
    })
}

/// Errors raised while resolving a range; both are fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum RangeError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid date '{value}', expected YYYY-MM-DD-HH-MM-SS: {source}")]
    InvalidDateFormat {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}
