//! Calendar helpers.
//!
//! Transaction dates are parsed strictly (an impossible date is a rejected
//! row), while interactive date inputs are clamped: a day past the end of
//! its month snaps to the last valid day of that month.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Year-month period key, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn of(date: NaiveDate) -> Self {
        Period {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("Invalid period '{}'", s))?;
        let year = y.parse::<i32>().map_err(|_| format!("Invalid period year '{}'", s))?;
        let month = m.parse::<u32>().map_err(|_| format!("Invalid period month '{}'", s))?;
        if !(1..=12).contains(&month) {
            return Err(format!("Invalid period month '{}'", s));
        }
        Ok(Period { year, month })
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Number of days in `month` of `year`, or `None` for a month outside 1..=12.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .map(|d| d.day());
    // only December of the last representable year has no successor month
    Some(last.unwrap_or(31))
}

/// Parse a transaction date. Accepts `YYYY-MM-DD` (optionally followed by a
/// time part) and `DD/MM/YYYY`. Impossible dates return `None`.
pub fn parse_record_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = match s.get(..10) {
        Some(head) if s.len() > 10 && matches!(s.as_bytes()[10], b' ' | b'T') => head,
        _ => s,
    };
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%d/%m/%Y"))
        .ok()
}

/// Build a date from possibly out-of-range components, clamping the day
/// into `1..=days_in_month`. Returns `None` when the month itself is invalid
/// or the year is outside the representable range.
pub fn clamp_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
}

/// Parse an interactive `YYYY-MM-DD` input with day clamping.
///
/// `"2023-02-30"` resolves to 2023-02-28. Anything that does not split into
/// three numeric components with a valid month yields `None`.
pub fn parse_clamped_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.trim().splitn(3, '-');
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    clamp_date(year, month, day)
}
