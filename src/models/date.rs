// src/models/date.rs
use chrono::NaiveDate;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LinkerError, LinkerResult};

static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*([+-]?\d{1,16})(?:-(\d{1,2})(?:-(\d{1,2})(?:[T ](\d{1,2})(?::(\d{1,2})(?::(\d{1,2}))?)?)?)?)?",
    )
    .expect("date pattern compiles")
});

/// Granularity of a date, from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePrecision {
    /// Maps a Wikidata time precision code. Codes coarser than a year
    /// (decades, centuries, millennia...) collapse to `Year`.
    pub fn from_wikidata(code: i64) -> Self {
        match code {
            9 => DatePrecision::Year,
            10 => DatePrecision::Month,
            11 => DatePrecision::Day,
            12 => DatePrecision::Hour,
            13 => DatePrecision::Minute,
            14 => DatePrecision::Second,
            0..=8 => {
                debug!(
                    "Precision code {} is coarser than a year, falling back to year",
                    code
                );
                DatePrecision::Year
            }
            other => {
                warn!("Unexpected date precision code {}, falling back to year", other);
                DatePrecision::Year
            }
        }
    }

    pub fn wikidata_code(self) -> u8 {
        match self {
            DatePrecision::Year => 9,
            DatePrecision::Month => 10,
            DatePrecision::Day => 11,
            DatePrecision::Hour => 12,
            DatePrecision::Minute => 13,
            DatePrecision::Second => 14,
        }
    }

    /// Number of components a date of this precision carries (year = 1).
    pub fn depth(self) -> usize {
        self as usize + 1
    }

    fn from_depth(depth: usize) -> Self {
        match depth {
            0 | 1 => DatePrecision::Year,
            2 => DatePrecision::Month,
            3 => DatePrecision::Day,
            4 => DatePrecision::Hour,
            5 => DatePrecision::Minute,
            _ => DatePrecision::Second,
        }
    }
}

/// A date truncated to its precision. Components finer than the
/// precision are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateValue {
    year: i64,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    precision: DatePrecision,
}

impl DateValue {
    /// Parses an ISO-like date string (`+1912-06-23T00:00:00Z`, `1912-06`,
    /// `1912`) at the given precision.
    ///
    /// When the string lacks a component the precision asks for, or
    /// carries a zero month/day placeholder, the precision is lowered to
    /// the finest component actually present.
    pub fn parse(raw: &str, column: &str, precision: DatePrecision) -> LinkerResult<Self> {
        let caps = DATE_PATTERN
            .captures(raw)
            .ok_or_else(|| LinkerError::malformed(column, format!("'{}' is not a date", raw)))?;

        let year: i64 = caps[1]
            .parse()
            .map_err(|_| LinkerError::malformed(column, format!("bad year in '{}'", raw)))?;

        let mut parts = [0u8; 5];
        let mut available = 1;
        for (i, slot) in parts.iter_mut().enumerate() {
            let Some(m) = caps.get(i + 2) else { break };
            let value: u8 = m.as_str().parse().map_err(|_| {
                LinkerError::malformed(column, format!("bad component in '{}'", raw))
            })?;
            // Month and day placeholders are written as 00
            if i < 2 && value == 0 {
                break;
            }
            *slot = value;
            available += 1;
        }

        let effective = DatePrecision::from_depth(available.min(precision.depth()));
        if effective != precision {
            debug!(
                "Date '{}' in '{}' lowered from {:?} to {:?} precision",
                raw, column, precision, effective
            );
        }
        Self::from_parts(year, parts, effective, column)
    }

    /// Builds a date from its components, validating them against the calendar.
    pub fn from_parts(
        year: i64,
        parts: [u8; 5],
        precision: DatePrecision,
        column: &str,
    ) -> LinkerResult<Self> {
        let depth = precision.depth();
        let keep = |i: usize| if i + 2 <= depth { parts[i] } else { 0 };
        let date = DateValue {
            year,
            month: keep(0),
            day: keep(1),
            hour: keep(2),
            minute: keep(3),
            second: keep(4),
            precision,
        };
        date.validate(column)?;
        Ok(date)
    }

    pub fn year_only(year: i64) -> Self {
        DateValue {
            year,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            second: 0,
            precision: DatePrecision::Year,
        }
    }

    fn validate(&self, column: &str) -> LinkerResult<()> {
        if self.precision >= DatePrecision::Month && !(1..=12).contains(&self.month) {
            return Err(LinkerError::malformed(
                column,
                format!("month {} out of range", self.month),
            ));
        }
        if self.precision >= DatePrecision::Day {
            let valid = match i32::try_from(self.year) {
                Ok(y) => NaiveDate::from_ymd_opt(y, self.month as u32, self.day as u32).is_some(),
                Err(_) => (1..=31).contains(&self.day),
            };
            if !valid {
                return Err(LinkerError::malformed(
                    column,
                    format!("{}-{}-{} is not a calendar day", self.year, self.month, self.day),
                ));
            }
        }
        if self.hour > 23 || self.minute > 59 || self.second > 59 {
            return Err(LinkerError::malformed(column, "time of day out of range"));
        }
        Ok(())
    }

    pub fn precision(&self) -> DatePrecision {
        self.precision
    }

    pub fn year(&self) -> i64 {
        self.year
    }

    pub fn month(&self) -> Option<u8> {
        (self.precision >= DatePrecision::Month).then_some(self.month)
    }

    pub fn day(&self) -> Option<u8> {
        (self.precision >= DatePrecision::Day).then_some(self.day)
    }

    /// Year, month and day as comparable integers, zero beyond precision.
    pub fn calendar_components(&self) -> [i64; 3] {
        [self.year, self.month as i64, self.day as i64]
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.year < 0 {
            write!(f, "-{:04}", -self.year)?;
        } else {
            write!(f, "{:04}", self.year)?;
        }
        if self.precision >= DatePrecision::Month {
            write!(f, "-{:02}", self.month)?;
        }
        if self.precision >= DatePrecision::Day {
            write!(f, "-{:02}", self.day)?;
        }
        if self.precision >= DatePrecision::Hour {
            write!(f, "T{:02}", self.hour)?;
        }
        if self.precision >= DatePrecision::Minute {
            write!(f, ":{:02}", self.minute)?;
        }
        if self.precision >= DatePrecision::Second {
            write!(f, ":{:02}", self.second)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wikidata_precision_mapping() {
        assert_eq!(DatePrecision::from_wikidata(11), DatePrecision::Day);
        assert_eq!(DatePrecision::from_wikidata(9), DatePrecision::Year);
        assert_eq!(DatePrecision::from_wikidata(7), DatePrecision::Year);
        assert_eq!(DatePrecision::from_wikidata(42), DatePrecision::Year);
        assert_eq!(DatePrecision::Minute.wikidata_code(), 13);
    }

    #[test]
    fn test_parse_wikidata_timestamp() {
        let date = DateValue::parse("+1912-06-23T00:00:00Z", "born", DatePrecision::Day).unwrap();
        assert_eq!(date.year(), 1912);
        assert_eq!(date.month(), Some(6));
        assert_eq!(date.day(), Some(23));
        assert_eq!(date.to_string(), "1912-06-23");
    }

    #[test]
    fn test_parse_truncates_to_precision() {
        let date = DateValue::parse("1954-06-07", "died", DatePrecision::Year).unwrap();
        assert_eq!(date.precision(), DatePrecision::Year);
        assert_eq!(date.month(), None);
        assert_eq!(date.calendar_components(), [1954, 0, 0]);
    }

    #[test]
    fn test_parse_lowers_precision_on_placeholders() {
        let date = DateValue::parse("+1850-00-00T00:00:00Z", "born", DatePrecision::Day).unwrap();
        assert_eq!(date.precision(), DatePrecision::Year);

        let date = DateValue::parse("1850-04", "born", DatePrecision::Day).unwrap();
        assert_eq!(date.precision(), DatePrecision::Month);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DateValue::parse("sometime", "born", DatePrecision::Year).is_err());
        assert!(DateValue::parse("1912-13-01", "born", DatePrecision::Day).is_err());
        assert!(DateValue::parse("1913-02-30", "born", DatePrecision::Day).is_err());
    }

    #[test]
    fn test_negative_years_display() {
        let date = DateValue::parse("-0500", "born", DatePrecision::Year).unwrap();
        assert_eq!(date.to_string(), "-0500");
    }
}
