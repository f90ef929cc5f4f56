//! Splitting of MARS `date` ranges into year-sized pieces.
//!
//! The public ECMWF datasets cap the volume of a single request, so a long
//! time series is fetched one calendar year at a time. A `date` keyword is
//! either a single ISO date (`1999-01-01`) or a range
//! (`1999-01-01/to/2003-06-30`).

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde_json::Value;

use crate::error::RetrieveError;

pub const MIN_YEAR: i32 = 1890;
pub const MAX_YEAR: i32 = 2100;
pub const RANGE_SEPARATOR: &str = "/to/";

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RetrieveError> {
        let range = Self { start, end };
        if end.year() < start.year() {
            return Err(RetrieveError::Range(format!(
                "{range}: starting point dates after the end point"
            )));
        }
        if start.year() < MIN_YEAR {
            return Err(RetrieveError::Range(format!(
                "{range}: no records before {MIN_YEAR}"
            )));
        }
        if end.year() > MAX_YEAR {
            return Err(RetrieveError::Range(format!(
                "{range}: no records after {MAX_YEAR}"
            )));
        }
        if end < start {
            return Err(RetrieveError::Range(format!(
                "{range}: starting point dates after the end point"
            )));
        }
        Ok(range)
    }

    pub fn is_single_year(&self) -> bool {
        self.start.year() == self.end.year()
    }

    /// One range per calendar year. Only the first and the last slice may
    /// cover a partial year.
    pub fn year_slices(&self) -> Vec<DateRange> {
        let (first, last) = (self.start.year(), self.end.year());
        (first..=last)
            .filter_map(|year| {
                let start = if year == first {
                    self.start
                } else {
                    NaiveDate::from_ymd_opt(year, 1, 1)?
                };
                let end = if year == last {
                    self.end
                } else {
                    NaiveDate::from_ymd_opt(year, 12, 31)?
                };
                Some(DateRange { start, end })
            })
            .collect()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{RANGE_SEPARATOR}{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

impl FromStr for DateRange {
    type Err = RetrieveError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value.split('/').collect::<Vec<_>>();
        let [start, "to", end] = parts.as_slice() else {
            return Err(RetrieveError::Format(value.to_string()));
        };
        let start = parse_iso_date(start).ok_or_else(|| RetrieveError::Format(value.to_string()))?;
        let end = parse_iso_date(end).ok_or_else(|| RetrieveError::Format(value.to_string()))?;
        DateRange::new(start, end)
    }
}

/// Outcome of [`partition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatePartition {
    /// A lone date, passed through verbatim.
    Single(String),
    /// A range inside one calendar year; it is requested as a whole.
    SingleYear { start: String, end: String },
    /// One `A/to/B` range per year, in chronological order.
    Years(Vec<String>),
}

impl DatePartition {
    /// Values to put into the `date` keyword of the sub-requests.
    pub fn request_dates(&self) -> Vec<String> {
        match self {
            DatePartition::Single(date) => vec![date.clone()],
            DatePartition::SingleYear { start, end } => {
                vec![format!("{start}{RANGE_SEPARATOR}{end}")]
            }
            DatePartition::Years(slices) => slices.clone(),
        }
    }

    /// Flat listing: the date, the two bounds, or the year slices.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            DatePartition::Single(date) => vec![date],
            DatePartition::SingleYear { start, end } => vec![start, end],
            DatePartition::Years(slices) => slices,
        }
    }
}

pub fn partition(date_field: &str) -> Result<DatePartition, RetrieveError> {
    if !date_field.contains('/') {
        parse_iso_date(date_field).ok_or_else(|| RetrieveError::Format(date_field.to_string()))?;
        return Ok(DatePartition::Single(date_field.to_string()));
    }

    let range: DateRange = date_field.parse()?;
    if range.is_single_year() {
        let (start, end) = date_field
            .split_once(RANGE_SEPARATOR)
            .ok_or_else(|| RetrieveError::Format(date_field.to_string()))?;
        return Ok(DatePartition::SingleYear {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    Ok(DatePartition::Years(
        range
            .year_slices()
            .iter()
            .map(ToString::to_string)
            .collect(),
    ))
}

/// [`partition`] for a `date` value that has not been type-checked yet.
pub fn partition_value(value: &Value) -> Result<DatePartition, RetrieveError> {
    let text = value.as_str().ok_or_else(|| {
        RetrieveError::Type(format!("the date field must be a string, got {value}"))
    })?;
    partition(text)
}

fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    if !ISO_DATE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn single_date_is_returned_as_is() {
        let result = partition("1999-03-01").unwrap();
        assert_eq!(result, DatePartition::Single("1999-03-01".to_string()));
        assert_eq!(result.into_vec(), ["1999-03-01"]);
    }

    #[test]
    fn single_year_range_is_not_split() {
        let result = partition("1999-03-01/to/1999-11-30").unwrap();
        assert_eq!(result.request_dates(), ["1999-03-01/to/1999-11-30"]);
        assert_eq!(result.into_vec(), ["1999-03-01", "1999-11-30"]);
    }

    #[test]
    fn year_slices_cover_two_years() {
        let range: DateRange = "2000-06-15/to/2001-01-31".parse().unwrap();
        let slices = range.year_slices();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].to_string(), "2000-06-15/to/2000-12-31");
        assert_eq!(slices[1].to_string(), "2001-01-01/to/2001-01-31");
    }

    #[test]
    fn invalid_calendar_date_is_a_format_error() {
        let err = partition("1979-01-01/to/1989-02-31").unwrap_err();
        assert_matches!(err, RetrieveError::Format(_));
    }

    #[test]
    fn reversed_dates_within_a_year() {
        let err = partition("1990-05-01/to/1990-01-01").unwrap_err();
        assert_matches!(err, RetrieveError::Range(_));
    }
}
