//! Calendar helpers: ordinal day counts and acquisition windows.
//!
//! Ordinals use the proleptic Gregorian day count where `0001-01-01` is day 1,
//! so segment boundaries produced by the change-detection algorithm can be
//! compared against query dates with plain integer arithmetic.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("Invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Invalid acquisition window '{value}': expected YYYY-MM-DD/YYYY-MM-DD")]
    InvalidWindow { value: String },

    #[error("Acquisition window '{value}' ends before it starts")]
    ReversedWindow { value: String },

    #[error("Ordinal {0} is outside the representable calendar")]
    OrdinalOutOfRange(i64),
}

/// Parse a `YYYY-MM-DD` string.
pub fn parse_date(value: &str) -> Result<NaiveDate, DateError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| DateError::InvalidDate {
        value: value.to_string(),
    })
}

/// Ordinal day count of a calendar date.
pub fn date_to_ordinal(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce())
}

/// Ordinal day count of a `YYYY-MM-DD` string.
pub fn to_ordinal(value: &str) -> Result<i64, DateError> {
    parse_date(value).map(date_to_ordinal)
}

/// Calendar date for an ordinal day count.
pub fn from_ordinal(ordinal: i64) -> Result<NaiveDate, DateError> {
    i32::try_from(ordinal)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or(DateError::OrdinalOutOfRange(ordinal))
}

/// Date range bounding a pixel's input time series, written `start/end`.
///
/// The original string is kept verbatim so it can be carried unchanged into
/// every downstream record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AcquisitionWindow {
    raw: String,
    start: NaiveDate,
    end: NaiveDate,
}

impl AcquisitionWindow {
    pub fn parse(value: &str) -> Result<Self, DateError> {
        let (start, end) = value.split_once('/').ok_or_else(|| DateError::InvalidWindow {
            value: value.to_string(),
        })?;
        let invalid = |_| DateError::InvalidWindow {
            value: value.to_string(),
        };
        let start = parse_date(start).map_err(invalid)?;
        let end = parse_date(end).map_err(invalid)?;
        if end < start {
            return Err(DateError::ReversedWindow {
                value: value.to_string(),
            });
        }
        Ok(Self {
            raw: value.to_string(),
            start,
            end,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn start_ordinal(&self) -> i64 {
        date_to_ordinal(self.start)
    }

    pub fn end_ordinal(&self) -> i64 {
        date_to_ordinal(self.end)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for AcquisitionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for AcquisitionWindow {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AcquisitionWindow {
    type Error = DateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AcquisitionWindow> for String {
    fn from(window: AcquisitionWindow) -> Self {
        window.raw
    }
}
