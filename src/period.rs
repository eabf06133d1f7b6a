use crate::error::{IndirectRateError, Result};
use chrono::{Datelike, NaiveDate};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A calendar month. Every time-indexed table in the crate is keyed by `Period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(IndirectRateError::InvalidPeriod(format!(
                "{:04}-{:02}",
                year, month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Parses "YYYY-MM", "YYYY/MM" or a full "YYYY-MM-DD" date.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let normalized = trimmed.replace('/', "-");

        if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }

        let with_day = format!("{}-01", normalized);
        NaiveDate::parse_from_str(&with_day, "%Y-%m-%d")
            .map(Self::from_date)
            .map_err(|_| IndirectRateError::InvalidPeriod(trimmed.to_string()))
    }

    fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(12) as i32,
            month: ordinal.rem_euclid(12) as u32 + 1,
        }
    }

    /// Shifts the period by `months` (negative values move backwards).
    pub fn offset(&self, months: i32) -> Self {
        Self::from_ordinal(self.ordinal() + months as i64)
    }

    pub fn next(&self) -> Self {
        self.offset(1)
    }


    /// Number of months from `self` to `other` (negative if `other` is earlier).
    pub fn months_until(&self, other: Period) -> i32 {
        (other.ordinal() - self.ordinal()) as i32
    }

    /// Start of the fiscal year containing this period: the most recent period at or
    /// before `self` whose month equals `fy_start_month`.
    pub fn fiscal_year_start(&self, fy_start_month: u32) -> Self {
        if self.month >= fy_start_month {
            Self {
                year: self.year,
                month: fy_start_month,
            }
        } else {
            Self {
                year: self.year - 1,
                month: fy_start_month,
            }
        }
    }
}

/// Contiguous ascending months from `start` through `end` inclusive; empty if `end < start`.
pub fn period_range(start: Period, end: Period) -> Vec<Period> {
    let len = start.months_until(end);
    if len < 0 {
        return Vec::new();
    }
    (0..=len).map(|i| start.offset(i)).collect()
}

pub fn validate_fiscal_year_start_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(IndirectRateError::InvalidFiscalYearStartMonth(month));
    }
    Ok(())
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = IndirectRateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Period::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for Period {
    fn schema_name() -> String {
        "Period".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        let mut schema = String::json_schema(gen).into_object();
        schema.string().pattern = Some(r"^\d{4}-\d{2}$".to_string());
        schema.metadata().description =
            Some("Calendar month in YYYY-MM format (e.g. 2025-01)".to_string());
        schema.into()
    }
}
