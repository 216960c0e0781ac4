//! Value objects: equality by value, not identity.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// construct a new one. `GstRate`, `Month`, `StateCode` and `Gstin` are value
/// objects; exceptions and approval requests are entities.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// A GST rate from the closed set {0%, 5%, 12%, 18%, 28%}.
///
/// Construction never coerces: any other rate is rejected so that callers can
/// raise a rate exception instead of silently taxing at a neighbouring slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct GstRate(Decimal);

impl GstRate {
    /// Allowed slabs in hundredths (percent).
    const SLABS: [i64; 5] = [0, 5, 12, 18, 28];

    /// Every allowed rate, ascending.
    pub fn all() -> [GstRate; 5] {
        Self::SLABS.map(|pct| GstRate(Decimal::new(pct, 2)))
    }

    /// Validate a raw fractional rate (e.g. `0.18`).
    pub fn try_new(raw: Decimal) -> DomainResult<Self> {
        Self::all()
            .into_iter()
            .find(|rate| rate.0 == raw)
            .ok_or_else(|| DomainError::validation(format!("gst rate {raw} is not an allowed slab")))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Whole-percent label used in batch names (`"18"`, `"0"`).
    pub fn percent_label(&self) -> String {
        (self.0 * Decimal::ONE_HUNDRED).normalize().to_string()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl ValueObject for GstRate {}

impl TryFrom<Decimal> for GstRate {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<GstRate> for Decimal {
    fn from(value: GstRate) -> Self {
        value.0
    }
}

impl core::fmt::Display for GstRate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.percent_label())
    }
}

/// A filing month, `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> DomainResult<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|_| Self { year, month })
            .ok_or_else(|| DomainError::validation(format!("invalid month {year}-{month:02}")))
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        let date = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
            .map_err(|e| DomainError::validation(format!("month '{raw}' is not YYYY-MM: {e}")))?;
        Ok(Self {
            year: date.year(),
            month: date.month(),
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// `YYYYMM`, as embedded in invoice numbers.
    pub fn compact(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl ValueObject for Month {}

impl core::fmt::Display for Month {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl core::str::FromStr for Month {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Month {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Month> for String {
    fn from(value: Month) -> Self {
        value.to_string()
    }
}
