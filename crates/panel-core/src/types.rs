//! Core data types for reported financial facts.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Ticker`] - Reporting entity identifier
//! - [`Observation`] - A single reported value for one entity, metric and period
//! - [`ObservationIdentity`] - The key that defines "the same underlying fact"

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::frequency::{TimeIndex, calendar_quarter};

/// A reporting entity's ticker.
///
/// Tickers are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    /// Creates a new ticker from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the ticker as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ticker {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A single reported value for one entity, one metric, one reporting period.
///
/// Every field other than the entity and source tag may be absent: the
/// regulator's records are self-reported and frequently incomplete.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Reporting entity.
    pub ticker: Ticker,
    /// Canonical metric name (e.g. "revenue"); `None` until labeled.
    pub label: Option<String>,
    /// Taxonomy element the value was reported under.
    pub source_tag: String,
    /// Unit of measure of the value.
    pub unit: Option<String>,
    /// First day of the reporting period (absent for instant facts).
    pub period_start: Option<NaiveDate>,
    /// Last day of the reporting period.
    pub period_end: Option<NaiveDate>,
    /// Date the filing was submitted.
    pub filed: Option<NaiveDate>,
    /// Filing category (e.g. "10-Q", "10-K").
    pub form: Option<String>,
    /// Reported value.
    pub value: Option<f64>,
    /// Accession number of the filing.
    pub accn: Option<String>,
    /// Fiscal year of the filing.
    pub fiscal_year: Option<i32>,
    /// Fiscal period marker of the filing (Q1..Q4, FY, ...).
    pub fiscal_period: Option<String>,
    /// Auxiliary calendar frame assigned by the regulator (e.g. "CY2021Q1").
    pub frame: Option<String>,
    /// Panel time index, assigned once the period type is known.
    pub time_index: Option<TimeIndex>,
}

/// Key that defines "the same underlying fact".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservationIdentity {
    /// Reporting entity.
    pub ticker: Ticker,
    /// Metric label.
    pub label: Option<String>,
    /// Source tag.
    pub source_tag: String,
    /// Period start.
    pub period_start: Option<NaiveDate>,
    /// Period end.
    pub period_end: Option<NaiveDate>,
}

impl Observation {
    /// Creates a new observation with required fields.
    #[must_use]
    pub fn new(ticker: Ticker, label: impl Into<String>, source_tag: impl Into<String>) -> Self {
        Self {
            ticker,
            label: Some(label.into()),
            source_tag: source_tag.into(),
            ..Default::default()
        }
    }

    /// Sets the reporting period.
    #[must_use]
    pub fn with_period(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.period_start = Some(start);
        self.period_end = Some(end);
        self
    }

    /// Sets the reported value.
    #[must_use]
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Sets the filing date.
    #[must_use]
    pub fn with_filed(mut self, filed: NaiveDate) -> Self {
        self.filed = Some(filed);
        self
    }

    /// Sets the filing form.
    #[must_use]
    pub fn with_form(mut self, form: impl Into<String>) -> Self {
        self.form = Some(form.into());
        self
    }

    /// Sets the regulator's calendar frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = Some(frame.into());
        self
    }

    /// Sets the fiscal year and fiscal period marker.
    #[must_use]
    pub fn with_fiscal(mut self, fiscal_year: i32, fiscal_period: impl Into<String>) -> Self {
        self.fiscal_year = Some(fiscal_year);
        self.fiscal_period = Some(fiscal_period.into());
        self
    }

    /// Sets the accession number.
    #[must_use]
    pub fn with_accn(mut self, accn: impl Into<String>) -> Self {
        self.accn = Some(accn.into());
        self
    }

    /// Returns the economic identity of this observation.
    #[must_use]
    pub fn identity(&self) -> ObservationIdentity {
        ObservationIdentity {
            ticker: self.ticker.clone(),
            label: self.label.clone(),
            source_tag: self.source_tag.clone(),
            period_start: self.period_start,
            period_end: self.period_end,
        }
    }

    /// Whole days between period start and period end.
    #[must_use]
    pub fn interval_days(&self) -> Option<i64> {
        match (self.period_start, self.period_end) {
            (Some(start), Some(end)) => Some(end.signed_duration_since(start).num_days()),
            _ => None,
        }
    }

    /// Calendar year of the period end.
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        self.period_end.map(|end| end.year())
    }

    /// Calendar quarter (1-4) of the period end.
    #[must_use]
    pub fn quarter(&self) -> Option<u32> {
        self.period_end.map(calendar_quarter)
    }

    /// Returns true if the period dates are ordered (or not both known).
    #[must_use]
    pub fn has_ordered_period(&self) -> bool {
        match (self.period_start, self.period_end) {
            (Some(start), Some(end)) => end >= start,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_ticker_creation() {
        let ticker = Ticker::new("mcd");
        assert_eq!(ticker.as_str(), "MCD");
        assert_eq!(Ticker::from(" wen "), Ticker::new("WEN"));
    }

    #[test]
    fn test_interval_and_calendar() {
        let obs = Observation::new(Ticker::new("MCD"), "revenue", "Revenues")
            .with_period(date(2021, 1, 1), date(2021, 3, 31));
        assert_eq!(obs.interval_days(), Some(89));
        assert_eq!(obs.year(), Some(2021));
        assert_eq!(obs.quarter(), Some(1));
        assert!(obs.has_ordered_period());
    }

    #[test]
    fn test_unordered_period_detected() {
        let obs = Observation::new(Ticker::new("MCD"), "revenue", "Revenues")
            .with_period(date(2021, 3, 31), date(2021, 1, 1));
        assert!(!obs.has_ordered_period());

        let instant = Observation {
            period_end: Some(date(2021, 3, 31)),
            ..Observation::new(Ticker::new("MCD"), "assets", "Assets")
        };
        assert!(instant.has_ordered_period());
        assert_eq!(instant.interval_days(), None);
    }

    #[test]
    fn test_identity_ignores_provenance() {
        let a = Observation::new(Ticker::new("X"), "revenue", "T")
            .with_period(date(2021, 1, 1), date(2021, 3, 31))
            .with_filed(date(2021, 4, 20));
        let b = a.clone().with_filed(date(2021, 7, 1)).with_frame("CY2021Q1");
        assert_eq!(a.identity(), b.identity());
    }
}
