//! Period type and time index definitions.
//!
//! This module defines [`PeriodType`], which selects the quarterly or annual branch
//! of the pipeline, and the [`TimeIndex`] ordinal used as the panel's time axis.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Integer ordinal time axis of the panel.
///
/// Quarterly: `year * 4 + quarter`. Annual: `year`.
pub type TimeIndex = i64;

/// Fiscal-period markers that identify an annual observation.
pub const ANNUAL_MARKERS: [&str; 5] = ["FY", "Y", "CY", "ANN", "ANNUAL"];

/// Period type for fundamental financial data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// Annual reporting period.
    Annual,
    /// Quarterly reporting period.
    #[default]
    Quarterly,
}

impl PeriodType {
    /// The filing form that is canonical for this branch.
    #[must_use]
    pub const fn canonical_form(&self) -> &'static str {
        match self {
            Self::Annual => "10-K",
            Self::Quarterly => "10-Q",
        }
    }

    /// Time index of the period that ends on `end`.
    #[must_use]
    pub fn time_index(&self, end: NaiveDate) -> TimeIndex {
        let year = i64::from(end.year());
        match self {
            Self::Annual => year,
            Self::Quarterly => year * 4 + i64::from(calendar_quarter(end)),
        }
    }

    /// Human-readable label for a time index (`2023Q4`, or `2023` for annual).
    #[must_use]
    pub fn time_label(&self, time: TimeIndex) -> String {
        match self {
            Self::Annual => time.to_string(),
            Self::Quarterly => {
                let year = (time - 1).div_euclid(4);
                let quarter = (time - 1).rem_euclid(4) + 1;
                format!("{year}Q{quarter}")
            }
        }
    }
}

/// Calendar quarter (1-4) of a date.
#[must_use]
pub fn calendar_quarter(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

/// Returns true if a fiscal-period marker denotes an annual observation.
#[must_use]
pub fn is_annual_marker(fp: &str) -> bool {
    let upper = fp.trim().to_uppercase();
    ANNUAL_MARKERS.contains(&upper.as_str())
}
