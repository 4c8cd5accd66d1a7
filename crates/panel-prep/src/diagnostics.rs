//! Reporting-period overlap diagnostics.
//!
//! Fiscal quarters differ across entities. For each calendar quarter of the
//! period end, these checks measure how much of the reported spans is shared.

use chrono::{Datelike, NaiveDate};
use panel_core::frequency::calendar_quarter;
use panel_core::{Observation, Ticker};
use serde::Serialize;
use std::collections::BTreeMap;

/// Common reporting window of one calendar quarter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeriodOverlap {
    /// Calendar quarter of the period end (`2024Q1`).
    pub period: String,
    /// Latest period start across units.
    pub common_start: NaiveDate,
    /// Earliest period end across units.
    pub common_end: NaiveDate,
    /// Inclusive length of the common window, 0 when it is empty.
    pub common_overlap_days: i64,
    /// Observations in the quarter.
    pub units: usize,
}

/// Share of one unit's span inside its quarter's common window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnitOverlap {
    /// Entity.
    pub ticker: Ticker,
    /// Calendar quarter of the period end.
    pub period: String,
    /// Inclusive length of the unit's span.
    pub unit_length_days: i64,
    /// Days of the span inside the common window.
    pub overlap_days: i64,
    /// `overlap_days / unit_length_days`.
    pub overlap_ratio: f64,
}

fn inclusive_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end.signed_duration_since(start).num_days() + 1).max(0)
}

fn calendar_period(end: NaiveDate) -> String {
    format!("{}Q{}", end.year(), calendar_quarter(end))
}

/// Groups spans of `label` by calendar quarter of their end.
fn spans_by_period<'a>(
    observations: &'a [Observation],
    label: &str,
) -> BTreeMap<String, Vec<(&'a Ticker, NaiveDate, NaiveDate)>> {
    let mut groups: BTreeMap<String, Vec<_>> = BTreeMap::new();
    for obs in observations
        .iter()
        .filter(|obs| obs.label.as_deref() == Some(label))
    {
        if let (Some(start), Some(end)) = (obs.period_start, obs.period_end) {
            groups
                .entry(calendar_period(end))
                .or_default()
                .push((&obs.ticker, start, end));
        }
    }
    groups
}

fn common_window(spans: &[(&Ticker, NaiveDate, NaiveDate)]) -> Option<(NaiveDate, NaiveDate)> {
    let start = spans.iter().map(|(_, s, _)| *s).max()?;
    let end = spans.iter().map(|(_, _, e)| *e).min()?;
    Some((start, end))
}

/// Common overlap window per calendar quarter for one metric.
///
/// Observations without both period dates are ignored.
#[must_use]
pub fn period_overlap(observations: &[Observation], label: &str) -> Vec<PeriodOverlap> {
    spans_by_period(observations, label)
        .into_iter()
        .filter_map(|(period, spans)| {
            let (common_start, common_end) = common_window(&spans)?;
            Some(PeriodOverlap {
                period,
                common_start,
                common_end,
                common_overlap_days: inclusive_days(common_start, common_end),
                units: spans.len(),
            })
        })
        .collect()
}

/// Per-unit overlap with the common window of its calendar quarter.
#[must_use]
pub fn unit_overlap(observations: &[Observation], label: &str) -> Vec<UnitOverlap> {
    let mut out = Vec::new();
    for (period, spans) in spans_by_period(observations, label) {
        let Some((common_start, common_end)) = common_window(&spans) else {
            continue;
        };
        for (ticker, start, end) in spans {
            let unit_length_days = inclusive_days(start, end);
            let overlap_days = if common_start > common_end {
                0
            } else {
                inclusive_days(start.max(common_start), end.min(common_end))
            };
            #[allow(clippy::cast_precision_loss)]
            let overlap_ratio = if unit_length_days > 0 {
                overlap_days as f64 / unit_length_days as f64
            } else {
                0.0
            };
            out.push(UnitOverlap {
                ticker: ticker.clone(),
                period: period.clone(),
                unit_length_days,
                overlap_days,
                overlap_ratio,
            });
        }
    }
    out
}
