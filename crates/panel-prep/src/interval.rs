//! Interval classification.
//!
//! Quarterly observations are those whose period spans strictly inside a
//! [`QuarterlyWindow`]; annual observations carry an annual fiscal-period marker.

use panel_core::frequency::is_annual_marker;
use panel_core::{Observation, PeriodType, QuarterlyWindow, Result};
use polars::prelude::*;
use tracing::debug;

/// Classification of one observation's period span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalClass {
    /// Span strictly inside the quarterly window.
    Quarterly,
    /// Any other span, or an unknown span.
    Other,
}

/// Classifies an observation by its period length.
#[must_use]
pub fn classify_interval(observation: &Observation, window: QuarterlyWindow) -> IntervalClass {
    match observation.interval_days() {
        Some(days) if window.contains(days) => IntervalClass::Quarterly,
        _ => IntervalClass::Other,
    }
}

/// Returns true if the observation's fiscal-period marker is annual.
#[must_use]
pub fn is_annual(observation: &Observation) -> bool {
    observation
        .fiscal_period
        .as_deref()
        .is_some_and(is_annual_marker)
}

/// Keeps quarterly-length observations.
#[must_use]
pub fn filter_quarterly(observations: Vec<Observation>, window: QuarterlyWindow) -> Vec<Observation> {
    let before = observations.len();
    let kept: Vec<Observation> = observations
        .into_iter()
        .filter(|obs| classify_interval(obs, window) == IntervalClass::Quarterly)
        .collect();
    debug!(
        kept = kept.len(),
        dropped = before - kept.len(),
        lower = window.lower,
        upper = window.upper,
        "Filtered quarterly intervals"
    );
    kept
}

/// Keeps observations flagged as annual.
#[must_use]
pub fn filter_annual(observations: Vec<Observation>) -> Vec<Observation> {
    let before = observations.len();
    let kept: Vec<Observation> = observations.into_iter().filter(is_annual).collect();
    debug!(kept = kept.len(), dropped = before - kept.len(), "Filtered annual observations");
    kept
}

/// Applies the filter of the given pipeline branch.
#[must_use]
pub fn filter_period(
    observations: Vec<Observation>,
    period_type: PeriodType,
    window: QuarterlyWindow,
) -> Vec<Observation> {
    match period_type {
        PeriodType::Quarterly => filter_quarterly(observations, window),
        PeriodType::Annual => filter_annual(observations),
    }
}

/// Time index of each row's period end, as a column expression.
#[must_use]
pub fn time_index_expr(period_type: PeriodType) -> Expr {
    let year = col("end").dt().year().cast(DataType::Int64);
    match period_type {
        PeriodType::Annual => year,
        PeriodType::Quarterly => year * lit(4i64) + col("end").dt().quarter().cast(DataType::Int64),
    }
}

/// Sets each row's `time` column from its period end.
///
/// Rows without a period end cannot be placed on the time axis and are dropped.
pub fn assign_time_index(observations: &DataFrame, period_type: PeriodType) -> Result<DataFrame> {
    let placed = observations
        .clone()
        .lazy()
        .filter(col("end").is_not_null())
        .with_column(time_index_expr(period_type).alias("time"))
        .collect()?;
    let dropped = observations.height() - placed.height();
    if dropped > 0 {
        debug!(dropped, "Dropped observations without a period end");
    }
    Ok(placed)
}
