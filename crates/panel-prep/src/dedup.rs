//! Duplicate and conflict resolution.
//!
//! Four passes over the long observation table, each a pure function of its
//! input that returns rows in a canonical order, so the outcome never depends
//! on the input row order:
//!
//! 1. [`collapse_frames`]: rows that differ only by frame keep the smallest frame.
//! 2. [`keep_latest_filing`]: per economic identity, the most recent filing wins.
//! 3. [`keep_max_interval`]: per (entity, metric, tag, period end), the longest span wins.
//! 4. [`resolve_form_collisions`]: per (entity, metric, time index), the canonical
//!    form wins, then the latest period end.
//!
//! Each pass sorts by its group, then its preference, then the canonical order,
//! and keeps the first row of every group.

use panel_core::{PeriodType, Result};
use polars::prelude::*;
use tracing::debug;

/// Total order over observation rows, every key ascending with nulls last.
pub(crate) const CANONICAL_ORDER: [&str; 14] = [
    "ticker",
    "label",
    "source_tag",
    "start",
    "end",
    "filed",
    "accn",
    "form",
    "fy",
    "fp",
    "unit",
    "val",
    "frame",
    "time",
];

const IDENTITY: [&str; 5] = ["ticker", "label", "source_tag", "start", "end"];

/// Sorts a long observation table into canonical order.
pub(crate) fn sort_canonical(lf: LazyFrame) -> LazyFrame {
    lf.sort(
        CANONICAL_ORDER,
        SortMultipleOptions::new()
            .with_nulls_last_multi([true; CANONICAL_ORDER.len()])
            .with_maintain_order(true),
    )
}

/// Sorts by `group`, then `prefer` (expression, descending), then the canonical
/// order, keeps the first row of each group, and returns the survivors in
/// canonical order.
fn keep_first(
    observations: &DataFrame,
    group: &[&str],
    prefer: Vec<(Expr, bool)>,
    pass: &'static str,
) -> Result<DataFrame> {
    let mut by: Vec<Expr> = group.iter().map(|name| col(*name)).collect();
    let mut descending = vec![false; group.len()];
    for (expr, desc) in prefer {
        by.push(expr);
        descending.push(desc);
    }
    by.extend(CANONICAL_ORDER.iter().map(|name| col(*name)));
    descending.extend([false; CANONICAL_ORDER.len()]);
    let nulls_last = vec![true; by.len()];

    let subset: Vec<PlSmallStr> = group.iter().map(|name| (*name).into()).collect();
    let kept = sort_canonical(
        observations
            .clone()
            .lazy()
            .sort_by_exprs(
                by,
                SortMultipleOptions::new()
                    .with_order_descending_multi(descending)
                    .with_nulls_last_multi(nulls_last)
                    .with_maintain_order(true),
            )
            .unique_stable(Some(subset), UniqueKeepStrategy::First),
    )
    .collect()?;

    debug!(
        pass,
        kept = kept.height(),
        removed = observations.height() - kept.height(),
        "Resolved duplicates"
    );
    Ok(kept)
}

/// Collapses rows that differ only by their frame, keeping the smallest frame
/// (missing frames last).
pub fn collapse_frames(observations: &DataFrame) -> Result<DataFrame> {
    let group: Vec<&str> = CANONICAL_ORDER
        .iter()
        .copied()
        .filter(|name| !matches!(*name, "frame" | "time"))
        .collect();
    keep_first(observations, &group, vec![(col("frame"), false)], "frame")
}

/// Keeps, per economic identity, the row with the most recent filing date.
pub fn keep_latest_filing(observations: &DataFrame) -> Result<DataFrame> {
    keep_first(
        observations,
        &IDENTITY,
        vec![(col("filed"), true)],
        "latest_filing",
    )
}

/// Period length in days.
fn interval_days() -> Expr {
    col("end").cast(DataType::Int32) - col("start").cast(DataType::Int32)
}

/// Keeps, per (entity, metric, tag, period end), the row with the longest span.
pub fn keep_max_interval(observations: &DataFrame) -> Result<DataFrame> {
    keep_first(
        observations,
        &["ticker", "label", "source_tag", "end"],
        vec![(interval_days(), true), (col("filed"), true)],
        "max_interval",
    )
}

/// Runs the frame, latest-filing and max-interval passes in order.
pub fn resolve_duplicates(observations: &DataFrame) -> Result<DataFrame> {
    keep_max_interval(&keep_latest_filing(&collapse_frames(observations)?)?)
}

/// Keeps one row per (entity, metric, time index).
///
/// Prefers the branch's canonical form, then the latest period end, then the
/// latest filing. Expects time indices to be assigned.
pub fn resolve_form_collisions(observations: &DataFrame, period_type: PeriodType) -> Result<DataFrame> {
    let canonical = col("form")
        .eq(lit(period_type.canonical_form()))
        .fill_null(lit(false));
    keep_first(
        observations,
        &["ticker", "label", "time"],
        vec![(canonical, true), (col("end"), true), (col("filed"), true)],
        "form_collision",
    )
}
