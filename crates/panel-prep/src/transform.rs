//! Column and row transforms applied to the completed panel.

use panel_core::{DerivedRatio, EstimationWindow, Result, TimeIndex};
use polars::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::panel::{Panel, TICKER, TIME, observed_column};

fn null_f64() -> Expr {
    lit(NULL).cast(DataType::Float64)
}

/// Adds `numerator / denominator` columns.
///
/// A ratio is missing when either input is missing or the denominator is zero,
/// and observed only when both inputs are. Ratios whose inputs are absent from
/// the panel are skipped.
pub fn add_derived_ratios(panel: &mut Panel, ratios: &[DerivedRatio]) -> Result<Vec<String>> {
    let mut written = Vec::new();
    for ratio in ratios {
        if panel.column_index(&ratio.numerator).is_none()
            || panel.column_index(&ratio.denominator).is_none()
        {
            debug!(
                ratio = %ratio.name,
                numerator = %ratio.numerator,
                denominator = %ratio.denominator,
                "Skipped derived ratio with missing inputs"
            );
            continue;
        }
        let (num, den) = (ratio.numerator.as_str(), ratio.denominator.as_str());
        let value = when(col(den).eq(lit(0.0)))
            .then(null_f64())
            .otherwise(col(num) / col(den));
        let observed = col(observed_column(num)).and(col(observed_column(den)));
        panel.put_column(&ratio.name, value, observed)?;
        written.push(ratio.name.clone());
    }
    Ok(written)
}

/// Replaces the given columns by their natural logarithm; values `<= 0` become missing.
pub fn log_transform(panel: &mut Panel, columns: &[String]) -> Result<()> {
    for column in columns {
        if panel.column_index(column).is_none() {
            warn!(column = %column, "Log column not in panel");
            continue;
        }
        let before = panel.frame().column(column)?.null_count();
        let name = column.as_str();
        panel.update(|lf| {
            lf.with_column(
                when(col(name).gt(lit(0.0)))
                    .then(col(name).log(std::f64::consts::E))
                    .otherwise(null_f64())
                    .alias(name),
            )
        })?;
        let nulled = panel.frame().column(column)?.null_count() - before;
        if nulled > 0 {
            debug!(column = %column, nulled, "Non-positive values dropped by log transform");
        }
    }
    Ok(())
}

/// Keeps rows whose time index lies inside the estimation window.
pub fn apply_estimation_window(panel: &mut Panel, window: &EstimationWindow) -> Result<usize> {
    let mut inside = lit(true);
    if let Some(start) = window.start {
        inside = inside.and(col(TIME).gt_eq(lit(start)));
    }
    if let Some(end) = window.end {
        inside = inside.and(col(TIME).lt_eq(lit(end)));
    }
    let dropped = panel.retain(inside)?;
    if dropped > 0 {
        debug!(dropped, start = ?window.start, end = ?window.end, "Applied estimation window");
    }
    Ok(dropped)
}

/// Keeps only time points where every entity has a value of `metric`.
///
/// Returns the retained time indices. An absent metric leaves the panel unchanged.
pub fn common_support(panel: &mut Panel, metric: &str) -> Result<BTreeSet<TimeIndex>> {
    if panel.column_index(metric).is_none() {
        warn!(metric, "Common support metric not in panel");
        return Ok(panel.times());
    }
    let entities = panel.entities().len();
    let counts = panel
        .frame()
        .clone()
        .lazy()
        .group_by([col(TIME)])
        .agg([col(metric).count().cast(DataType::Int64).alias("covered")])
        .collect()?;
    let times = counts.column(TIME)?.i64()?;
    let covered = counts.column("covered")?.i64()?;
    let supported: BTreeSet<TimeIndex> = times
        .into_iter()
        .zip(covered)
        .filter_map(|(time, n)| match (time, n) {
            (Some(time), Some(n)) if usize::try_from(n).is_ok_and(|n| n == entities) => Some(time),
            _ => None,
        })
        .collect();

    let before = panel.len();
    let support = DataFrame::new(vec![Column::new(
        TIME.into(),
        supported.iter().copied().collect::<Vec<_>>(),
    )])?;
    let kept = panel
        .frame()
        .clone()
        .lazy()
        .join(
            support.lazy(),
            [col(TIME)],
            [col(TIME)],
            JoinArgs::new(JoinType::Inner),
        )
        .collect()?;
    panel.replace_frame(kept)?;
    debug!(
        metric,
        kept_times = supported.len(),
        dropped_rows = before - panel.len(),
        "Restricted panel to common support"
    );
    Ok(supported)
}

/// Drops rows whose outcome value is missing.
pub fn restrict_to_observed(panel: &mut Panel, outcome: &str) -> Result<usize> {
    if panel.column_index(outcome).is_none() {
        warn!(outcome, "Outcome column not in panel");
        return Ok(0);
    }
    panel.retain(col(outcome).is_not_null())
}

/// Keeps the rows of the given entities.
pub(crate) fn retain_entities(panel: &mut Panel, keep: &[String]) -> Result<usize> {
    let keep = DataFrame::new(vec![Column::new(TICKER.into(), keep.to_vec())])?;
    let before = panel.len();
    let kept = panel
        .frame()
        .clone()
        .lazy()
        .join(
            keep.lazy(),
            [col(TICKER)],
            [col(TICKER)],
            JoinArgs::new(JoinType::Inner),
        )
        .collect()?;
    panel.replace_frame(kept)?;
    Ok(before - panel.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::observations_to_df;
    use crate::panel::pivot;
    use approx::assert_relative_eq;
    use panel_core::{Observation, PeriodType, Ticker};

    fn cell(ticker: &str, label: &str, time: TimeIndex, value: Option<f64>) -> Observation {
        let mut obs = Observation::new(Ticker::new(ticker), label, "T");
        obs.value = value;
        obs.time_index = Some(time);
        obs
    }

    fn panel() -> Panel {
        let obs = vec![
            cell("MCD", "revenue", 8001, Some(10.0)),
            cell("MCD", "revenue", 8002, Some(0.0)),
            cell("MCD", "gross_profit", 8001, Some(4.0)),
            cell("MCD", "gross_profit", 8002, Some(1.0)),
            cell("WEN", "revenue", 8001, None),
            cell("WEN", "revenue", 8002, Some(5.0)),
            cell("WEN", "gross_profit", 8002, Some(2.0)),
        ];
        let df = observations_to_df(&obs).unwrap();
        pivot(&df, &["revenue", "gross_profit"], PeriodType::Quarterly, None).unwrap()
    }

    #[test]
    fn test_derived_ratios() {
        let mut panel = panel();
        let ratios = vec![
            DerivedRatio::new("gross_margin_pct", "gross_profit", "revenue"),
            DerivedRatio::new("net_margin_pct", "net_income", "revenue"),
        ];
        let written = add_derived_ratios(&mut panel, &ratios).unwrap();
        assert_eq!(written, vec!["gross_margin_pct".to_string()]);

        let mcd = Ticker::new("MCD");
        let wen = Ticker::new("WEN");
        assert_relative_eq!(panel.value(&mcd, 8001, "gross_margin_pct").unwrap(), 0.4);
        assert_eq!(panel.value(&mcd, 8002, "gross_margin_pct"), None);
        assert_eq!(panel.value(&wen, 8001, "gross_margin_pct"), None);
        assert_eq!(panel.observed(&mcd, 8001, "gross_margin_pct"), Some(true));
        assert_eq!(panel.observed(&wen, 8001, "gross_margin_pct"), Some(false));
    }

    #[test]
    fn test_log_transform_nulls_non_positive() {
        let mut panel = panel();
        log_transform(&mut panel, &["revenue".to_string(), "missing".to_string()]).unwrap();
        let mcd = Ticker::new("MCD");
        assert_relative_eq!(panel.value(&mcd, 8001, "revenue").unwrap(), 10f64.ln());
        assert_eq!(panel.value(&mcd, 8002, "revenue"), None);
    }

    #[test]
    fn test_estimation_window() {
        let mut panel = panel();
        let window = EstimationWindow {
            start: Some(8002),
            end: None,
        };
        assert_eq!(apply_estimation_window(&mut panel, &window).unwrap(), 2);
        assert!(panel.rows().unwrap().iter().all(|r| r.time == 8002));
    }

    #[test]
    fn test_common_support() {
        let mut panel = panel();
        let kept = common_support(&mut panel, "revenue").unwrap();
        assert_eq!(kept, [8002].into_iter().collect());
        assert_eq!(panel.len(), 2);
        let entities: Vec<Ticker> = panel.rows().unwrap().into_iter().map(|r| r.ticker).collect();
        assert_eq!(entities, vec![Ticker::new("MCD"), Ticker::new("WEN")]);
    }

    #[test]
    fn test_restrict_to_observed() {
        let mut panel = panel();
        assert_eq!(restrict_to_observed(&mut panel, "revenue").unwrap(), 1);
        assert_eq!(restrict_to_observed(&mut panel, "unknown").unwrap(), 0);
        assert_eq!(panel.len(), 3);
    }

    #[test]
    fn test_retain_entities() {
        let mut panel = panel();
        assert_eq!(retain_entities(&mut panel, &["WEN".to_string()]).unwrap(), 2);
        assert_eq!(panel.entities(), vec![Ticker::new("WEN")]);
    }
}
