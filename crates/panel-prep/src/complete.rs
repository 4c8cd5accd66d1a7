//! Panel completion.
//!
//! Every entity gets one row per integer time index between its first and last
//! observed index. Added rows carry missing values in every metric.

use panel_core::{PanelError, Result, TimeIndex};
use polars::prelude::*;
use tracing::debug;

use crate::panel::{Panel, TICKER, TIME, TREATED, observed_column};

/// Smallest float that converts to a time index.
#[allow(clippy::cast_precision_loss)]
const MIN_TIME: f64 = TimeIndex::MIN as f64;
/// Exclusive upper bound: `TimeIndex::MAX` rounds up to 2^63 as a float.
#[allow(clippy::cast_precision_loss)]
const MAX_TIME: f64 = TimeIndex::MAX as f64;

/// Converts a floating-point time value to a time index.
///
/// Fails with [`PanelError::NonIntegerTimeIndex`] unless the value is a finite
/// whole number inside the time index range.
pub fn time_index_from_f64(column: &str, value: f64) -> Result<TimeIndex> {
    if !value.is_finite() || value.fract() != 0.0 || !(MIN_TIME..MAX_TIME).contains(&value) {
        return Err(PanelError::NonIntegerTimeIndex {
            column: column.to_string(),
            value,
        });
    }
    #[allow(clippy::cast_possible_truncation)]
    let index = value as TimeIndex;
    Ok(index)
}

/// One row per (entity, time index) between each entity's first and last index.
fn time_grid(panel: &Panel) -> Result<DataFrame> {
    let bounds = panel
        .frame()
        .clone()
        .lazy()
        .group_by([col(TICKER)])
        .agg([
            col(TIME).min().alias("first"),
            col(TIME).max().alias("last"),
        ])
        .collect()?;

    let tickers = bounds.column(TICKER)?.str()?;
    let firsts = bounds.column("first")?.i64()?;
    let lasts = bounds.column("last")?.i64()?;
    let mut grid_tickers: Vec<String> = Vec::new();
    let mut grid_times: Vec<TimeIndex> = Vec::new();
    for ((ticker, first), last) in tickers.into_iter().zip(firsts).zip(lasts) {
        let (Some(ticker), Some(first), Some(last)) = (ticker, first, last) else {
            continue;
        };
        for time in first..=last {
            grid_tickers.push(ticker.to_string());
            grid_times.push(time);
        }
    }
    Ok(DataFrame::new(vec![
        Column::new(TICKER.into(), grid_tickers),
        Column::new(TIME.into(), grid_times),
    ])?)
}

/// Fills every entity's time grid between its first and last time index.
///
/// The observed rows are left-joined onto the full grid. Returns the number of
/// rows added. The treatment indicator of added rows follows the panel's treatment.
pub fn complete_grid(panel: &mut Panel) -> Result<usize> {
    let grid = time_grid(panel)?;
    let added = grid.height() - panel.len();
    if added == 0 {
        debug!(rows = panel.len(), "Panel grid already complete");
        return Ok(0);
    }

    let mut fills: Vec<Expr> = panel
        .columns()
        .iter()
        .map(|name| {
            let mask = observed_column(name);
            col(mask.as_str()).fill_null(lit(false)).alias(mask)
        })
        .collect();
    fills.push(match panel.treatment() {
        Some(treatment) => treatment.indicator_expr().alias(TREATED),
        None => col(TREATED).fill_null(lit(false)),
    });

    let keys = [col(TICKER), col(TIME)];
    let completed = grid
        .lazy()
        .join(
            panel.frame().clone().lazy(),
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Left),
        )
        .with_columns(fills)
        .collect()?;
    panel.replace_frame(completed)?;

    debug!(added, rows = panel.len(), "Completed panel grid");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::observations_to_df;
    use crate::panel::{Treatment, pivot};
    use panel_core::{Observation, PeriodType, Ticker};

    fn cell(ticker: &str, time: TimeIndex, value: f64) -> Observation {
        let mut obs = Observation::new(Ticker::new(ticker), "revenue", "T").with_value(value);
        obs.time_index = Some(time);
        obs
    }

    fn wide(obs: &[Observation], treatment: Option<Treatment>) -> Panel {
        let df = observations_to_df(obs).unwrap();
        pivot(&df, &["revenue"], PeriodType::Quarterly, treatment).unwrap()
    }

    #[test]
    fn test_time_index_from_f64() {
        assert_eq!(time_index_from_f64("time", 8001.0).unwrap(), 8001);
        assert_eq!(time_index_from_f64("time", -4.0).unwrap(), -4);
        assert!(matches!(
            time_index_from_f64("time", 8001.5),
            Err(PanelError::NonIntegerTimeIndex { .. })
        ));
        assert!(time_index_from_f64("time", f64::NAN).is_err());
        assert!(time_index_from_f64("time", f64::INFINITY).is_err());
    }

    #[test]
    fn test_time_index_out_of_range_rejected() {
        for value in [1e300, -1e300, 9.3e18, TimeIndex::MAX as f64] {
            assert!(matches!(
                time_index_from_f64("time", value),
                Err(PanelError::NonIntegerTimeIndex { .. })
            ));
        }
        assert_eq!(
            time_index_from_f64("time", TimeIndex::MIN as f64).unwrap(),
            TimeIndex::MIN
        );
    }

    #[test]
    fn test_complete_fills_interior_gap() {
        let mut panel = wide(
            &[cell("MCD", 8001, 1.0), cell("MCD", 8003, 3.0), cell("MCD", 8004, 4.0)],
            None,
        );

        assert_eq!(complete_grid(&mut panel).unwrap(), 1);
        let rows = panel.rows().unwrap();
        let times: Vec<TimeIndex> = rows.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![8001, 8002, 8003, 8004]);
        assert_eq!(rows[1].values, vec![None]);
        assert_eq!(rows[1].observed, vec![false]);
        assert_eq!(rows[2].values, vec![Some(3.0)]);
        assert_eq!(rows[2].observed, vec![true]);
    }

    #[test]
    fn test_complete_is_per_entity() {
        let mut panel = wide(
            &[
                cell("MCD", 8001, 1.0),
                cell("MCD", 8003, 3.0),
                cell("WEN", 8010, 1.0),
                cell("WEN", 8011, 1.0),
            ],
            None,
        );
        assert_eq!(complete_grid(&mut panel).unwrap(), 1);

        let rows = panel.rows().unwrap();
        for entity in panel.entities() {
            let times: Vec<TimeIndex> = rows
                .iter()
                .filter(|r| r.ticker == entity)
                .map(|r| r.time)
                .collect();
            let expected: Vec<TimeIndex> = (times[0]..=times[times.len() - 1]).collect();
            assert_eq!(times, expected);
        }
        assert_eq!(panel.len(), 5);
        assert_eq!(complete_grid(&mut panel).unwrap(), 0);
    }

    #[test]
    fn test_added_rows_follow_treatment() {
        let mut panel = wide(
            &[cell("MCD", 8096, 1.0), cell("MCD", 8099, 1.0)],
            Some(Treatment::new("MCD", 8097)),
        );
        complete_grid(&mut panel).unwrap();
        let flags: Vec<bool> = panel.rows().unwrap().iter().map(|r| r.treated).collect();
        assert_eq!(flags, vec![false, true, true, true]);
    }
}
