//! Donor filtering by pre-treatment outcome coverage.
//!
//! A donor's coverage is the share of the panel's pre-treatment time points at
//! which it reported the outcome. Coverage counts reported cells only: values
//! added by completion or imputation do not make a donor eligible. The treated
//! entity is always kept.

use panel_core::{PanelError, Result, Ticker, TimeIndex};
use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::panel::{Panel, TICKER, TIME, TREATED, observed_column};
use crate::transform::retain_entities;

/// Coverage of one entity over the pre-treatment time points.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DonorCoverage {
    /// Entity.
    pub ticker: Ticker,
    /// Pre-treatment time points with a reported outcome.
    pub observed: usize,
    /// Pre-treatment time points in the sample.
    pub required: usize,
    /// `observed / required`.
    pub ratio: f64,
    /// Whether the entity is the treated unit.
    pub treated: bool,
    /// Whether the entity survived the filter.
    pub kept: bool,
}

/// Outcome of the donor filter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DonorReport {
    /// Outcome metric measured.
    pub outcome: String,
    /// First time index excluded from the pre-treatment sample.
    pub cutoff: Option<TimeIndex>,
    /// Minimum coverage required.
    pub min_coverage: f64,
    /// Per-entity coverage, sorted by entity.
    pub entities: Vec<DonorCoverage>,
}

impl DonorReport {
    /// Entities kept in the panel.
    pub fn kept(&self) -> impl Iterator<Item = &Ticker> {
        self.entities.iter().filter(|e| e.kept).map(|e| &e.ticker)
    }

    /// Entities removed from the panel.
    pub fn dropped(&self) -> impl Iterator<Item = &Ticker> {
        self.entities.iter().filter(|e| !e.kept).map(|e| &e.ticker)
    }

    /// Coverage entry of one entity.
    #[must_use]
    pub fn get(&self, ticker: &Ticker) -> Option<&DonorCoverage> {
        self.entities.iter().find(|e| &e.ticker == ticker)
    }
}

/// First treated time index: the explicit cutoff, else the earliest treated row.
fn resolve_cutoff(panel: &Panel, explicit: Option<TimeIndex>) -> Result<Option<TimeIndex>> {
    if explicit.is_some() {
        return Ok(explicit);
    }
    let first = panel
        .frame()
        .clone()
        .lazy()
        .filter(col(TREATED))
        .select([col(TIME).min()])
        .collect()?;
    Ok(first.column(TIME)?.i64()?.get(0))
}

/// Removes donors whose pre-treatment outcome coverage is below `min_coverage`.
///
/// Pre-treatment time points are the panel's distinct time indices before the
/// cutoff (all of them when no cutoff can be resolved). Fails if the outcome
/// column is absent.
pub fn filter_donors(
    panel: &mut Panel,
    outcome: &str,
    min_coverage: f64,
    cutoff: Option<TimeIndex>,
) -> Result<DonorReport> {
    if panel.column_index(outcome).is_none() {
        return Err(PanelError::MissingColumn(outcome.to_string()));
    }
    let treated = panel.treatment().map(|t| t.ticker.clone());
    let cutoff = resolve_cutoff(panel, cutoff)?;
    let pre_treatment = match cutoff {
        Some(c) => col(TIME).lt(lit(c)),
        None => lit(true),
    };
    let required = panel
        .times()
        .into_iter()
        .filter(|&t| cutoff.is_none_or(|c| t < c))
        .count();

    let counts = panel
        .frame()
        .clone()
        .lazy()
        .group_by([col(TICKER)])
        .agg([col(observed_column(outcome))
            .and(pre_treatment)
            .cast(DataType::Int64)
            .sum()
            .alias("observed")])
        .sort([TICKER], SortMultipleOptions::new())
        .collect()?;
    let tickers = counts.column(TICKER)?.str()?;
    let observed_counts = counts.column("observed")?.i64()?;

    let mut entities = Vec::with_capacity(counts.height());
    for (ticker, observed) in tickers.into_iter().zip(observed_counts) {
        let Some(ticker) = ticker else {
            continue;
        };
        let ticker = Ticker::new(ticker);
        let observed = observed.and_then(|n| usize::try_from(n).ok()).unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        let ratio = if required == 0 {
            1.0
        } else {
            observed as f64 / required as f64
        };
        let is_treated = treated.as_ref() == Some(&ticker);
        entities.push(DonorCoverage {
            kept: is_treated || ratio >= min_coverage,
            ticker,
            observed,
            required,
            ratio,
            treated: is_treated,
        });
    }

    if required == 0 {
        warn!(outcome, cutoff = ?cutoff, "No pre-treatment time points; donors kept unfiltered");
    }

    for entity in entities.iter().filter(|e| !e.kept) {
        info!(
            ticker = %entity.ticker,
            coverage = entity.ratio,
            min_coverage,
            "Dropped sparse donor"
        );
    }
    if entities.iter().any(|e| !e.kept) {
        let kept: Vec<String> = entities
            .iter()
            .filter(|e| e.kept)
            .map(|e| e.ticker.to_string())
            .collect();
        retain_entities(panel, &kept)?;
    }

    Ok(DonorReport {
        outcome: outcome.to_string(),
        cutoff,
        min_coverage,
        entities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complete::complete_grid;
    use crate::impute::impute;
    use crate::io::observations_to_df;
    use crate::panel::{Treatment, pivot};
    use panel_core::{ImputeConfig, Observation, PeriodType};

    fn cell(ticker: &str, time: TimeIndex) -> Observation {
        let mut obs = Observation::new(Ticker::new(ticker), "revenue", "T").with_value(1.0);
        obs.time_index = Some(time);
        obs
    }

    /// Ten pre-treatment quarters 8001..=8010, treatment from 8011.
    fn panel() -> Panel {
        let mut obs = Vec::new();
        for t in 8001..=8011 {
            obs.push(cell("X", t));
        }
        for t in [8001, 8005, 8010, 8011] {
            obs.push(cell("Y", t));
        }
        for t in [8010, 8011] {
            obs.push(cell("MCD", t));
        }
        let mut panel = pivot(
            &observations_to_df(&obs).unwrap(),
            &["revenue"],
            PeriodType::Quarterly,
            Some(Treatment::new("MCD", 8011)),
        )
        .unwrap();
        complete_grid(&mut panel).unwrap();
        panel
    }

    #[test]
    fn test_sparse_donor_dropped_treated_kept() {
        let mut panel = panel();
        let report = filter_donors(&mut panel, "revenue", 0.7, None).unwrap();

        assert_eq!(report.cutoff, Some(8011));
        let y = report.get(&Ticker::new("Y")).unwrap();
        assert_eq!((y.observed, y.required), (3, 10));
        assert!(!y.kept);

        let mcd = report.get(&Ticker::new("MCD")).unwrap();
        assert!(mcd.treated);
        assert!(mcd.kept);
        assert!(mcd.ratio < 0.7);

        assert_eq!(panel.entities(), vec![Ticker::new("MCD"), Ticker::new("X")]);
        assert_eq!(report.dropped().count(), 1);
    }

    #[test]
    fn test_imputed_cells_do_not_count() {
        let mut panel = panel();
        impute(&mut panel, &ImputeConfig::default()).unwrap();
        let report = filter_donors(&mut panel, "revenue", 0.7, None).unwrap();
        assert!(!report.get(&Ticker::new("Y")).unwrap().kept);
    }

    #[test]
    fn test_explicit_cutoff() {
        let mut panel = panel();
        let report = filter_donors(&mut panel, "revenue", 0.5, Some(8002)).unwrap();
        assert_eq!(report.get(&Ticker::new("Y")).unwrap().required, 1);
        assert!(report.get(&Ticker::new("Y")).unwrap().kept);
    }

    #[test]
    fn test_missing_outcome_is_error() {
        let mut panel = panel();
        let result = filter_donors(&mut panel, "net_income", 0.7, None);
        assert!(matches!(result, Err(PanelError::MissingColumn(_))));
    }
}
