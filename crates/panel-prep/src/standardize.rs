//! Baseline standardization.
//!
//! Each configured metric is rescaled against the entity's value at its first
//! time index and written to a new `{metric}_{suffix}` column.

use panel_core::{Result, StandardizeConfig, StandardizeMethod};
use polars::prelude::*;
use tracing::{debug, warn};

use crate::panel::{Panel, TICKER, observed_column};

/// Name of the standardized column derived from `column`.
#[must_use]
pub fn standardized_name(column: &str, suffix: &str) -> String {
    format!("{column}_{suffix}")
}

/// `column` rescaled against each entity's first row.
///
/// Ratio yields null for a missing or zero baseline; difference yields null
/// for a missing baseline.
#[must_use]
pub fn rescaled(column: &str, method: StandardizeMethod) -> Expr {
    let baseline = col(column).first().over([col(TICKER)]);
    match method {
        StandardizeMethod::Ratio => when(baseline.clone().eq(lit(0.0)))
            .then(lit(NULL).cast(DataType::Float64))
            .otherwise(col(column) / baseline),
        StandardizeMethod::Diff => col(column) - baseline,
    }
}

/// Adds a standardized column per configured metric.
///
/// Metrics absent from the panel are skipped with a warning. Returns the names
/// of the columns written.
pub fn standardize(panel: &mut Panel, config: &StandardizeConfig) -> Result<Vec<String>> {
    let mut written = Vec::new();
    for column in &config.columns {
        if panel.column_index(column).is_none() {
            warn!(column = %column, "Standardization column not in panel");
            continue;
        }
        let name = standardized_name(column, &config.suffix);
        panel.put_column(
            &name,
            rescaled(column, config.method),
            col(observed_column(column)),
        )?;

        let unusable = panel
            .frame()
            .clone()
            .lazy()
            .group_by([col(TICKER)])
            .agg([col(name.as_str()).first().is_null().alias("unusable")])
            .filter(col("unusable"))
            .collect()?
            .height();
        if unusable > 0 {
            debug!(column = %column, entities = unusable, "Unusable standardization baselines");
        }
        written.push(name);
    }
    Ok(written)
}
