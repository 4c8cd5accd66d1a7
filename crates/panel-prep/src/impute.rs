//! Within-entity imputation by carrying values forward and backward in time.

use panel_core::{ImputeConfig, ImputeMethod, Result};
use polars::prelude::*;
use tracing::debug;

use crate::panel::{Panel, TICKER};

fn fill(column: &str, method: ImputeMethod) -> Expr {
    let value = col(column);
    let filled = match method {
        ImputeMethod::Forward => value.forward_fill(None),
        ImputeMethod::Backward => value.backward_fill(None),
        ImputeMethod::Both => value.forward_fill(None).backward_fill(None),
    };
    filled.over([col(TICKER)]).alias(column)
}

fn null_cells(panel: &Panel, columns: &[String]) -> Result<usize> {
    let mut nulls = 0;
    for name in columns {
        nulls += panel.frame().column(name)?.null_count();
    }
    Ok(nulls)
}

/// Fills missing metric values within each entity's time series.
///
/// Columns named in `config.exclude` are left untouched. Values never cross
/// entities, and a column an entity never reported stays missing. Observed-cell
/// masks are not changed. Returns the number of cells filled.
pub fn impute(panel: &mut Panel, config: &ImputeConfig) -> Result<usize> {
    let targets: Vec<String> = panel
        .columns()
        .iter()
        .filter(|name| !config.exclude.contains(name))
        .cloned()
        .collect();
    if targets.is_empty() {
        return Ok(0);
    }

    let before = null_cells(panel, &targets)?;
    let fills: Vec<Expr> = targets.iter().map(|name| fill(name, config.method)).collect();
    panel.update(|lf| lf.with_columns(fills))?;
    let filled = before - null_cells(panel, &targets)?;

    debug!(filled, method = ?config.method, "Imputed missing values");
    Ok(filled)
}
