//! Wide panel: one row per (entity, time index), one column per metric.
//!
//! The panel is a polars [`DataFrame`] kept sorted by entity, then time index.
//! Each metric column has a boolean companion recording whether the cell was
//! observed before completion and imputation; the donor filter measures
//! coverage on observed cells only.

use panel_core::{PanelError, PeriodType, PipelineConfig, Result, Ticker, TimeIndex};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Entity column.
pub const TICKER: &str = "ticker";
/// Time index column.
pub const TIME: &str = "time";
/// Treatment indicator column.
pub const TREATED: &str = "boycotted";

const OBSERVED_SUFFIX: &str = "__observed";

/// Name of the observed-cell mask of a metric column.
#[must_use]
pub fn observed_column(metric: &str) -> String {
    format!("{metric}{OBSERVED_SUFFIX}")
}

/// The treated entity and the first treated time index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treatment {
    /// Treated entity.
    pub ticker: Ticker,
    /// First treated time index.
    pub start_index: TimeIndex,
}

impl Treatment {
    /// Creates a treatment definition.
    #[must_use]
    pub fn new(ticker: impl Into<Ticker>, start_index: TimeIndex) -> Self {
        Self {
            ticker: ticker.into(),
            start_index,
        }
    }

    /// Treatment of a pipeline configuration, resolved on its branch's time axis.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.treatment.ticker.clone(), config.treatment_start_index())
    }

    /// Treatment indicator of one (entity, time) cell.
    #[must_use]
    pub fn indicator(&self, ticker: &Ticker, time: TimeIndex) -> bool {
        ticker == &self.ticker && time >= self.start_index
    }

    /// The indicator as a column expression over [`TICKER`] and [`TIME`].
    #[must_use]
    pub fn indicator_expr(&self) -> Expr {
        col(TICKER)
            .eq(lit(self.ticker.as_str()))
            .and(col(TIME).gt_eq(lit(self.start_index)))
    }
}

/// One (entity, time index) row of the panel.
#[derive(Clone, Debug, PartialEq)]
pub struct PanelRow {
    /// Entity.
    pub ticker: Ticker,
    /// Time index.
    pub time: TimeIndex,
    /// Treatment indicator.
    pub treated: bool,
    /// Metric values, aligned with [`Panel::columns`].
    pub values: Vec<Option<f64>>,
    /// Whether each value was reported rather than completed or imputed.
    pub observed: Vec<bool>,
}

impl PanelRow {
    /// Creates a row with every metric missing.
    #[must_use]
    pub fn empty(ticker: Ticker, time: TimeIndex, width: usize) -> Self {
        Self {
            ticker,
            time,
            treated: false,
            values: vec![None; width],
            observed: vec![false; width],
        }
    }
}

/// Balanced-panel table indexed by (entity, time index).
#[derive(Clone, Debug, PartialEq)]
pub struct Panel {
    frame: DataFrame,
    columns: Vec<String>,
    period_type: PeriodType,
    treatment: Option<Treatment>,
}

/// Key, metric and mask columns in panel layout order.
fn layout(columns: &[String]) -> Vec<Expr> {
    let mut exprs = vec![col(TICKER), col(TIME), col(TREATED)];
    exprs.extend(columns.iter().map(|name| col(name.as_str())));
    exprs.extend(columns.iter().map(|name| col(observed_column(name))));
    exprs
}

/// Key combinations that appear on more than one row, sorted by key.
fn duplicated_keys(frame: &DataFrame, keys: &[&str]) -> Result<DataFrame> {
    let by: Vec<Expr> = keys.iter().map(|key| col(*key)).collect();
    Ok(frame
        .clone()
        .lazy()
        .group_by(by)
        .agg([len().alias("rows")])
        .filter(col("rows").gt(lit(1)))
        .sort(keys.iter().copied(), SortMultipleOptions::new())
        .collect()?)
}

fn duplicate_cell(duplicates: &DataFrame, metric: Option<&str>) -> Result<PanelError> {
    let ticker = duplicates.column(TICKER)?.str()?.get(0).unwrap_or_default();
    let time = duplicates.column(TIME)?.i64()?.get(0).unwrap_or_default();
    let metric = match metric {
        Some(label) => duplicates.column(label)?.str()?.get(0).unwrap_or_default(),
        None => "*",
    };
    Ok(PanelError::DuplicatePanelCell {
        ticker: ticker.to_string(),
        time,
        metric: metric.to_string(),
    })
}

impl Panel {
    /// Creates an empty panel with the given metric columns.
    pub fn new(columns: Vec<String>, period_type: PeriodType) -> Result<Self> {
        Self::from_rows(columns, Vec::new(), period_type)
    }

    /// Builds a panel from rows, rejecting misaligned or duplicate rows.
    pub fn from_rows(columns: Vec<String>, rows: Vec<PanelRow>, period_type: PeriodType) -> Result<Self> {
        if let Some(row) = rows
            .iter()
            .find(|row| row.values.len() != columns.len() || row.observed.len() != columns.len())
        {
            return Err(PanelError::InvalidParameter(format!(
                "row for {} at {} has {} values for {} columns",
                row.ticker,
                row.time,
                row.values.len(),
                columns.len()
            )));
        }

        let mut series = vec![
            Column::new(
                TICKER.into(),
                rows.iter().map(|r| r.ticker.to_string()).collect::<Vec<_>>(),
            ),
            Column::new(TIME.into(), rows.iter().map(|r| r.time).collect::<Vec<_>>()),
            Column::new(TREATED.into(), rows.iter().map(|r| r.treated).collect::<Vec<_>>()),
        ];
        for (idx, name) in columns.iter().enumerate() {
            series.push(Column::new(
                name.as_str().into(),
                rows.iter().map(|r| r.values[idx]).collect::<Vec<_>>(),
            ));
        }
        for (idx, name) in columns.iter().enumerate() {
            series.push(Column::new(
                observed_column(name).into(),
                rows.iter().map(|r| r.observed[idx]).collect::<Vec<_>>(),
            ));
        }
        let frame = DataFrame::new(series)?;

        let duplicates = duplicated_keys(&frame, &[TICKER, TIME])?;
        if duplicates.height() > 0 {
            return Err(duplicate_cell(&duplicates, None)?);
        }

        let mut panel = Self {
            frame,
            columns,
            period_type,
            treatment: None,
        };
        panel.sort()?;
        Ok(panel)
    }

    /// The underlying frame, including the observed-cell masks.
    #[must_use]
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Metric column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows, sorted by entity then time index.
    pub fn rows(&self) -> Result<Vec<PanelRow>> {
        let tickers = self.frame.column(TICKER)?.str()?;
        let times = self.frame.column(TIME)?.i64()?;
        let treated = self.frame.column(TREATED)?.bool()?;
        let mut values = Vec::with_capacity(self.columns.len());
        let mut masks = Vec::with_capacity(self.columns.len());
        for name in &self.columns {
            values.push(self.frame.column(name)?.f64()?);
            masks.push(self.frame.column(&observed_column(name))?.bool()?);
        }

        Ok((0..self.frame.height())
            .map(|i| PanelRow {
                ticker: Ticker::new(tickers.get(i).unwrap_or_default()),
                time: times.get(i).unwrap_or_default(),
                treated: treated.get(i).unwrap_or(false),
                values: values.iter().map(|v| v.get(i)).collect(),
                observed: masks.iter().map(|m| m.get(i).unwrap_or(false)).collect(),
            })
            .collect())
    }

    /// Branch of the time axis.
    #[must_use]
    pub const fn period_type(&self) -> PeriodType {
        self.period_type
    }

    /// Treatment currently applied to the indicator.
    #[must_use]
    pub const fn treatment(&self) -> Option<&Treatment> {
        self.treatment.as_ref()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frame.height()
    }

    /// Returns true if the panel has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Position of a metric column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Adds a metric column filled with missing values, returning its position.
    ///
    /// An existing column of the same name is reused.
    pub fn add_column(&mut self, name: impl Into<String>) -> Result<usize> {
        let name = name.into();
        if let Some(idx) = self.column_index(&name) {
            return Ok(idx);
        }
        self.put_column(&name, lit(NULL).cast(DataType::Float64), lit(false))?;
        Ok(self.columns.len() - 1)
    }

    /// Writes a metric column and its observed mask, registering the name if new.
    pub(crate) fn put_column(&mut self, name: &str, value: Expr, observed: Expr) -> Result<()> {
        self.update(|lf| {
            lf.with_columns([
                value.cast(DataType::Float64).alias(name),
                observed.alias(observed_column(name)),
            ])
        })?;
        if self.column_index(name).is_none() {
            self.columns.push(name.to_string());
        }
        Ok(())
    }

    fn position(&self, ticker: &Ticker, time: TimeIndex) -> Option<usize> {
        let tickers = self.frame.column(TICKER).ok()?.str().ok()?;
        let times = self.frame.column(TIME).ok()?.i64().ok()?;
        tickers
            .into_iter()
            .zip(times)
            .position(|(t, s)| t == Some(ticker.as_str()) && s == Some(time))
    }

    /// Value of one cell.
    #[must_use]
    pub fn value(&self, ticker: &Ticker, time: TimeIndex, column: &str) -> Option<f64> {
        self.column_index(column)?;
        let row = self.position(ticker, time)?;
        self.frame.column(column).ok()?.f64().ok()?.get(row)
    }

    /// Whether one cell was reported rather than completed or imputed.
    #[must_use]
    pub fn observed(&self, ticker: &Ticker, time: TimeIndex, column: &str) -> Option<bool> {
        self.column_index(column)?;
        let row = self.position(ticker, time)?;
        self.frame
            .column(&observed_column(column))
            .ok()?
            .bool()
            .ok()?
            .get(row)
    }

    /// Distinct entities, sorted.
    #[must_use]
    pub fn entities(&self) -> Vec<Ticker> {
        let Ok(tickers) = self.frame.column(TICKER).and_then(Column::str) else {
            return Vec::new();
        };
        let mut entities: Vec<Ticker> = tickers.into_iter().flatten().map(Ticker::new).collect();
        entities.dedup();
        entities
    }

    /// Distinct time indices across all entities.
    #[must_use]
    pub fn times(&self) -> BTreeSet<TimeIndex> {
        self.frame
            .column(TIME)
            .and_then(Column::i64)
            .map(|times| times.into_iter().flatten().collect())
            .unwrap_or_default()
    }

    /// Applies a treatment and recomputes every row's indicator.
    pub fn set_treatment(&mut self, treatment: Treatment) -> Result<()> {
        let indicator = treatment.indicator_expr();
        self.update(|lf| lf.with_column(indicator.alias(TREATED)))?;
        self.treatment = Some(treatment);
        Ok(())
    }

    /// Label of a time index on this panel's axis (`2024Q1`, or `2024`).
    #[must_use]
    pub fn period_label(&self, time: TimeIndex) -> String {
        self.period_type.time_label(time)
    }

    /// Replaces the frame by a lazy transform of itself.
    pub(crate) fn update(&mut self, f: impl FnOnce(LazyFrame) -> LazyFrame) -> Result<()> {
        self.frame = f(self.frame.clone().lazy()).collect()?;
        Ok(())
    }

    /// Keeps rows matching the predicate, returning the number dropped.
    pub(crate) fn retain(&mut self, predicate: Expr) -> Result<usize> {
        let before = self.len();
        self.update(|lf| lf.filter(predicate))?;
        Ok(before - self.len())
    }

    /// Replaces the frame, restoring the layout and row order.
    pub(crate) fn replace_frame(&mut self, frame: DataFrame) -> Result<()> {
        let columns = layout(&self.columns);
        self.frame = frame.lazy().select(columns).collect()?;
        self.sort()
    }

    fn sort(&mut self) -> Result<()> {
        self.update(|lf| {
            lf.sort(
                [TICKER, TIME],
                SortMultipleOptions::new().with_maintain_order(true),
            )
        })
    }
}

/// Orders metric labels by the configured label order, then alphabetically.
fn order_columns(present: BTreeSet<&str>, preferred: &[&str]) -> Vec<String> {
    let mut columns: Vec<String> = preferred
        .iter()
        .filter(|label| present.contains(*label))
        .map(|label| (*label).to_string())
        .collect();
    columns.extend(
        present
            .into_iter()
            .filter(|label| !preferred.contains(label))
            .map(str::to_string),
    );
    columns
}

/// Pivots a long observation table into a wide panel.
///
/// Reads the `ticker`, `label`, `time` and `val` columns. Metric columns follow
/// `label_order` for the labels present, then any other labels alphabetically.
/// More than one row for the same (entity, time, metric) is a
/// [`PanelError::DuplicatePanelCell`].
pub fn pivot(
    observations: &DataFrame,
    label_order: &[&str],
    period_type: PeriodType,
    treatment: Option<Treatment>,
) -> Result<Panel> {
    let placed = observations
        .clone()
        .lazy()
        .filter(col("label").is_not_null().and(col(TIME).is_not_null()))
        .select([
            col(TICKER).cast(DataType::String),
            col(TIME).cast(DataType::Int64),
            col("label").cast(DataType::String),
            col("val").cast(DataType::Float64),
        ])
        .collect()?;
    let skipped = observations.height() - placed.height();
    if skipped > 0 {
        debug!(skipped, "Skipped observations without label or time index");
    }

    let duplicates = duplicated_keys(&placed, &[TICKER, TIME, "label"])?;
    if duplicates.height() > 0 {
        return Err(duplicate_cell(&duplicates, Some("label"))?);
    }

    let labels = placed.column("label")?.str()?;
    let present: BTreeSet<&str> = labels.into_iter().flatten().collect();
    let columns = order_columns(present, label_order);

    let mut cells = Vec::with_capacity(columns.len() * 2);
    for name in &columns {
        let cell = col("val").filter(col("label").eq(lit(name.as_str()))).first();
        cells.push(cell.clone().alias(name.as_str()));
        cells.push(cell.is_not_null().alias(observed_column(name)));
    }
    let wide = placed
        .lazy()
        .group_by([col(TICKER), col(TIME)])
        .agg(cells)
        .with_column(lit(false).alias(TREATED))
        .collect()?;

    let mut panel = Panel {
        frame: DataFrame::empty(),
        columns,
        period_type,
        treatment: None,
    };
    panel.replace_frame(wide)?;
    if let Some(treatment) = treatment {
        panel.set_treatment(treatment)?;
    }
    debug!(
        rows = panel.len(),
        columns = panel.columns.len(),
        entities = panel.entities().len(),
        "Pivoted panel"
    );
    Ok(panel)
}
