//! Tabular conversion and persistence.
//!
//! Observation tables and the wide panel convert to and from polars
//! [`DataFrame`]s, which persist as parquet or CSV.
//!
//! Observation columns: `ticker`, `label`, `source_tag`, `unit`, `start`, `end`,
//! `filed`, `form`, `val`, `accn`, `fy`, `fp`, `frame`, `time`.
//! Panel columns: `ticker`, `time`, `period`, `boycotted`, then one column per metric.

use chrono::NaiveDate;
use panel_core::{Observation, PanelError, PeriodType, Result, Ticker, TimeIndex};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::debug;

use crate::complete::time_index_from_f64;
use crate::normalize::parse_date;
use crate::panel::{Panel, PanelRow, TICKER, TIME, TREATED};

/// Key columns of the wide panel, ahead of the metric columns.
pub const PANEL_KEY_COLUMNS: [&str; 4] = ["ticker", "time", "period", "boycotted"];

const DATE_COLUMNS: [&str; 3] = ["start", "end", "filed"];

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn read_strings(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<String>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let column = column.cast(&DataType::String)?;
    let values = column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    Ok(Some(values))
}

fn read_f64(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<f64>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let column = column.cast(&DataType::Float64)?;
    Ok(Some(column.f64()?.into_iter().collect()))
}

fn read_i64(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<i64>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let column = column.cast(&DataType::Int64)?;
    Ok(Some(column.i64()?.into_iter().collect()))
}

/// Reads a time column, rejecting fractional values.
fn read_time(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<TimeIndex>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    if !column.dtype().is_float() {
        return read_i64(df, name);
    }
    column
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(|v| v.map(|v| time_index_from_f64(name, v)).transpose())
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn required<T>(values: Option<T>, name: &str) -> Result<T> {
    values.ok_or_else(|| PanelError::MissingColumn(name.to_string()))
}

fn cast_dates(df: DataFrame, names: &[&str]) -> Result<DataFrame> {
    let casts: Vec<Expr> = names
        .iter()
        .map(|name| col(*name).cast(DataType::Date))
        .collect();
    Ok(df.lazy().with_columns(casts).collect()?)
}

/// Converts observations into a long table.
pub fn observations_to_df(observations: &[Observation]) -> Result<DataFrame> {
    let strings = |f: fn(&Observation) -> Option<String>| -> Vec<Option<String>> {
        observations.iter().map(f).collect()
    };

    let df = DataFrame::new(vec![
        Column::new(
            "ticker".into(),
            observations
                .iter()
                .map(|o| o.ticker.to_string())
                .collect::<Vec<_>>(),
        ),
        Column::new("label".into(), strings(|o| o.label.clone())),
        Column::new(
            "source_tag".into(),
            observations
                .iter()
                .map(|o| o.source_tag.clone())
                .collect::<Vec<_>>(),
        ),
        Column::new("unit".into(), strings(|o| o.unit.clone())),
        Column::new("start".into(), strings(|o| format_date(o.period_start))),
        Column::new("end".into(), strings(|o| format_date(o.period_end))),
        Column::new("filed".into(), strings(|o| format_date(o.filed))),
        Column::new("form".into(), strings(|o| o.form.clone())),
        Column::new(
            "val".into(),
            observations.iter().map(|o| o.value).collect::<Vec<_>>(),
        ),
        Column::new("accn".into(), strings(|o| o.accn.clone())),
        Column::new(
            "fy".into(),
            observations
                .iter()
                .map(|o| o.fiscal_year)
                .collect::<Vec<_>>(),
        ),
        Column::new("fp".into(), strings(|o| o.fiscal_period.clone())),
        Column::new("frame".into(), strings(|o| o.frame.clone())),
        Column::new(
            "time".into(),
            observations
                .iter()
                .map(|o| o.time_index)
                .collect::<Vec<_>>(),
        ),
    ])?;

    cast_dates(df, &DATE_COLUMNS)
}

/// Reads observations from a long table.
///
/// `ticker` and `source_tag` are required; every other column is optional.
pub fn observations_from_df(df: &DataFrame) -> Result<Vec<Observation>> {
    let height = df.height();
    let column = |name: &str| -> Result<Vec<Option<String>>> {
        Ok(read_strings(df, name)?.unwrap_or_else(|| vec![None; height]))
    };

    let tickers = required(read_strings(df, "ticker")?, "ticker")?;
    let tags = required(read_strings(df, "source_tag")?, "source_tag")?;
    let labels = column("label")?;
    let units = column("unit")?;
    let starts = column("start")?;
    let ends = column("end")?;
    let filed = column("filed")?;
    let forms = column("form")?;
    let accns = column("accn")?;
    let fps = column("fp")?;
    let frames = column("frame")?;
    let values = read_f64(df, "val")?.unwrap_or_else(|| vec![None; height]);
    let fys = read_i64(df, "fy")?.unwrap_or_else(|| vec![None; height]);
    let times = read_time(df, "time")?.unwrap_or_else(|| vec![None; height]);

    let mut observations = Vec::with_capacity(height);
    for i in 0..height {
        let ticker = tickers[i]
            .as_deref()
            .ok_or_else(|| PanelError::Parse(format!("missing ticker in row {i}")))?;
        let source_tag = tags[i]
            .clone()
            .ok_or_else(|| PanelError::Parse(format!("missing source_tag in row {i}")))?;
        let fiscal_year = fys[i]
            .map(i32::try_from)
            .transpose()
            .map_err(|e| PanelError::Parse(format!("fiscal year in row {i}: {e}")))?;
        observations.push(Observation {
            ticker: Ticker::new(ticker),
            label: labels[i].clone(),
            source_tag,
            unit: units[i].clone(),
            period_start: parse_date(starts[i].as_deref()),
            period_end: parse_date(ends[i].as_deref()),
            filed: parse_date(filed[i].as_deref()),
            form: forms[i].clone(),
            value: values[i],
            accn: accns[i].clone(),
            fiscal_year,
            fiscal_period: fps[i].clone(),
            frame: frames[i].clone(),
            time_index: times[i],
        });
    }
    debug!(rows = observations.len(), "Loaded observations from table");
    Ok(observations)
}

/// Converts a panel into a wide table.
///
/// Observed-cell masks are not written; the treatment indicator becomes 0 or 1.
pub fn panel_to_df(panel: &Panel) -> Result<DataFrame> {
    let mut names: Vec<&str> = vec![TICKER, TIME, TREATED];
    names.extend(panel.columns().iter().map(String::as_str));
    let mut df = panel.frame().select(names)?;

    let periods: Vec<String> = df
        .column(TIME)?
        .i64()?
        .into_iter()
        .map(|time| time.map(|t| panel.period_label(t)).unwrap_or_default())
        .collect();
    let treated = df.column(TREATED)?.cast(&DataType::Int32)?;
    df.with_column(treated)?;
    df.insert_column(2, Column::new("period".into(), periods))?;
    Ok(df)
}

/// Reads a panel from a wide table.
///
/// Every column other than the key columns is a metric. Cells read back are
/// marked observed when they hold a value. A fractional time value is a
/// [`PanelError::NonIntegerTimeIndex`].
pub fn panel_from_df(df: &DataFrame, period_type: PeriodType) -> Result<Panel> {
    let tickers = required(read_strings(df, "ticker")?, "ticker")?;
    let times = required(read_time(df, "time")?, "time")?;
    let treated = read_i64(df, "boycotted")?;

    let metric_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .filter(|name| !PANEL_KEY_COLUMNS.contains(&name.as_str()))
        .collect();
    let mut metrics = Vec::with_capacity(metric_names.len());
    for name in &metric_names {
        metrics.push(required(read_f64(df, name)?, name)?);
    }

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let ticker = tickers[i]
            .as_deref()
            .ok_or_else(|| PanelError::Parse(format!("missing ticker in row {i}")))?;
        let time = times[i].ok_or_else(|| PanelError::Parse(format!("missing time in row {i}")))?;
        let values: Vec<Option<f64>> = metrics.iter().map(|m| m[i]).collect();
        rows.push(PanelRow {
            ticker: Ticker::new(ticker),
            time,
            treated: treated
                .as_ref()
                .and_then(|flags| flags[i])
                .is_some_and(|flag| flag != 0),
            observed: values.iter().map(Option::is_some).collect(),
            values,
        });
    }
    Panel::from_rows(metric_names, rows, period_type)
}

/// File format of a persisted table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableFormat {
    /// Apache Parquet.
    Parquet,
    /// Comma-separated values with a header row.
    Csv,
}

impl TableFormat {
    /// Format implied by a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => Ok(Self::Parquet),
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Ok(Self::Csv),
            _ => Err(PanelError::InvalidParameter(format!(
                "unsupported table extension: {}",
                path.display()
            ))),
        }
    }
}

/// Writes a table, choosing the format from the path's extension.
pub fn write_table(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path)?;
    match TableFormat::from_path(path)? {
        TableFormat::Parquet => {
            ParquetWriter::new(&mut file).finish(df)?;
        }
        TableFormat::Csv => {
            CsvWriter::new(&mut file).include_header(true).finish(df)?;
        }
    }
    debug!(path = %path.display(), rows = df.height(), "Wrote table");
    Ok(())
}

/// Reads a table, choosing the format from the path's extension.
pub fn read_table(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    let df = match TableFormat::from_path(path)? {
        TableFormat::Parquet => ParquetReader::new(File::open(path)?).finish()?,
        TableFormat::Csv => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
    };
    debug!(path = %path.display(), rows = df.height(), "Read table");
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{Treatment, pivot};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample() -> Vec<Observation> {
        let mut placed = Observation::new(Ticker::new("MCD"), "revenue", "Revenues")
            .with_period(d(2024, 1, 1), d(2024, 3, 31))
            .with_filed(d(2024, 5, 1))
            .with_form("10-Q")
            .with_fiscal(2024, "Q1")
            .with_accn("0000063908-24-000001")
            .with_value(6_169_000_000.0);
        placed.unit = Some("USD".to_string());
        placed.time_index = Some(8097);
        let sparse = Observation {
            ticker: Ticker::new("WEN"),
            source_tag: "Revenues".to_string(),
            ..Default::default()
        };
        vec![placed, sparse]
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("panel-prep-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_observations_table_shape() {
        let df = observations_to_df(&sample()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("end").unwrap().dtype(), &DataType::Date);
        assert_eq!(observations_from_df(&df).unwrap(), sample());
    }

    #[test]
    fn test_observations_require_ticker() {
        let df = DataFrame::new(vec![Column::new("source_tag".into(), vec!["Revenues"])]).unwrap();
        assert!(matches!(
            observations_from_df(&df),
            Err(PanelError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_panel_table_columns() {
        let mut obs = sample();
        obs.truncate(1);
        let panel = pivot(
            &observations_to_df(&obs).unwrap(),
            &["revenue"],
            PeriodType::Quarterly,
            Some(Treatment::new("MCD", 8097)),
        )
        .unwrap();
        let df = panel_to_df(&panel).unwrap();

        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["ticker", "time", "period", "boycotted", "revenue"]);
        let period = df.column("period").unwrap().str().unwrap().get(0);
        assert_eq!(period, Some("2024Q1"));

        let back = panel_from_df(&df, PeriodType::Quarterly).unwrap();
        assert_eq!(back.rows().unwrap(), panel.rows().unwrap());
    }

    #[test]
    fn test_fractional_time_rejected() {
        let df = DataFrame::new(vec![
            Column::new("ticker".into(), vec!["MCD", "MCD"]),
            Column::new("time".into(), vec![8001.0, 8001.5]),
            Column::new("revenue".into(), vec![1.0, 2.0]),
        ])
        .unwrap();
        assert!(matches!(
            panel_from_df(&df, PeriodType::Quarterly),
            Err(PanelError::NonIntegerTimeIndex { .. })
        ));

        let whole = DataFrame::new(vec![
            Column::new("ticker".into(), vec!["MCD", "MCD"]),
            Column::new("time".into(), vec![8001.0, 8002.0]),
            Column::new("revenue".into(), vec![1.0, 2.0]),
        ])
        .unwrap();
        let panel = panel_from_df(&whole, PeriodType::Quarterly).unwrap();
        assert_eq!(panel.times().into_iter().collect::<Vec<_>>(), vec![8001, 8002]);
    }

    #[test]
    fn test_table_format_from_path() {
        assert_eq!(
            TableFormat::from_path(Path::new("panel.parquet")).unwrap(),
            TableFormat::Parquet
        );
        assert_eq!(TableFormat::from_path(Path::new("raw.CSV")).unwrap(), TableFormat::Csv);
        assert!(TableFormat::from_path(Path::new("raw.json")).is_err());
    }

    #[test]
    fn test_write_and_read_files() {
        for name in ["facts.parquet", "facts.csv"] {
            let path = temp_path(name);
            let mut df = observations_to_df(&sample()).unwrap();
            write_table(&mut df, &path).unwrap();
            let back = observations_from_df(&read_table(&path).unwrap()).unwrap();
            std::fs::remove_file(&path).unwrap();

            assert_eq!(back.len(), 2);
            assert_eq!(back[0].period_end, Some(d(2024, 3, 31)));
            assert_eq!(back[0].value, Some(6_169_000_000.0));
            assert_eq!(back[0].time_index, Some(8097));
            assert_eq!(back[1].ticker.as_str(), "WEN");
        }
    }
}
