//! Dominant-tag selection with fallback.
//!
//! Per (entity, metric), the tag with the most rows is dominant (ties broken by
//! tag name). Calendar years in which the dominant tag has no rows are gaps; a run
//! of at least `min_gap` consecutive gap years is filled from the second-ranked tag,
//! and only for those years.

use panel_core::Result;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::dedup::sort_canonical;

const YEAR: &str = "__year";

/// Rows and period-end years of one tag within one (entity, metric).
#[derive(Debug, Default)]
struct TagTally {
    rows: usize,
    years: BTreeSet<i32>,
}

/// Ranks tags by row count (descending), then name (ascending).
#[must_use]
pub fn rank_tags(counts: &BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = counts
        .iter()
        .map(|(tag, n)| (tag.clone(), *n))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// Years in `first..=last` absent from `present`, kept only when they belong to
/// a run of at least `min_gap` consecutive absent years.
#[must_use]
pub fn gap_years(present: &BTreeSet<i32>, first: i32, last: i32, min_gap: usize) -> BTreeSet<i32> {
    let mut gaps = BTreeSet::new();
    let mut run: Vec<i32> = Vec::new();
    for year in first..=last {
        if present.contains(&year) {
            if run.len() >= min_gap {
                gaps.extend(run.iter().copied());
            }
            run.clear();
        } else {
            run.push(year);
        }
    }
    if run.len() >= min_gap {
        gaps.extend(run);
    }
    gaps
}

type GroupKey = (String, Option<String>);

/// Row count and years per tag, grouped by (entity, metric).
fn tally(observations: &DataFrame) -> Result<BTreeMap<GroupKey, BTreeMap<String, TagTally>>> {
    let counts = observations
        .clone()
        .lazy()
        .group_by([col("ticker"), col("label"), col("source_tag"), col(YEAR)])
        .agg([len().cast(DataType::Int64).alias("rows")])
        .collect()?;

    let tickers = counts.column("ticker")?.str()?;
    let labels = counts.column("label")?.str()?;
    let tags = counts.column("source_tag")?.str()?;
    let years = counts.column(YEAR)?.i32()?;
    let rows = counts.column("rows")?.i64()?;

    let mut groups: BTreeMap<GroupKey, BTreeMap<String, TagTally>> = BTreeMap::new();
    for i in 0..counts.height() {
        let (Some(ticker), Some(tag)) = (tickers.get(i), tags.get(i)) else {
            continue;
        };
        let entry = groups
            .entry((ticker.to_string(), labels.get(i).map(str::to_string)))
            .or_default()
            .entry(tag.to_string())
            .or_default();
        entry.rows += rows.get(i).and_then(|n| usize::try_from(n).ok()).unwrap_or(0);
        if let Some(year) = years.get(i) {
            entry.years.insert(year);
        }
    }
    Ok(groups)
}

/// Rows of `observations` whose key columns match a row of `keys`.
fn matching(observations: &DataFrame, keys: DataFrame, on: &[&str]) -> Result<DataFrame> {
    let on: Vec<Expr> = on.iter().map(|name| col(*name)).collect();
    Ok(observations
        .clone()
        .lazy()
        .join(
            keys.lazy(),
            on.clone(),
            on,
            JoinArgs {
                join_nulls: true,
                ..JoinArgs::new(JoinType::Inner)
            },
        )
        .collect()?)
}

/// Selects one tag's rows per (entity, metric), filling sustained gaps from the runner-up.
pub fn select_dominant_with_fallback(observations: &DataFrame, min_gap: usize) -> Result<DataFrame> {
    let with_year = observations
        .clone()
        .lazy()
        .with_column(col("end").dt().year().alias(YEAR))
        .collect()?;

    let mut dominant_keys: (Vec<String>, Vec<Option<String>>, Vec<String>) = Default::default();
    let mut fill_keys: (Vec<String>, Vec<Option<String>>, Vec<String>, Vec<i32>) = Default::default();
    for ((ticker, label), tags) in tally(&with_year)? {
        let counts: BTreeMap<String, usize> = tags.iter().map(|(tag, t)| (tag.clone(), t.rows)).collect();
        let ranked = rank_tags(&counts);
        let Some((dominant, _)) = ranked.first() else {
            continue;
        };
        let secondary = ranked.get(1).map(|(tag, _)| tag.as_str());

        let all_years: BTreeSet<i32> = tags.values().flat_map(|t| t.years.iter().copied()).collect();
        let gaps = match (all_years.first(), all_years.last(), secondary) {
            (Some(&first), Some(&last), Some(_)) => {
                let present = tags.get(dominant).map(|t| t.years.clone()).unwrap_or_default();
                gap_years(&present, first, last, min_gap)
            }
            _ => BTreeSet::new(),
        };

        if !gaps.is_empty() {
            info!(
                ticker = %ticker,
                label = label.as_deref().unwrap_or_default(),
                dominant = %dominant,
                fallback = secondary.unwrap_or_default(),
                years = ?gaps,
                "Filling dominant-tag gap from secondary tag"
            );
        } else if ranked.len() > 1 {
            debug!(
                ticker = %ticker,
                label = label.as_deref().unwrap_or_default(),
                dominant = %dominant,
                competing = ranked.len() - 1,
                "Dropped competing tags"
            );
        }

        if let Some(secondary) = secondary {
            for year in &gaps {
                fill_keys.0.push(ticker.clone());
                fill_keys.1.push(label.clone());
                fill_keys.2.push(secondary.to_string());
                fill_keys.3.push(*year);
            }
        }
        dominant_keys.0.push(ticker);
        dominant_keys.1.push(label);
        dominant_keys.2.push(dominant.clone());
    }

    let dominant_keys = DataFrame::new(vec![
        Column::new("ticker".into(), dominant_keys.0),
        Column::new("label".into(), dominant_keys.1),
        Column::new("source_tag".into(), dominant_keys.2),
    ])?;
    let fill_keys = DataFrame::new(vec![
        Column::new("ticker".into(), fill_keys.0),
        Column::new("label".into(), fill_keys.1),
        Column::new("source_tag".into(), fill_keys.2),
        Column::new(YEAR.into(), fill_keys.3),
    ])?;

    let mut selected = matching(&with_year, dominant_keys, &["ticker", "label", "source_tag"])?;
    let filled = matching(&with_year, fill_keys, &["ticker", "label", "source_tag", YEAR])?;
    selected.vstack_mut(&filled)?;

    Ok(sort_canonical(selected.lazy().drop([YEAR])).collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{observations_from_df, observations_to_df};
    use chrono::NaiveDate;
    use panel_core::{Observation, Ticker};

    fn row(ticker: &str, tag: &str, year: i32, quarter_end_month: u32, value: f64) -> Observation {
        let end = NaiveDate::from_ymd_opt(year, quarter_end_month, 28).unwrap();
        let start = end - chrono::Duration::days(89);
        Observation::new(Ticker::new(ticker), "revenue", tag)
            .with_period(start, end)
            .with_value(value)
    }

    fn select(rows: Vec<Observation>, min_gap: usize) -> Vec<Observation> {
        let df = observations_to_df(&rows).unwrap();
        observations_from_df(&select_dominant_with_fallback(&df, min_gap).unwrap()).unwrap()
    }

    #[test]
    fn test_rank_tags_ties_alphabetical() {
        let counts: BTreeMap<String, usize> = [("B", 1), ("A", 1), ("C", 2)]
            .into_iter()
            .map(|(tag, n)| (tag.to_string(), n))
            .collect();
        let ranked = rank_tags(&counts);
        assert_eq!(ranked[0], ("C".to_string(), 2));
        assert_eq!(ranked[1], ("A".to_string(), 1));
        assert_eq!(ranked[2], ("B".to_string(), 1));
    }

    #[test]
    fn test_gap_years_respects_min_gap() {
        let present: BTreeSet<i32> = [2015, 2016, 2018, 2021].into_iter().collect();
        let gaps = gap_years(&present, 2015, 2021, 2);
        assert_eq!(gaps, [2019, 2020].into_iter().collect());

        let gaps = gap_years(&present, 2015, 2021, 1);
        assert_eq!(gaps, [2017, 2019, 2020].into_iter().collect());
    }

    fn discontinued() -> Vec<Observation> {
        let mut rows = Vec::new();
        for year in 2015..=2019 {
            rows.push(row("MCD", "A", year, 3, f64::from(year)));
        }
        rows.push(row("MCD", "B", 2020, 3, 2020.5));
        rows.push(row("MCD", "B", 2021, 3, 2021.5));
        // B also reported in a year the dominant tag covers: never blended
        rows.push(row("MCD", "B", 2019, 3, -1.0));
        rows
    }

    #[test]
    fn test_discontinued_tag_filled_from_secondary() {
        let selected = select(discontinued(), 2);
        assert_eq!(selected.len(), 7);

        let from_a: Vec<i32> = selected
            .iter()
            .filter(|o| o.source_tag == "A")
            .filter_map(Observation::year)
            .collect();
        assert_eq!(from_a, vec![2015, 2016, 2017, 2018, 2019]);

        let from_b: Vec<i32> = selected
            .iter()
            .filter(|o| o.source_tag == "B")
            .filter_map(Observation::year)
            .collect();
        assert_eq!(from_b, vec![2020, 2021]);
        assert!(selected.iter().all(|o| o.value != Some(-1.0)));
    }

    #[test]
    fn test_selection_is_order_independent() {
        let mut rows = discontinued();
        rows.push(row("WEN", "C", 2020, 3, 1.0));
        rows.push(row("WEN", "D", 2020, 6, 2.0));
        let mut reversed = rows.clone();
        reversed.reverse();

        let forward = select(rows, 2);
        let backward = select(reversed, 2);
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 8);
        // One-row tie between C and D: the alphabetically first tag wins
        assert!(forward.iter().any(|o| o.source_tag == "C"));
        assert!(forward.iter().all(|o| o.source_tag != "D"));
    }

    #[test]
    fn test_short_gap_left_unfilled() {
        let mut rows = Vec::new();
        for year in [2015, 2016, 2018, 2019] {
            rows.push(row("MCD", "A", year, 3, 1.0));
        }
        rows.push(row("MCD", "B", 2017, 3, 2.0));

        let selected = select(rows, 2);
        assert!(selected.iter().all(|o| o.source_tag == "A"));
        assert_eq!(selected.len(), 4);
    }

    #[test]
    fn test_entities_are_independent() {
        let rows = vec![
            row("MCD", "A", 2020, 3, 1.0),
            row("MCD", "A", 2020, 6, 1.0),
            row("WEN", "B", 2020, 3, 1.0),
        ];
        assert_eq!(select(rows, 2).len(), 3);
    }
}
