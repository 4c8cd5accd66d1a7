//! Fact normalization and labeling.
//!
//! [`normalize_concept`] turns one fetched payload into typed [`Observation`]s;
//! [`attach_labels`] assigns each observation its metric label from the tag-group
//! table.

use chrono::NaiveDate;
use panel_core::{ConceptFacts, Observation, Result, TagGroups, Ticker};
use tracing::{debug, warn};

/// Units tried first, in order, when a payload reports several.
pub const PREFERRED_UNITS: [&str; 4] = ["USD", "USD/shares", "shares", "pure"];

/// Picks the unit whose records are normalized.
///
/// The first present of [`PREFERRED_UNITS`], otherwise the lexicographically first unit.
#[must_use]
pub fn select_unit(facts: &ConceptFacts) -> Option<&str> {
    PREFERRED_UNITS
        .iter()
        .copied()
        .find(|unit| facts.units.contains_key(*unit))
        .or_else(|| facts.units.keys().next().map(String::as_str))
}

pub(crate) fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
}

/// Converts one (entity, tag) payload into observations.
///
/// Absent fields become `None`. Unparsable dates become `None`. Records whose end
/// precedes their start are dropped. The result is sorted by period end, then
/// fiscal year, with missing values last. Labels are not assigned here.
#[must_use]
pub fn normalize_concept(facts: &ConceptFacts, ticker: &Ticker, source_tag: &str) -> Vec<Observation> {
    let Some(unit) = select_unit(facts) else {
        return Vec::new();
    };
    let records = facts.units.get(unit).map(Vec::as_slice).unwrap_or_default();

    let mut observations: Vec<Observation> = records
        .iter()
        .map(|record| Observation {
            ticker: ticker.clone(),
            label: None,
            source_tag: source_tag.to_string(),
            unit: Some(unit.to_string()),
            period_start: parse_date(record.start.as_deref()),
            period_end: parse_date(record.end.as_deref()),
            filed: parse_date(record.filed.as_deref()),
            form: record.form.as_deref().map(|form| form.trim().to_string()),
            value: record.val,
            accn: record.accn.clone(),
            fiscal_year: record.fy,
            fiscal_period: record.fp.clone(),
            frame: record.frame.clone(),
            time_index: None,
        })
        .collect();

    let before = observations.len();
    observations.retain(Observation::has_ordered_period);
    if observations.len() < before {
        warn!(
            ticker = %ticker,
            tag = source_tag,
            dropped = before - observations.len(),
            "Dropped records with period end before period start"
        );
    }

    // Missing period ends and fiscal years sort last
    observations.sort_by_key(|obs| {
        (
            obs.period_end.is_none(),
            obs.period_end,
            obs.fiscal_year.is_none(),
            obs.fiscal_year,
        )
    });
    debug!(ticker = %ticker, tag = source_tag, unit, rows = observations.len(), "Normalized concept");
    observations
}

/// Removes observations whose period end precedes their period start.
pub fn drop_unordered_periods(observations: &mut Vec<Observation>) -> usize {
    let before = observations.len();
    observations.retain(Observation::has_ordered_period);
    let dropped = before - observations.len();
    if dropped > 0 {
        warn!(dropped, "Dropped observations with period end before period start");
    }
    dropped
}

/// Labels observations from the tag-group table.
///
/// Observations whose tag belongs to no group are removed. An existing label is
/// overwritten. Fails if a tag belongs to two groups.
pub fn attach_labels(observations: Vec<Observation>, groups: &TagGroups) -> Result<Vec<Observation>> {
    groups.validate()?;
    let tag_to_label = groups.tag_to_label();

    let total = observations.len();
    let labeled: Vec<Observation> = observations
        .into_iter()
        .filter_map(|mut obs| {
            let label = tag_to_label.get(obs.source_tag.as_str())?;
            obs.label = Some((*label).to_string());
            Some(obs)
        })
        .collect();

    if labeled.len() < total {
        debug!(
            unlabeled = total - labeled.len(),
            "Dropped observations with tags outside every tag group"
        );
    }
    Ok(labeled)
}
