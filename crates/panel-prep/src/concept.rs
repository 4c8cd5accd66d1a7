//! Concept resolution: which source tag an entity actually reports a metric under.

use panel_core::{Observation, TagGroups, Ticker};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// Returns the first tag, in the given priority order, under which `ticker`
/// reported at least one non-empty value.
#[must_use]
pub fn resolve_concept<'a>(
    observations: &[Observation],
    ticker: &Ticker,
    tags: &'a [String],
) -> Option<&'a str> {
    let reported: HashSet<&str> = observations
        .iter()
        .filter(|obs| &obs.ticker == ticker && obs.value.is_some())
        .map(|obs| obs.source_tag.as_str())
        .collect();
    tags.iter()
        .find(|tag| reported.contains(tag.as_str()))
        .map(String::as_str)
}

/// Outcome of resolving one metric for one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConceptResolution {
    /// Entity.
    pub ticker: Ticker,
    /// Metric label.
    pub label: String,
    /// First tag with data, if any.
    pub tag: Option<String>,
    /// Number of the group's tags with at least one value.
    pub tags_with_data: usize,
}

/// Resolution of every configured metric for every entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConceptCoverage {
    resolutions: Vec<ConceptResolution>,
}

impl ConceptCoverage {
    /// All resolutions, ordered by entity then tag-group order.
    #[must_use]
    pub fn resolutions(&self) -> &[ConceptResolution] {
        &self.resolutions
    }

    /// The tag resolved for an entity and metric.
    #[must_use]
    pub fn resolved_tag(&self, ticker: &Ticker, label: &str) -> Option<&str> {
        self.resolutions
            .iter()
            .find(|r| &r.ticker == ticker && r.label == label)
            .and_then(|r| r.tag.as_deref())
    }

    /// Entity and metric pairs with no reported data under any tag.
    pub fn missing(&self) -> impl Iterator<Item = &ConceptResolution> {
        self.resolutions.iter().filter(|r| r.tag.is_none())
    }

    /// Entity and metric pairs reported under more than one tag.
    pub fn contested(&self) -> impl Iterator<Item = &ConceptResolution> {
        self.resolutions.iter().filter(|r| r.tags_with_data > 1)
    }
}

/// Resolves every tag group for every entity present in `observations`.
///
/// A metric with no data for an entity is logged, not an error.
#[must_use]
pub fn concept_coverage(observations: &[Observation], groups: &TagGroups) -> ConceptCoverage {
    let tickers: BTreeSet<&Ticker> = observations.iter().map(|obs| &obs.ticker).collect();
    let reported: HashSet<(&Ticker, &str)> = observations
        .iter()
        .filter(|obs| obs.value.is_some())
        .map(|obs| (&obs.ticker, obs.source_tag.as_str()))
        .collect();

    let mut resolutions = Vec::new();
    for ticker in tickers {
        for group in groups.iter() {
            let with_data: Vec<&String> = group
                .tags
                .iter()
                .filter(|tag| reported.contains(&(ticker, tag.as_str())))
                .collect();
            let tag = with_data.first().map(|t| (*t).clone());
            if tag.is_none() {
                info!(ticker = %ticker, label = %group.label, "No tag reported for metric");
            }
            resolutions.push(ConceptResolution {
                ticker: ticker.clone(),
                label: group.label.clone(),
                tag,
                tags_with_data: with_data.len(),
            });
        }
    }

    debug!(
        resolutions = resolutions.len(),
        missing = resolutions.iter().filter(|r| r.tag.is_none()).count(),
        "Resolved concepts"
    );
    ConceptCoverage { resolutions }
}

/// Keeps, per (entity, metric), only rows of the resolved tag.
#[must_use]
pub fn restrict_to_resolved(
    observations: Vec<Observation>,
    coverage: &ConceptCoverage,
) -> Vec<Observation> {
    observations
        .into_iter()
        .filter(|obs| {
            obs.label
                .as_deref()
                .and_then(|label| coverage.resolved_tag(&obs.ticker, label))
                .is_some_and(|tag| tag == obs.source_tag)
        })
        .collect()
}
