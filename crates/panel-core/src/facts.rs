//! Wire shape of one (entity, concept tag) payload from the regulator.
//!
//! Every field is optional: absent fields deserialize to `None` rather than
//! failing the whole payload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Facts reported by one entity under one concept tag, keyed by unit of measure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptFacts {
    /// Registrant id.
    #[serde(default)]
    pub cik: Option<u64>,
    /// Taxonomy of the tag (e.g. "us-gaap").
    #[serde(default)]
    pub taxonomy: Option<String>,
    /// Concept tag.
    #[serde(default)]
    pub tag: Option<String>,
    /// Human-readable label of the tag.
    #[serde(default)]
    pub label: Option<String>,
    /// Registrant name.
    #[serde(default)]
    pub entity_name: Option<String>,
    /// Records per unit of measure.
    #[serde(default)]
    pub units: BTreeMap<String, Vec<FactRecord>>,
}

/// One reported fact.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    /// Period start (`YYYY-MM-DD`), absent for instant facts.
    #[serde(default)]
    pub start: Option<String>,
    /// Period end (`YYYY-MM-DD`).
    #[serde(default)]
    pub end: Option<String>,
    /// Reported value.
    #[serde(default)]
    pub val: Option<f64>,
    /// Accession number of the filing.
    #[serde(default)]
    pub accn: Option<String>,
    /// Fiscal year.
    #[serde(default)]
    pub fy: Option<i32>,
    /// Fiscal period marker.
    #[serde(default)]
    pub fp: Option<String>,
    /// Filing form.
    #[serde(default)]
    pub form: Option<String>,
    /// Filing date (`YYYY-MM-DD`).
    #[serde(default)]
    pub filed: Option<String>,
    /// Calendar frame.
    #[serde(default)]
    pub frame: Option<String>,
}

impl ConceptFacts {
    /// Returns true if no unit holds a record with a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self
            .units
            .values()
            .flatten()
            .any(|record| record.val.is_some())
    }

    /// Total number of records across units.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.units.values().map(Vec::len).sum()
    }
}
