//! Provider trait for fetching reported concept facts.
//!
//! A [`ConceptProvider`] is the fetch collaborator of the pipeline: it maps
//! tickers to registrant ids and returns one [`ConceptFacts`] payload per
//! (registrant, taxonomy, tag). A definitive "not found" is `Ok(None)`, not an error.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;

use crate::{error::Result, facts::ConceptFacts, types::Ticker};

/// Default XBRL taxonomy for financial statement concepts.
pub const DEFAULT_TAXONOMY: &str = "us-gaap";

/// Source of company-concept facts.
#[async_trait]
pub trait ConceptProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "SEC EDGAR").
    fn name(&self) -> &str;

    /// Map from ticker to zero-padded registrant id.
    async fn ticker_map(&self) -> Result<HashMap<Ticker, String>>;

    /// Fetches the facts one registrant reported under one tag.
    ///
    /// Returns `Ok(None)` when the registrant never reported the tag, or when
    /// transient failures exhausted the retry budget.
    async fn company_concept(
        &self,
        cik: &str,
        taxonomy: &str,
        tag: &str,
    ) -> Result<Option<ConceptFacts>>;
}
