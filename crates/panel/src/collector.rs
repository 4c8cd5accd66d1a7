//! Fact collection over tickers and concept tags, with optional caching.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use panel_core::{
    ConceptFacts, ConceptProvider, DEFAULT_TAXONOMY, FactCache, Observation, Result, TagGroups,
    Ticker,
};
use panel_prep::{attach_labels, normalize_concept};

/// Walks (ticker x tag), consulting the cache before the provider.
///
/// # Example
///
/// ```rust,ignore
/// use panel::{EdgarProvider, FactCollector, TagGroups, Ticker};
/// use std::sync::Arc;
///
/// let provider = Arc::new(EdgarProvider::new("MyApp/1.0 (contact@example.com)")?);
/// let collector = FactCollector::new(provider);
///
/// let tickers = vec![Ticker::new("MCD"), Ticker::new("WEN")];
/// let facts = collector.collect_labeled(&tickers, &TagGroups::default()).await?;
/// ```
pub struct FactCollector {
    provider: Arc<dyn ConceptProvider>,
    cache: Option<Arc<dyn FactCache>>,
    taxonomy: String,
}

impl std::fmt::Debug for FactCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactCollector")
            .field("provider", &self.provider.name())
            .field("cache", &self.cache.as_ref().map(|_| "configured"))
            .field("taxonomy", &self.taxonomy)
            .finish()
    }
}

impl FactCollector {
    /// Create a collector over one provider, without a cache.
    #[must_use]
    pub fn new(provider: Arc<dyn ConceptProvider>) -> Self {
        Self {
            provider,
            cache: None,
            taxonomy: DEFAULT_TAXONOMY.to_string(),
        }
    }

    /// Set the cache for this collector.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn FactCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the taxonomy concepts are fetched from.
    #[must_use]
    pub fn with_taxonomy(mut self, taxonomy: impl Into<String>) -> Self {
        self.taxonomy = taxonomy.into();
        self
    }

    /// Fetch one payload, from the cache when present.
    ///
    /// Fetched payloads are stored in the cache; a failing cache is logged and bypassed.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn fetch_concept(&self, cik: &str, tag: &str) -> Result<Option<ConceptFacts>> {
        let provider = self.provider.name();

        if let Some(cache) = &self.cache {
            match cache.get_concept(provider, cik, tag).await {
                Ok(Some(cached)) => {
                    debug!(cik, tag, "Cache hit for concept");
                    return Ok(Some(cached));
                }
                Ok(None) => {}
                Err(e) => warn!(cik, tag, error = %e, "Cache lookup failed"),
            }
        }

        let fetched = self
            .provider
            .company_concept(cik, &self.taxonomy, tag)
            .await?;

        if let (Some(cache), Some(facts)) = (&self.cache, &fetched) {
            if let Err(e) = cache.put_concept(provider, cik, tag, facts).await {
                warn!(cik, tag, error = %e, "Failed to cache concept");
            }
        }
        Ok(fetched)
    }

    /// Fetch and normalize one (ticker, tag) pair.
    ///
    /// Provider failures are logged and yield no rows.
    async fn collect_one(&self, ticker: &Ticker, cik: &str, tag: &str) -> Vec<Observation> {
        match self.fetch_concept(cik, tag).await {
            Ok(Some(facts)) if !facts.is_empty() => normalize_concept(&facts, ticker, tag),
            Ok(_) => {
                debug!(ticker = %ticker, tag, "No data for tag");
                Vec::new()
            }
            Err(e) => {
                warn!(ticker = %ticker, tag, error = %e, "Fetch failed, skipping tag");
                Vec::new()
            }
        }
    }

    /// Registrant ids of the tickers the provider knows; unknown tickers are logged.
    async fn resolve_ciks<'a>(&self, tickers: &'a [Ticker]) -> Result<Vec<(&'a Ticker, String)>> {
        let map: HashMap<Ticker, String> = self.provider.ticker_map().await?;
        let mut resolved = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            match map.get(ticker) {
                Some(cik) => resolved.push((ticker, cik.clone())),
                None => warn!(ticker = %ticker, "Ticker not found, skipping"),
            }
        }
        Ok(resolved)
    }

    /// Fetch every tag for every ticker into the raw facts table.
    ///
    /// Rows carry `ticker` and `source_tag`; labels are not attached.
    pub async fn collect_concepts_long(
        &self,
        tickers: &[Ticker],
        tags: &[String],
    ) -> Result<Vec<Observation>> {
        let mut rows = Vec::new();
        for (ticker, cik) in self.resolve_ciks(tickers).await? {
            for tag in tags {
                rows.extend(self.collect_one(ticker, &cik, tag).await);
            }
        }
        info!(
            tickers = tickers.len(),
            tags = tags.len(),
            rows = rows.len(),
            "Collected concept facts"
        );
        Ok(rows)
    }

    /// Fetch every tag of every group and attach metric labels.
    pub async fn collect_labeled(
        &self,
        tickers: &[Ticker],
        groups: &TagGroups,
    ) -> Result<Vec<Observation>> {
        groups.validate()?;
        let rows = self.collect_concepts_long(tickers, &groups.all_tags()).await?;
        attach_labels(rows, groups)
    }

    /// Per group, fetch tags in priority order and stop at the first with data.
    ///
    /// A tag has data when at least one normalized row carries a value; a tag
    /// whose rows are all empty is skipped and contributes no rows.
    pub async fn collect_first_available(
        &self,
        tickers: &[Ticker],
        groups: &TagGroups,
    ) -> Result<Vec<Observation>> {
        groups.validate()?;
        let mut rows = Vec::new();
        for (ticker, cik) in self.resolve_ciks(tickers).await? {
            for group in groups.iter() {
                let mut found = false;
                for tag in &group.tags {
                    let observations = self.collect_one(ticker, &cik, tag).await;
                    if observations.iter().any(|o| o.value.is_some()) {
                        debug!(ticker = %ticker, label = %group.label, tag = %tag, "Resolved concept");
                        rows.extend(observations);
                        found = true;
                        break;
                    }
                    if !observations.is_empty() {
                        debug!(ticker = %ticker, tag = %tag, rows = observations.len(), "Tag has no values");
                    }
                }
                if !found {
                    info!(ticker = %ticker, label = %group.label, "No tag reported for metric");
                }
            }
        }
        attach_labels(rows, groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use panel_cache::InMemoryCache;
    use panel_core::{FactRecord, PanelError};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct MockProvider {
        payloads: HashMap<(String, String), ConceptFacts>,
        calls: Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn with_payload(mut self, cik: &str, tag: &str, values: &[f64]) -> Self {
            let records = values
                .iter()
                .enumerate()
                .map(|(i, v)| FactRecord {
                    start: Some(format!("2023-{:02}-01", i * 3 + 1)),
                    end: Some(format!("2023-{:02}-28", i * 3 + 3)),
                    val: Some(*v),
                    form: Some("10-Q".to_string()),
                    ..Default::default()
                })
                .collect();
            let mut facts = ConceptFacts::default();
            facts.units.insert("USD".to_string(), records);
            self.payloads.insert((cik.to_string(), tag.to_string()), facts);
            self
        }

        fn with_units(mut self, cik: &str, tag: &str, units: &[(&str, &[Option<f64>])]) -> Self {
            let mut facts = ConceptFacts::default();
            for (unit, values) in units {
                let records = values
                    .iter()
                    .map(|v| FactRecord {
                        start: Some("2023-01-01".to_string()),
                        end: Some("2023-03-31".to_string()),
                        val: *v,
                        form: Some("10-Q".to_string()),
                        ..Default::default()
                    })
                    .collect();
                facts.units.insert((*unit).to_string(), records);
            }
            self.payloads.insert((cik.to_string(), tag.to_string()), facts);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConceptProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn ticker_map(&self) -> Result<HashMap<Ticker, String>> {
            Ok(HashMap::from([
                (Ticker::new("MCD"), "0000063908".to_string()),
                (Ticker::new("WEN"), "0000030697".to_string()),
            ]))
        }

        async fn company_concept(
            &self,
            cik: &str,
            _taxonomy: &str,
            tag: &str,
        ) -> Result<Option<ConceptFacts>> {
            self.calls.lock().unwrap().push(format!("{cik}/{tag}"));
            if tag == "Broken" {
                return Err(PanelError::Network("HTTP 403".to_string()));
            }
            Ok(self
                .payloads
                .get(&(cik.to_string(), tag.to_string()))
                .cloned())
        }
    }

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_collect_long_skips_unknown_tickers_and_empty_tags() {
        let provider = Arc::new(
            MockProvider::default()
                .with_payload("0000063908", "Revenues", &[1.0, 2.0])
                .with_payload("0000030697", "Revenues", &[3.0]),
        );
        let collector = FactCollector::new(provider.clone());

        let tickers = vec![Ticker::new("MCD"), Ticker::new("NOPE"), Ticker::new("WEN")];
        let rows = collector
            .collect_concepts_long(&tickers, &tags(&["Revenues", "GrossProfit", "Broken"]))
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|o| o.source_tag == "Revenues" && o.label.is_none()));
        assert_eq!(rows.iter().filter(|o| o.ticker.as_str() == "MCD").count(), 2);
        assert_eq!(provider.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_cache_consulted_before_provider() {
        let provider = Arc::new(MockProvider::default().with_payload("0000063908", "Revenues", &[1.0]));
        let cache = Arc::new(InMemoryCache::new());
        let collector = FactCollector::new(provider.clone()).with_cache(cache.clone());

        let first = collector.fetch_concept("0000063908", "Revenues").await.unwrap();
        let second = collector.fetch_concept("0000063908", "Revenues").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls().len(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_collect_labeled() {
        let provider = Arc::new(
            MockProvider::default()
                .with_payload("0000063908", "Revenues", &[1.0])
                .with_payload("0000063908", "GrossProfit", &[0.5]),
        );
        let collector = FactCollector::new(provider);
        let rows = collector
            .collect_labeled(&[Ticker::new("MCD")], &TagGroups::default())
            .await
            .unwrap();

        let mut labels: Vec<&str> = rows.iter().filter_map(|o| o.label.as_deref()).collect();
        labels.sort_unstable();
        assert_eq!(labels, vec!["gross_profit", "revenue"]);
    }

    #[tokio::test]
    async fn test_first_available_stops_at_first_tag_with_data() {
        let provider = Arc::new(
            MockProvider::default()
                .with_payload("0000063908", "SalesRevenueNet", &[1.0, 2.0])
                .with_payload("0000063908", "RevenueFromContractWithCustomerExcludingAssessedTax", &[3.0]),
        );
        let groups = TagGroups::new(vec![panel_core::TagGroup::new(
            "revenue",
            &[
                "Revenues",
                "SalesRevenueNet",
                "RevenueFromContractWithCustomerExcludingAssessedTax",
            ],
        )]);
        let collector = FactCollector::new(provider.clone());
        let rows = collector
            .collect_first_available(&[Ticker::new("MCD")], &groups)
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|o| o.source_tag == "SalesRevenueNet"));
        assert_eq!(
            provider.calls(),
            vec!["0000063908/Revenues", "0000063908/SalesRevenueNet"]
        );
    }

    #[tokio::test]
    async fn test_first_available_skips_tag_without_values() {
        let provider = Arc::new(
            MockProvider::default()
                .with_units("0000063908", "Revenues", &[("USD", &[None][..]), ("EUR", &[Some(5.0)][..])])
                .with_units("0000063908", "SalesRevenueNet", &[("USD", &[Some(7.0)][..])]),
        );
        let groups = TagGroups::new(vec![panel_core::TagGroup::new(
            "revenue",
            &["Revenues", "SalesRevenueNet"],
        )]);
        let collector = FactCollector::new(provider.clone());
        let rows = collector
            .collect_first_available(&[Ticker::new("MCD")], &groups)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_tag, "SalesRevenueNet");
        assert_eq!(rows[0].value, Some(7.0));
        assert_eq!(rows[0].label.as_deref(), Some("revenue"));
        assert_eq!(
            provider.calls(),
            vec!["0000063908/Revenues", "0000063908/SalesRevenueNet"]
        );
    }
}
