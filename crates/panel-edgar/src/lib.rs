#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/panel/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SEC EDGAR client for company-concept facts.
//!
//! This crate provides access to SEC EDGAR XBRL data:
//!
//! - CIK (Central Index Key) lookup from ticker symbols
//! - Company-concept facts (one taxonomy tag for one registrant)
//! - Throttling between requests and bounded exponential-backoff retries
//!
//! # Example
//!
//! ```no_run
//! use panel_edgar::EdgarProvider;
//! use panel_core::{ConceptProvider, DEFAULT_TAXONOMY};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = EdgarProvider::new("MyApp/1.0 (contact@example.com)")?;
//!
//!     let cik = provider.get_cik("MCD").await?;
//!     if let Some(facts) = provider.company_concept(&cik, DEFAULT_TAXONOMY, "Revenues").await? {
//!         println!("{} records", facts.record_count());
//!     }
//!
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use panel_core::{ConceptFacts, ConceptProvider, FetchConfig, PanelError, Result, Ticker};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// SEC EDGAR API base URL
const EDGAR_BASE_URL: &str = "https://data.sec.gov";

/// SEC company tickers URL
const COMPANY_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// Rate limiter enforcing a minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Instant::now() - min_interval,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// How a response status is handled by the retry loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StatusClass {
    Success,
    NotFound,
    Transient,
    Fatal,
}

fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::NOT_FOUND {
        StatusClass::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        StatusClass::Transient
    } else {
        StatusClass::Fatal
    }
}

/// SEC EDGAR company-concept client.
///
/// Requests are throttled to at least [`FetchConfig::min_interval_ms`] apart.
/// Transient failures (timeouts, 429, 5xx) are retried with exponential backoff;
/// a 404 or an exhausted retry budget yields `Ok(None)`.
#[derive(Debug)]
pub struct EdgarProvider {
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    config: FetchConfig,
    base_url: String,
    tickers_url: String,
    tickers: OnceCell<HashMap<Ticker, String>>,
}

impl EdgarProvider {
    /// Create a new EDGAR provider with the specified user agent.
    ///
    /// The SEC requires identifying user agent headers. Format should be:
    /// "AppName/Version (contact@email.com)"
    ///
    /// # Example
    /// ```
    /// use panel_edgar::EdgarProvider;
    ///
    /// let provider = EdgarProvider::new("MyApp/1.0 (contact@example.com)").unwrap();
    /// ```
    pub fn new(user_agent: &str) -> Result<Self> {
        Self::with_config(FetchConfig::new(user_agent))
    }

    /// Create a provider from a full fetch configuration.
    pub fn with_config(config: FetchConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PanelError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a new EDGAR provider with a custom HTTP client.
    ///
    /// # Example
    /// ```
    /// use panel_core::FetchConfig;
    /// use panel_edgar::EdgarProvider;
    /// use std::time::Duration;
    ///
    /// let client = reqwest::Client::builder()
    ///     .timeout(Duration::from_secs(60))
    ///     .user_agent("MyApp/1.0 (contact@example.com)")
    ///     .build()
    ///     .unwrap();
    ///
    /// let provider = EdgarProvider::with_client(client, FetchConfig::new("MyApp/1.0 (contact@example.com)"));
    /// ```
    pub fn with_client(client: reqwest::Client, config: FetchConfig) -> Self {
        Self {
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(config.min_interval()))),
            config,
            base_url: EDGAR_BASE_URL.to_string(),
            tickers_url: COMPANY_TICKERS_URL.to_string(),
            tickers: OnceCell::new(),
        }
    }

    /// Overrides the API and ticker-map endpoints (mirrors, proxies).
    #[must_use]
    pub fn with_endpoints(mut self, base_url: impl Into<String>, tickers_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self.tickers_url = tickers_url.into();
        self
    }

    /// Returns the fetch configuration.
    pub const fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Look up a company's CIK number from its ticker symbol.
    ///
    /// # Returns
    /// The company's CIK number as a zero-padded 10-digit string
    pub async fn get_cik(&self, ticker: &str) -> Result<String> {
        if ticker.trim().is_empty() {
            return Err(PanelError::InvalidParameter("Empty ticker".to_string()));
        }
        let ticker = Ticker::new(ticker);
        let map = self.load_tickers().await?;
        map.get(&ticker)
            .cloned()
            .ok_or_else(|| PanelError::TickerNotFound(ticker.to_string()))
    }

    fn concept_url(&self, cik: &str, taxonomy: &str, tag: &str) -> String {
        format!(
            "{}/api/xbrl/companyconcept/CIK{}/{}/{}.json",
            self.base_url,
            pad_cik(cik),
            taxonomy,
            tag
        )
    }

    async fn load_tickers(&self) -> Result<&HashMap<Ticker, String>> {
        self.tickers
            .get_or_try_init(|| async {
                self.rate_limiter.lock().await.wait().await;

                debug!("Fetching company tickers from SEC");
                let response = self
                    .client
                    .get(&self.tickers_url)
                    .send()
                    .await
                    .map_err(|e| PanelError::Network(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(PanelError::Network(format!(
                        "Failed to fetch company tickers: HTTP {}",
                        response.status()
                    )));
                }

                let data: HashMap<String, CompanyTickerInfo> = response.json().await.map_err(|e| {
                    PanelError::Parse(format!("Failed to parse company tickers: {}", e))
                })?;
                let map = build_ticker_map(data.into_values());
                debug!(count = map.len(), "Loaded ticker map");
                Ok(map)
            })
            .await
    }
}

#[async_trait]
impl ConceptProvider for EdgarProvider {
    fn name(&self) -> &str {
        "SEC EDGAR"
    }

    async fn ticker_map(&self) -> Result<HashMap<Ticker, String>> {
        Ok(self.load_tickers().await?.clone())
    }

    async fn company_concept(
        &self,
        cik: &str,
        taxonomy: &str,
        tag: &str,
    ) -> Result<Option<ConceptFacts>> {
        let url = self.concept_url(cik, taxonomy, tag);
        // Clients built via `with_client` skip validation; always send once.
        let attempts = self.config.max_retries.max(1);

        for attempt in 0..attempts {
            self.rate_limiter.lock().await.wait().await;

            debug!(url = %url, attempt, "Fetching company concept");
            match self.client.get(&url).send().await {
                Ok(response) => match classify_status(response.status()) {
                    StatusClass::Success => {
                        let facts: ConceptFacts = response.json().await.map_err(|e| {
                            PanelError::Parse(format!(
                                "Failed to parse company concept {} for CIK {}: {}",
                                tag, cik, e
                            ))
                        })?;
                        return Ok(Some(facts));
                    }
                    StatusClass::NotFound => {
                        debug!(cik, tag, "Concept not reported");
                        return Ok(None);
                    }
                    StatusClass::Transient => {
                        warn!(cik, tag, status = %response.status(), attempt, "Transient HTTP status");
                    }
                    StatusClass::Fatal => {
                        return Err(PanelError::Network(format!(
                            "Failed to fetch company concept {} for CIK {}: HTTP {}",
                            tag,
                            cik,
                            response.status()
                        )));
                    }
                },
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!(cik, tag, attempt, error = %e, "Transient network failure");
                }
                Err(e) => return Err(PanelError::Network(e.to_string())),
            }

            if attempt + 1 < attempts {
                sleep(self.config.backoff(attempt)).await;
            }
        }

        warn!(
            cik,
            tag,
            retries = attempts,
            "Retries exhausted, treating concept as unavailable"
        );
        Ok(None)
    }
}

/// Zero-pads a CIK to the 10 digits the API expects.
fn pad_cik(cik: &str) -> String {
    format!("{:0>10}", cik.trim())
}

fn build_ticker_map(entries: impl IntoIterator<Item = CompanyTickerInfo>) -> HashMap<Ticker, String> {
    entries
        .into_iter()
        .map(|info| (Ticker::new(info.ticker), pad_cik(&info.cik_str.to_string())))
        .collect()
}

// =============================================================================
// SEC API Response Types
// =============================================================================

/// Company ticker information from SEC JSON.
#[derive(Debug, Deserialize)]
struct CompanyTickerInfo {
    /// CIK as a number (SEC returns this as an integer)
    cik_str: u64,
    /// Ticker symbol
    ticker: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const UA: &str = "Test/1.0 (test@example.com)";

    #[test]
    fn test_provider_name() {
        let provider = EdgarProvider::new(UA).unwrap();
        assert_eq!(provider.name(), "SEC EDGAR");
        assert_eq!(provider.config().max_retries, 5);
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        assert!(matches!(
            EdgarProvider::new("  "),
            Err(PanelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_cik_padding() {
        assert_eq!(pad_cik("63908"), "0000063908");
        assert_eq!(pad_cik("0000063908"), "0000063908");
    }

    #[test]
    fn test_concept_url() {
        let provider = EdgarProvider::new(UA).unwrap();
        assert_eq!(
            provider.concept_url("63908", "us-gaap", "Revenues"),
            "https://data.sec.gov/api/xbrl/companyconcept/CIK0000063908/us-gaap/Revenues.json"
        );

        let mirrored = provider.with_endpoints("http://localhost:8080/", "http://localhost:8080/t.json");
        assert_eq!(
            mirrored.concept_url("1", "dei", "EntityCommonStockSharesOutstanding"),
            "http://localhost:8080/api/xbrl/companyconcept/CIK0000000001/dei/EntityCommonStockSharesOutstanding.json"
        );
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::OK), StatusClass::Success);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), StatusClass::NotFound);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            StatusClass::Transient
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            StatusClass::Transient
        );
        assert_eq!(classify_status(StatusCode::FORBIDDEN), StatusClass::Fatal);
    }

    #[test]
    fn test_ticker_map_parsing() {
        let json = r#"{
            "0": {"cik_str": 63908, "ticker": "MCD", "title": "MCDONALDS CORP"},
            "1": {"cik_str": 1060391, "ticker": "wen", "title": "Wendy's Co"}
        }"#;
        let data: HashMap<String, CompanyTickerInfo> = serde_json::from_str(json).unwrap();
        let map = build_ticker_map(data.into_values());
        assert_eq!(map.get(&Ticker::new("MCD")).map(String::as_str), Some("0000063908"));
        assert_eq!(map.get(&Ticker::new("WEN")).map(String::as_str), Some("0001060391"));
    }

    #[tokio::test]
    async fn test_rate_limiter_spacing() {
        let mut limiter = RateLimiter::new(Duration::from_millis(20));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_zero_retries_rejected() {
        let config = FetchConfig {
            max_retries: 0,
            ..FetchConfig::new(UA)
        };
        assert!(matches!(
            EdgarProvider::with_config(config),
            Err(PanelError::Config(_))
        ));
    }

    const FACTS_BODY: &str = r#"{"cik": 63908, "taxonomy": "us-gaap", "tag": "Revenues",
        "units": {"USD": [{"end": "2019-12-31", "val": 100.0, "form": "10-K"}]}}"#;

    /// Serves one canned response per connection, repeating the last one once
    /// the script runs out. Returns the base URL and the request counter.
    async fn serve(script: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = script[n.min(script.len() - 1)];

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(read) => request.extend_from_slice(&buf[..read]),
                    }
                }

                let response = format!(
                    "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn local_provider(base_url: &str, max_retries: u32) -> EdgarProvider {
        let config = FetchConfig {
            min_interval_ms: 0,
            backoff_base_ms: 5,
            max_retries,
            timeout_secs: 5,
            ..FetchConfig::new(UA)
        };
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        EdgarProvider::with_client(client, config)
            .with_endpoints(base_url, format!("{}/files/company_tickers.json", base_url))
    }

    #[tokio::test]
    async fn test_concept_success() {
        let (url, hits) = serve(vec![(200, FACTS_BODY)]).await;
        let provider = local_provider(&url, 3);

        let facts = provider
            .company_concept("63908", "us-gaap", "Revenues")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(facts.record_count(), 1);
        assert_eq!(facts.cik, Some(63908));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let (url, hits) = serve(vec![(404, "{}")]).await;
        let provider = local_provider(&url, 3);

        let result = provider.company_concept("63908", "us-gaap", "Missing").await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_statuses_retried() {
        let (url, hits) = serve(vec![(503, "{}"), (429, "{}"), (200, FACTS_BODY)]).await;
        let provider = local_provider(&url, 5);

        let start = Instant::now();
        let facts = provider
            .company_concept("63908", "us-gaap", "Revenues")
            .await
            .unwrap();
        assert!(facts.is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        // Backoff of 5ms then 10ms between the three attempts.
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_none() {
        let (url, hits) = serve(vec![(500, "{}")]).await;
        let provider = local_provider(&url, 3);

        let result = provider.company_concept("63908", "us-gaap", "Revenues").await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_status_is_error() {
        let (url, hits) = serve(vec![(403, "{}"), (200, FACTS_BODY)]).await;
        let provider = local_provider(&url, 3);

        let result = provider.company_concept("63908", "us-gaap", "Revenues").await;
        assert!(matches!(result, Err(PanelError::Network(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unvalidated_zero_retries_still_sends_once() {
        let (url, hits) = serve(vec![(200, FACTS_BODY)]).await;
        let provider = local_provider(&url, 0);

        let facts = provider
            .company_concept("63908", "us-gaap", "Revenues")
            .await
            .unwrap();
        assert!(facts.is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cik_lookup_from_server() {
        let tickers = r#"{"0": {"cik_str": 63908, "ticker": "MCD", "title": "MCDONALDS CORP"}}"#;
        let (url, hits) = serve(vec![(200, tickers)]).await;
        let provider = local_provider(&url, 3);

        assert_eq!(provider.get_cik("mcd").await.unwrap(), "0000063908");
        assert!(matches!(
            provider.get_cik("WEN").await,
            Err(PanelError::TickerNotFound(_))
        ));
        // The ticker map is fetched once and cached.
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_ticker_rejected() {
        let provider = EdgarProvider::new(UA).unwrap();
        assert!(matches!(
            provider.get_cik("").await,
            Err(PanelError::InvalidParameter(_))
        ));
    }
}
