#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/panel/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Synthetic-control panels from reported financial facts.
//!
//! This crate re-exports the core types, the cache implementations, the SEC
//! EDGAR provider and the reconciliation pipeline, and provides a
//! [`FactCollector`] that fetches the raw facts table through a provider and
//! an optional cache.
//!
//! # Features
//!
//! - `edgar` - SEC EDGAR company-concept provider
//! - `cache-sqlite` - SQLite-based caching
//!
//! # Example
//!
//! ```rust,ignore
//! use panel::{EdgarProvider, FactCollector, Pipeline, PipelineConfig, Ticker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> panel::Result<()> {
//!     let config = PipelineConfig::from_json_file("panel.json")?;
//!     let provider = Arc::new(EdgarProvider::new("MyApp/1.0 (contact@example.com)")?);
//!     let collector = FactCollector::new(provider);
//!
//!     let tickers: Vec<Ticker> = ["MCD", "WEN", "YUM", "QSR"].into_iter().map(Ticker::new).collect();
//!     let facts = collector.collect_concepts_long(&tickers, &config.tag_groups.all_tags()).await?;
//!
//!     let output = Pipeline::new(config)?.run(facts)?;
//!     output.write_tables("data/processed", panel::TableFormat::Csv)?;
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use panel_core::*;

// Pipeline
pub use panel_prep::{
    ConceptCoverage, DonorReport, Panel, PanelRow, Pipeline, PipelineOutput, TableFormat,
    Treatment,
};

// Cache implementations
#[cfg(feature = "cache-sqlite")]
pub use panel_cache::SqliteCache;
pub use panel_cache::{InMemoryCache, NoopCache};

// Providers
#[cfg(feature = "edgar")]
pub use panel_edgar::EdgarProvider;

mod collector;
pub use collector::FactCollector;
