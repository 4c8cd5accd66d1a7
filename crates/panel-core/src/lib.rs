#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/panel/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for building entity-time panels from reported facts.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`Observation`](types::Observation) - One reported value for one entity, metric and period
//! - [`PipelineConfig`](config::PipelineConfig) - Explicit configuration of the reconciliation pipeline
//! - [`ConceptProvider`](provider::ConceptProvider) - Source of company-concept facts
//! - [`FactCache`](cache::FactCache) - Caching abstraction for fetched payloads

/// Cache trait for storing fetched facts.
pub mod cache;
/// Pipeline and fetch configuration.
pub mod config;
/// Error types for panel operations.
pub mod error;
/// Inbound wire shape of company-concept payloads.
pub mod facts;
/// Period type and time index definitions.
pub mod frequency;
/// Provider trait for fetching concept facts.
pub mod provider;
/// Core data types (Ticker, Observation).
pub mod types;

// Re-export commonly used items at crate root
pub use cache::FactCache;
pub use config::{
    DerivedRatio, EstimationWindow, FetchConfig, ImputeConfig, ImputeMethod, PipelineConfig,
    QuarterlyWindow, StandardizeConfig, StandardizeMethod, TagGroup, TagGroups, TagSelection,
    TreatmentConfig, TreatmentStart,
};
pub use error::{PanelError, Result};
pub use facts::{ConceptFacts, FactRecord};
pub use frequency::{PeriodType, TimeIndex};
pub use provider::{ConceptProvider, DEFAULT_TAXONOMY};
pub use types::{Observation, ObservationIdentity, Ticker};
