//! Error types for panel construction.
//!
//! This module defines [`PanelError`] which covers all error cases that can occur
//! when fetching, caching, or reconciling reported financial facts. Data sparsity
//! (a metric with no tag, a thin donor, a gap in a tag's history) is never an
//! error; only structural precondition violations are.

use thiserror::Error;

/// Errors that can occur while building a panel.
#[derive(Error, Debug)]
pub enum PanelError {
    /// Network-related errors (connection failures, unexpected HTTP status).
    #[error("Network error: {0}")]
    Network(String),

    /// The requested ticker is absent from the regulator's ticker map.
    #[error("Ticker not found: {0}")]
    TickerNotFound(String),

    /// Error parsing data from the regulator or from a persisted table.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error interacting with the fact cache.
    #[error("Cache error: {0}")]
    Cache(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The pipeline configuration is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A time index column holds a value that is not a whole number.
    #[error("Non-integer time index in column {column}: {value}")]
    NonIntegerTimeIndex {
        /// Name of the offending column.
        column: String,
        /// The offending value.
        value: f64,
    },

    /// More than one observation reached the pivot for the same panel cell.
    #[error("Duplicate panel cell for {ticker} at time {time}, metric {metric}")]
    DuplicatePanelCell {
        /// Entity of the duplicated cell.
        ticker: String,
        /// Time index of the duplicated cell.
        time: i64,
        /// Metric label of the duplicated cell.
        metric: String,
    },

    /// A required column is missing from a table.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Polars error.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`PanelError`].
pub type Result<T> = std::result::Result<T, PanelError>;
