#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/panel/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Reconciliation of reported financial facts into a synthetic-control panel.
//!
//! Stages, in pipeline order:
//!
//! - [`normalize`] - Payload to typed observations, tag-group labeling
//! - [`concept`] - First-available tag resolution and coverage report
//! - [`interval`] - Quarterly window and annual marker classification
//! - [`dedup`] - Frame, filing, interval and form-type conflict resolution
//! - [`dominant`] - Dominant tag per entity and metric, with gap fallback
//! - [`panel`] - Pivot into a wide panel with a treatment indicator
//! - [`complete`] - Contiguous time grid per entity
//! - [`impute`] - Forward and backward fill within entity
//! - [`transform`] - Derived ratios, logs, estimation window, common support
//! - [`standardize`] - Rescaling against the entity baseline
//! - [`donor`] - Pre-treatment coverage filter
//!
//! [`Pipeline`] runs them all from one [`PipelineConfig`](panel_core::PipelineConfig).

/// Contiguous time grid per entity.
pub mod complete;
/// Tag resolution per entity and metric.
pub mod concept;
/// Duplicate and conflict resolution.
pub mod dedup;
/// Reporting-period overlap diagnostics.
pub mod diagnostics;
/// Dominant tag selection with fallback.
pub mod dominant;
/// Donor filtering.
pub mod donor;
/// Within-entity imputation.
pub mod impute;
/// Interval classification.
pub mod interval;
/// DataFrame conversion and table files.
pub mod io;
/// Payload normalization and labeling.
pub mod normalize;
/// Wide panel type and pivot.
pub mod panel;
/// Pipeline entry point.
pub mod pipeline;
/// Baseline standardization.
pub mod standardize;
/// Panel transforms.
pub mod transform;

pub use complete::{complete_grid, time_index_from_f64};
pub use concept::{ConceptCoverage, ConceptResolution, concept_coverage, resolve_concept};
pub use dedup::{
    collapse_frames, keep_latest_filing, keep_max_interval, resolve_duplicates,
    resolve_form_collisions,
};
pub use diagnostics::{PeriodOverlap, UnitOverlap, period_overlap, unit_overlap};
pub use dominant::select_dominant_with_fallback;
pub use donor::{DonorCoverage, DonorReport, filter_donors};
pub use impute::impute;
pub use interval::{
    IntervalClass, assign_time_index, classify_interval, filter_period, time_index_expr,
};
pub use io::{
    TableFormat, observations_from_df, observations_to_df, panel_from_df, panel_to_df,
    read_table, write_table,
};
pub use normalize::{attach_labels, normalize_concept};
pub use panel::{Panel, PanelRow, Treatment, observed_column, pivot};
pub use pipeline::{Pipeline, PipelineOutput};
pub use standardize::{rescaled, standardize};
