//! Pipeline entry point.
//!
//! [`Pipeline::run`] takes the raw facts table through every stage in a fixed
//! order. Each stage consumes the previous stage's output; nothing is re-run.

use panel_core::{Observation, PipelineConfig, Result, TagSelection};
use polars::prelude::DataFrame;
use std::path::Path;
use tracing::{info, instrument};

use crate::complete::complete_grid;
use crate::concept::{ConceptCoverage, concept_coverage, restrict_to_resolved};
use crate::dedup::{resolve_duplicates, resolve_form_collisions};
use crate::dominant::select_dominant_with_fallback;
use crate::donor::{DonorReport, filter_donors};
use crate::impute::impute;
use crate::interval::{assign_time_index, filter_period};
use crate::io::{TableFormat, observations_to_df, panel_to_df, write_table};
use crate::normalize::{attach_labels, drop_unordered_periods};
use crate::panel::{Panel, Treatment, pivot};
use crate::standardize::standardize;
use crate::transform::{
    add_derived_ratios, apply_estimation_window, common_support, log_transform,
};

/// Everything a pipeline run produces.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    /// Observations with their metric labels.
    pub labeled: Vec<Observation>,
    /// One observation per (entity, metric, time index), as a long table.
    pub cleaned: DataFrame,
    /// The prepared panel.
    pub panel: Panel,
    /// Tag resolution per entity and metric.
    pub coverage: ConceptCoverage,
    /// Donor filter outcome.
    pub donors: DonorReport,
}

impl PipelineOutput {
    /// Persists the labeled, cleaned and panel tables into `dir`.
    pub fn write_tables(&self, dir: impl AsRef<Path>, format: TableFormat) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let ext = match format {
            TableFormat::Parquet => "parquet",
            TableFormat::Csv => "csv",
        };
        write_table(
            &mut observations_to_df(&self.labeled)?,
            dir.join(format!("facts_labeled.{ext}")),
        )?;
        write_table(&mut self.cleaned.clone(), dir.join(format!("facts_clean.{ext}")))?;
        write_table(&mut panel_to_df(&self.panel)?, dir.join(format!("panel.{ext}")))?;
        Ok(())
    }
}

/// Reconciliation pipeline bound to one configuration.
#[derive(Clone, Debug)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Creates a pipeline, validating the configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The pipeline's configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Labels, resolves and deduplicates observations down to one row per
    /// (entity, metric, time index).
    ///
    /// Returns the labeled observations, the cleaned observations and the
    /// concept coverage report.
    pub fn clean(
        &self,
        mut observations: Vec<Observation>,
    ) -> Result<(Vec<Observation>, DataFrame, ConceptCoverage)> {
        let config = &self.config;

        drop_unordered_periods(&mut observations);
        let labeled = attach_labels(observations, &config.tag_groups)?;

        let coverage = concept_coverage(&labeled, &config.tag_groups);
        let mut working = labeled.clone();
        if config.tag_selection == TagSelection::FirstAvailable {
            working = restrict_to_resolved(working, &coverage);
        }

        let working = filter_period(working, config.period_type, config.quarterly_window);
        let working = resolve_duplicates(&observations_to_df(&working)?)?;
        let working = match config.tag_selection {
            TagSelection::DominantWithFallback => {
                select_dominant_with_fallback(&working, config.min_gap)?
            }
            TagSelection::FirstAvailable => working,
        };
        let working = assign_time_index(&working, config.period_type)?;
        let cleaned = resolve_form_collisions(&working, config.period_type)?;

        Ok((labeled, cleaned, coverage))
    }

    /// Builds the prepared panel from the cleaned observation table.
    pub fn build_panel(&self, cleaned: &DataFrame) -> Result<(Panel, DonorReport)> {
        let config = &self.config;
        let labels: Vec<&str> = config.tag_groups.labels().collect();

        let mut panel = pivot(
            cleaned,
            &labels,
            config.period_type,
            Some(Treatment::from_config(config)),
        )?;
        apply_estimation_window(&mut panel, &config.estimation_window)?;
        complete_grid(&mut panel)?;
        impute(&mut panel, &config.impute)?;
        add_derived_ratios(&mut panel, &config.derived_ratios)?;
        log_transform(&mut panel, &config.log_columns)?;
        standardize(&mut panel, &config.standardize)?;

        let donors = filter_donors(
            &mut panel,
            &config.outcome_metric,
            config.min_pre_coverage,
            config.pre_treatment_cutoff,
        )?;
        if let Some(metric) = &config.common_support_metric {
            common_support(&mut panel, metric)?;
        }
        Ok((panel, donors))
    }

    /// Runs every stage over the raw facts table.
    #[instrument(skip_all, fields(rows = observations.len(), period_type = ?self.config.period_type))]
    pub fn run(&self, observations: Vec<Observation>) -> Result<PipelineOutput> {
        let (labeled, cleaned, coverage) = self.clean(observations)?;
        let (panel, donors) = self.build_panel(&cleaned)?;

        info!(
            labeled = labeled.len(),
            cleaned = cleaned.height(),
            panel_rows = panel.len(),
            entities = panel.entities().len(),
            donors_dropped = donors.dropped().count(),
            "Pipeline complete"
        );
        Ok(PipelineOutput {
            labeled,
            cleaned,
            panel,
            coverage,
            donors,
        })
    }
}
