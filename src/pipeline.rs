//! Stage orchestration
//!
//! Threads the two extracts through loader, normalizers, reconciler, derived
//! metrics and capping. Every intermediate table is kept on the output so
//! callers can profile or export any stage.

use crate::config::{PipelineConfig, QuerySource};
use crate::error::Result;
use crate::filings::{blank_key_count, FilingNormalizer};
use crate::loader::load_table;
use crate::metrics::derive_metrics;
use crate::outliers::{cap_outliers, IqrBounds};
use crate::reconcile::reconcile;
use crate::registry::RegistryNormalizer;
use polars::prelude::*;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Normalized registry.
    pub registry: DataFrame,
    /// Normalized, period-filtered filings.
    pub filings: DataFrame,
    /// Reconciled table with derived metrics.
    pub reconciled: DataFrame,
    /// `reconciled` with the outlier column capped.
    pub capped: DataFrame,
    /// Bounds used for capping; `None` when the outlier column had no values.
    pub bounds: Option<IqrBounds>,
    pub query_source: QuerySource,
}

impl PipelineOutput {
    /// Table the query layer reads, per `query_source`.
    pub fn analysis_frame(&self) -> &DataFrame {
        match self.query_source {
            QuerySource::Raw => &self.reconciled,
            QuerySource::Capped => &self.capped,
        }
    }

    /// Named stage tables in pipeline order.
    pub fn stages(&self) -> Vec<(&'static str, &DataFrame)> {
        vec![
            ("registry", &self.registry),
            ("filings", &self.filings),
            ("reconciled", &self.reconciled),
            ("capped", &self.capped),
        ]
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage over the raw registry and filing byte streams.
    pub fn run(&self, registry_bytes: &[u8], filing_bytes: &[u8]) -> Result<PipelineOutput> {
        let raw_registry = load_table(registry_bytes, &self.config.registry_source)?;
        let raw_filings = load_table(filing_bytes, &self.config.filing_source)?;
        info!(
            registry_rows = raw_registry.height(),
            filing_rows = raw_filings.height(),
            "extracts loaded"
        );

        let registry = RegistryNormalizer::new(&self.config.country_synonyms).normalize(&raw_registry)?;
        let (period_start, period_end) = self.config.period_bounds()?;
        let filings = FilingNormalizer::new(&self.config.date_format, period_start, period_end).normalize(&raw_filings)?;
        let blank_keys = blank_key_count(&filings)?;
        if blank_keys > 0 {
            warn!(rows = blank_keys, "filings without a charity number cannot match the registry");
        }

        let reconciled = derive_metrics(&reconcile(&registry, &filings)?)?;
        let (capped, bounds) = cap_outliers(&reconciled, &self.config.outlier_column, self.config.iqr_multiplier)?;

        info!(
            year = self.config.target_year,
            rows = reconciled.height(),
            query_source = ?self.config.query_source,
            "pipeline complete"
        );

        Ok(PipelineOutput {
            registry,
            filings,
            reconciled,
            capped,
            bounds,
            query_source: self.config.query_source,
        })
    }

    /// Read both extracts from disk and run.
    pub fn run_files(&self, registry_path: &Path, filing_path: &Path) -> Result<PipelineOutput> {
        let registry_bytes = std::fs::read(registry_path)?;
        let filing_bytes = std::fs::read(filing_path)?;
        self.run(&registry_bytes, &filing_bytes)
    }
}
