use crate::error::{PipelineError, Result};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Layout of one delimited source extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLayout {
    /// Encoding label understood by the WHATWG encoding standard (e.g. `ISO-8859-1`).
    pub encoding: String,
    /// Leading non-data lines discarded before the header row.
    pub skip_rows: usize,
    /// Inclusive column-index range retained from each row.
    pub first_column: usize,
    pub last_column: usize,
}

impl SourceLayout {
    pub fn new(encoding: &str, skip_rows: usize, first_column: usize, last_column: usize) -> Self {
        Self {
            encoding: encoding.to_string(),
            skip_rows,
            first_column,
            last_column,
        }
    }

    pub fn registry_default() -> Self {
        Self::new("ISO-8859-1", 1, 0, 9)
    }

    pub fn filing_default() -> Self {
        Self::new("ISO-8859-1", 1, 0, 15)
    }

    pub fn resolve_encoding(&self) -> Result<&'static Encoding> {
        Encoding::for_label(self.encoding.trim().as_bytes())
            .ok_or_else(|| PipelineError::Config(format!("Unknown encoding label: {}", self.encoding)))
    }

    pub fn column_count(&self) -> usize {
        self.last_column + 1 - self.first_column
    }
}

/// One synonym → canonical entry of a categorical normalization table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymEntry {
    pub synonym: String,
    pub canonical: String,
}

impl SynonymEntry {
    pub fn new(synonym: &str, canonical: &str) -> Self {
        Self {
            synonym: synonym.to_string(),
            canonical: canonical.to_string(),
        }
    }
}

/// Which table feeds the query layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuerySource {
    #[default]
    Raw,
    Capped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_year: i32,
    pub registry_source: SourceLayout,
    pub filing_source: SourceLayout,
    pub date_format: String,
    pub country_synonyms: Vec<SynonymEntry>,
    pub iqr_multiplier: f64,
    pub outlier_column: String,
    pub query_source: QuerySource,
    pub top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_year: 2021,
            registry_source: SourceLayout::registry_default(),
            filing_source: SourceLayout::filing_default(),
            date_format: "%d/%m/%Y".to_string(),
            country_synonyms: default_country_synonyms(),
            iqr_multiplier: 1.5,
            outlier_column: crate::schema::GROSS_INCOME.to_string(),
            query_source: QuerySource::Raw,
            top_n: 5,
        }
    }
}

pub fn default_country_synonyms() -> Vec<SynonymEntry> {
    vec![
        SynonymEntry::new("Republic of Ireland", "Ireland"),
        SynonymEntry::new("Republic Of Ireland", "Ireland"),
        SynonymEntry::new("Poblacht na hÉireann", "Ireland"),
    ]
}

impl PipelineConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Apply `CHARITY_TARGET_YEAR` and `CHARITY_IQR_MULTIPLIER` when set.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(year) = std::env::var("CHARITY_TARGET_YEAR") {
            self.target_year = year
                .trim()
                .parse()
                .map_err(|_| PipelineError::Config(format!("CHARITY_TARGET_YEAR is not a year: {}", year)))?;
        }
        if let Ok(multiplier) = std::env::var("CHARITY_IQR_MULTIPLIER") {
            self.iqr_multiplier = multiplier.trim().parse().map_err(|_| {
                PipelineError::Config(format!("CHARITY_IQR_MULTIPLIER is not a number: {}", multiplier))
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, layout) in [("registry", &self.registry_source), ("filing", &self.filing_source)] {
            layout.resolve_encoding()?;
            if layout.first_column > layout.last_column {
                return Err(PipelineError::Config(format!(
                    "{} column range is empty: {}..={}",
                    name, layout.first_column, layout.last_column
                )));
            }
        }

        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier < 0.0 {
            return Err(PipelineError::Config(format!(
                "IQR multiplier must be a non-negative number, got {}",
                self.iqr_multiplier
            )));
        }

        self.period_bounds()?;

        for entry in &self.country_synonyms {
            if entry.synonym.is_empty() || entry.canonical.is_empty() {
                return Err(PipelineError::Config(
                    "Country synonym entries need both a synonym and a canonical label".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// First and last day of the target year.
    pub fn period_bounds(&self) -> Result<(chrono::NaiveDate, chrono::NaiveDate)> {
        let start = chrono::NaiveDate::from_ymd_opt(self.target_year, 1, 1);
        let end = chrono::NaiveDate::from_ymd_opt(self.target_year, 12, 31);
        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(PipelineError::Config(format!(
                "Target year out of range: {}",
                self.target_year
            ))),
        }
    }
}
