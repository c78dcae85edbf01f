use std::fmt;
use thiserror::Error;

/// Pipeline stage that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loader,
    RegistryNormalizer,
    FilingNormalizer,
    Reconciler,
    DerivedMetrics,
    Outliers,
    Query,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loader => "table loader",
            Stage::RegistryNormalizer => "registry normalizer",
            Stage::FilingNormalizer => "filing normalizer",
            Stage::Reconciler => "reconciler",
            Stage::DerivedMetrics => "derived metrics",
            Stage::Outliers => "outliers",
            Stage::Query => "query",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Decode error: input is not valid {encoding} (first invalid byte near offset {offset})")]
    Decode { encoding: String, offset: usize },

    #[error("Schema error in {stage}: {message}")]
    Schema { stage: Stage, message: String },

    #[error("Date parse error in {stage}, column '{column}', row {row}: '{value}' does not match '{format}'")]
    DateParse {
        stage: Stage,
        column: String,
        row: usize,
        value: String,
        format: String,
    },

    #[error("Currency parse error in {stage}, column '{column}', row {row}: '{value}' is not numeric after cleaning ('{cleaned}')")]
    CurrencyParse {
        stage: Stage,
        column: String,
        row: usize,
        value: String,
        cleaned: String,
    },

    #[error("Join key mismatch: {0}")]
    JoinKeyMismatch(String),

    #[error("Insufficient data in {stage}, column '{column}': {message}")]
    InsufficientData {
        stage: Stage,
        column: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl PipelineError {
    pub fn schema(stage: Stage, message: impl Into<String>) -> Self {
        PipelineError::Schema {
            stage,
            message: message.into(),
        }
    }

    /// Stage the error is attributed to, when it carries one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Decode { .. } => Some(Stage::Loader),
            PipelineError::Schema { stage, .. }
            | PipelineError::DateParse { stage, .. }
            | PipelineError::CurrencyParse { stage, .. }
            | PipelineError::InsufficientData { stage, .. } => Some(*stage),
            PipelineError::JoinKeyMismatch(_) => Some(Stage::Reconciler),
            _ => None,
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
