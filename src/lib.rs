pub mod config;
pub mod data_utils;
pub mod error;
pub mod filings;
pub mod loader;
pub mod metrics;
pub mod outliers;
pub mod pipeline;
pub mod profile;
pub mod query;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod schema;

pub use config::{PipelineConfig, QuerySource, SourceLayout, SynonymEntry};
pub use error::{PipelineError, Result, Stage};
pub use pipeline::{Pipeline, PipelineOutput};
pub use report::AnalysisReport;
