// crates/dmart-core/src/error.rs

use std::collections::BTreeMap;

use thiserror::Error;

use crate::pipelines::Stage;

#[derive(Error, Debug)]
pub enum DmartError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Database query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Schema mismatch: missing columns {missing:?}, unexpected columns {unexpected:?}")]
    Schema {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Null policy violated: {counts:?}")]
    NullPolicy { counts: BTreeMap<String, usize> },

    #[error("Type check failed for column {column}: {message}")]
    Type { column: String, message: String },

    #[error("Business rule violated: {column} {rule} ({violations} rows)")]
    BusinessRule {
        column: String,
        rule: String,
        violations: usize,
    },

    #[error("Missing required columns: {columns:?}")]
    MissingColumn { columns: Vec<String> },

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DmartError {
    /// True for the four rejections raised by the validation gate.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DmartError::Schema { .. }
                | DmartError::NullPolicy { .. }
                | DmartError::Type { .. }
                | DmartError::BusinessRule { .. }
        )
    }

    /// True for faults nobody anticipated: I/O, dataframe and serialization errors.
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            DmartError::Io(_) | DmartError::Polars(_) | DmartError::Json(_) | DmartError::Toml(_)
        )
    }
}

/// The single application error surfaced by a failed run.
#[derive(Error, Debug)]
#[error("pipeline failed during {stage} stage: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: DmartError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: DmartError) -> Self {
        Self { stage, source }
    }

    pub fn kind(&self) -> &DmartError {
        &self.source
    }
}

pub type Result<T> = std::result::Result<T, DmartError>;
