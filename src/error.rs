// ⚠️ Pipeline Errors
// One error type for every stage; binaries wrap it in anyhow

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Logical table name is not in the catalog
    #[error("table '{name}' is not in the catalog. Options: {options:?}")]
    UnknownTable { name: String, options: Vec<String> },

    /// Expected input or processed file is absent
    #[error("file does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("[{table}] missing required columns: {missing:?}")]
    MissingColumns { table: String, missing: Vec<String> },

    /// Feature table breaks the one-row-per-customer rule
    #[error("[{table}] has {count} duplicated {key} values (expected 1 row per customer)")]
    DuplicateKeys {
        table: String,
        key: String,
        count: usize,
    },

    #[error("row count changed after merges: base={base}, merged={merged}")]
    RowCountChanged { base: usize, merged: usize },

    #[error("[{0}] has no rows")]
    EmptyTable(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("config error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<figment::Error> for PipelineError {
    fn from(err: figment::Error) -> Self {
        PipelineError::Config(Box::new(err))
    }
}
