use thiserror::Error;

use crate::types::Table;

#[derive(Error, Debug)]
pub enum ImportError {
    /// A single row or JSON node could not be normalized. Recovered by the caller.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// A required column or field is missing from an upstream export.
    #[error("{source_name} schema mismatch: {message}")]
    Schema { source_name: String, message: String },

    #[error(
        "Out-of-order write into {table} for {source_name}: {missing} row(s) reference mutations \
         that are not persisted (first: {mutation_id})"
    )]
    OutOfOrderWrite {
        table: Table,
        source_name: String,
        mutation_id: String,
        missing: usize,
    },

    #[error("Storage error in {table} batch for {source_name} after {completed} row(s): {message}")]
    Storage {
        table: Table,
        source_name: String,
        completed: usize,
        message: String,
    },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ImportError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ImportError::MalformedRecord(message.into())
    }

    pub fn schema(source_name: &str, message: impl Into<String>) -> Self {
        ImportError::Schema {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// Batch-level errors abandon the current table batch; everything else is record- or source-level.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            ImportError::OutOfOrderWrite { .. } | ImportError::Storage { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
