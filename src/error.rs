//! Error taxonomy for the import path.
//!
//! `DataError` is what the upsert engine and the reconciler report for a single
//! record. `ImportError` is what the batch orchestrator reports for a payload;
//! every variant except `Storage` is a client error.

use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("missing identifier")]
    MissingId,

    #[error("Invalid field name(s) for model {type_name}: {}", .fields.join(", "))]
    UnknownFields {
        type_name: &'static str,
        fields: Vec<String>,
    },

    #[error("Field '{field}' was given more than once")]
    DuplicateField { field: &'static str },

    #[error("Field '{field}' {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("{type_name} has no relation '{relation}'")]
    UnsupportedRelation {
        type_name: &'static str,
        relation: String,
    },

    /// Unique, foreign key, not-null or check violation reported by the store.
    #[error("{0}")]
    Constraint(String),

    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return DataError::Constraint(db_err.message().to_string());
                }
                _ => {}
            }
        }
        DataError::Storage(err)
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid JSON")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Expected a JSON array of records")]
    NotAnArray,

    #[error("Malformed record (record {index}): {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("Invalid model name: {name} (record {index})")]
    UnknownType { index: usize, name: String },

    #[error("Missing ID for {type_name} (record {index})")]
    MissingId { index: usize, type_name: String },

    #[error("Invalid data for {type_name} (record {index}): {source}")]
    InvalidData {
        index: usize,
        type_name: &'static str,
        #[source]
        source: DataError,
    },

    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),
}

impl ImportError {
    /// Whether the failure is the caller's fault (HTTP 400) rather than ours.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ImportError::Storage(_))
    }

    /// Position of the failing record, if the error is tied to one.
    pub fn record_index(&self) -> Option<usize> {
        match self {
            ImportError::MalformedRecord { index, .. }
            | ImportError::UnknownType { index, .. }
            | ImportError::MissingId { index, .. }
            | ImportError::InvalidData { index, .. } => Some(*index),
            _ => None,
        }
    }
}
