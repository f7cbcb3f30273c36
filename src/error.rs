//! # Find Error Types
//!
//! Structured error handling for the find-query compiler using thiserror.
//!
//! Programmer errors (unknown fields, unsupported operators, bad ids) fail
//! immediately. Degenerate-but-legitimate input never reaches this type; it is
//! compiled into an always-false or always-true condition instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FindError {
    #[error("Field '{field}' not found on {entity}")]
    UnknownField { entity: String, field: String },

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Unsupported filter on {column}: {reason}")]
    UnsupportedFilter { column: String, reason: String },

    #[error("Invalid id for {entity}: {value}")]
    InvalidId { entity: String, value: String },

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Alias '{0}' is used in conditions but was never bound in the filter")]
    UnboundAlias(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Query for {entity} reached the result limit of {limit} rows")]
    TooManyRows { entity: String, limit: usize },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl FindError {
    pub fn unknown_field(entity: &str, field: &str) -> Self {
        FindError::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }

    pub fn unsupported(column: &str, reason: impl Into<String>) -> Self {
        FindError::UnsupportedFilter {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_id(entity: &str, value: &serde_json::Value) -> Self {
        FindError::InvalidId {
            entity: entity.to_string(),
            value: value.to_string(),
        }
    }

    /// Programmer errors are never retried; only database failures may be transient.
    pub fn is_programmer_error(&self) -> bool {
        !matches!(
            self,
            FindError::Database(_) | FindError::TooManyRows { .. } | FindError::Configuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FindError>;
