//! Error types shared by the core and the HTTP layer.
//!
//! Rule violations are not errors: they travel as [`Violation`] values.
//! These enums cover structural failures only.

use serde_json::Value;

use crate::data::{LessonId, Violation};

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failures while loading or validating directory data.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to read directory file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed directory data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("inconsistent directory data: {0}")]
    Integrity(String),
}

/// Failures raised by the committed-lesson store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness rule on (date, slot, resource) rejected the write.
    #[error("booking collides with an existing lesson: {0}")]
    Duplicate(Violation),

    #[error("lesson {0} not found")]
    LessonNotFound(LessonId),
}

/// Errors surfaced by the service layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Malformed input; details describe what was wrong.
    #[error("bad request: {0}")]
    BadRequest(Value),

    /// The write was refused because these rules fail now.
    #[error("schedule conflict ({} violation(s))", .0.len())]
    Conflict(Vec<Violation>),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(violation) => CoreError::Conflict(vec![violation]),
            StoreError::LessonNotFound(id) => CoreError::not_found("lesson", id),
        }
    }
}

/// Invalid environment configuration.
#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}
