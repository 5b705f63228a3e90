use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Persistence error: {message} (root cause: {root_cause})")]
    Persistence { message: String, root_cause: String },

    #[error("Concurrency conflict: {0}")]
    Concurrency(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Wraps a storage failure, keeping the innermost cause of `err` for diagnostics.
    pub fn persistence(message: impl Into<String>, err: &(dyn StdError + 'static)) -> Self {
        Self::Persistence {
            message: message.into(),
            root_cause: root_cause(err),
        }
    }

    /// A storage-level rule violation that has no underlying library error.
    pub fn constraint(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Persistence {
            root_cause: message.clone(),
            message: "constraint violation".to_string(),
        }
    }

    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::Concurrency(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    pub fn is_concurrency(&self) -> bool {
        matches!(self, Self::Concurrency(_))
    }

    /// Field that failed validation, if this is a validation error.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Innermost storage cause, if this is a persistence error.
    pub fn root_cause(&self) -> Option<&str> {
        match self {
            Self::Persistence { root_cause, .. } => Some(root_cause),
            _ => None,
        }
    }
}

/// Follows `source()` to the last error in the chain and renders it.
pub fn root_cause(err: &(dyn StdError + 'static)) -> String {
    let mut current = err;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}
