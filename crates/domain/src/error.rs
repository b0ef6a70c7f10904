//! Unified error type for domain operations.

use thiserror::Error;

use crate::patch::PatchError;

/// Errors produced by pure domain logic.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Validation failed (e.g. missing or ill-typed field values).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A patch could not be parsed or applied.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// A dotted property path does not exist on the entity.
    #[error("no such property: {0}")]
    NoSuchProperty(String),

    /// An admin edit supplied a value of the wrong JSON type.
    #[error("type mismatch for {property}: expected {expected}, got {actual}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
