//! Error types and result types for record layer operations.
//!
//! This module provides error handling for every fallible operation in the
//! crate. Use [`RecordLayerResult<T>`] as the return type for fallible operations.

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors produced by the record layer.
///
/// This enum covers constraint compilation, schema declaration, persistence
/// reconciliation, and transport-level failures.
#[derive(Error, Debug)]
pub enum RecordLayerError {
    /// An operator was paired with an incompatible value during constraint
    /// compilation (e.g. a non-boolean value for an existence check).
    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),
    /// The constraint compiler was asked for an operator it does not know.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// An attribute or its remote field name collides with an existing
    /// declaration on the same record type.
    #[error("Duplicate property {attribute} on class {class}")]
    DuplicateProperty {
        /// The record type the declaration was made on.
        class: String,
        /// The colliding attribute or remote field name.
        attribute: String,
    },
    /// A save failed and the caller asked for failures to be raised.
    /// Carries the identity of the failed record; the record value itself
    /// stays with the caller and remains dirty for retry.
    #[error("Record not saved: {class} ({})", .object_id.as_deref().unwrap_or("new"))]
    RecordNotSaved {
        /// The record type of the failed instance.
        class: String,
        /// The identifier of the failed instance, if it was ever persisted.
        object_id: Option<String>,
    },
    /// An operation was attempted in a state that cannot support it, such as
    /// committing relation deltas on a record with no identifier.
    #[error("Illegal state: {0}")]
    IllegalState(String),
    /// Serialization or deserialization of a wire payload failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The transport collaborator reported a failure outside the normal
    /// response envelope.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A specialized `Result` type for record layer operations.
pub type RecordLayerResult<T> = Result<T, RecordLayerError>;

impl From<SerdeJsonError> for RecordLayerError {
    fn from(err: SerdeJsonError) -> Self {
        RecordLayerError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for RecordLayerError {
    fn from(err: chrono::ParseError) -> Self {
        RecordLayerError::Serialization(err.to_string())
    }
}
