//! Error types for entity and group operations.

use docmap_schema::SchemaError;
use docmap_types::TypeError;

/// Errors raised by entities, groups and persistence gateways.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The type declares no field of the required kind with this name.
    #[error("unknown field {type_name}.{field}")]
    UnknownField { type_name: String, field: String },

    /// A scalar operation was used on a relationship field, or the other
    /// way round.
    #[error("field {type_name}.{field} is not a {expected} field")]
    FieldKindMismatch {
        type_name: String,
        field: String,
        expected: &'static str,
    },

    /// The supplied entity is not an instance of any acceptable type for the
    /// field.
    #[error("invalid target type for {type_name}.{field}: {actual}")]
    InvalidTargetType {
        type_name: String,
        field: String,
        actual: String,
    },

    /// A stored value does not have the shape its field declares.
    #[error("invalid stored value for {type_name}.{field}: {reason}")]
    InvalidStoredValue {
        type_name: String,
        field: String,
        reason: String,
    },

    /// Only top-level entities can be queued for writing.
    #[error("cannot persist embedded entity of type {0}")]
    NotPersistable(String),

    /// The entity owning a group is gone.
    #[error("group owner has been dropped")]
    OwnerDropped,

    /// The persistence gateway an entity was created by is gone.
    #[error("persistence gateway has been dropped")]
    GatewayClosed,

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    /// Failure inside a gateway backend, passed through unchanged.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience alias for document results.
pub type DocumentResult<T> = Result<T, DocumentError>;
