//! Error types for the schema crate.

/// Errors that can occur while building or querying type metadata.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// No metadata is registered for the type.
    #[error("unknown entity type: {0}")]
    UnknownType(String),

    /// A type with this name is already registered.
    #[error("duplicate entity type: {0}")]
    DuplicateType(String),

    /// Following `extends` links from the type leads back to itself.
    #[error("inheritance cycle through type: {0}")]
    InheritanceCycle(String),

    /// A declaration is inconsistent (bad target, missing fields, ...).
    #[error("invalid definition for type {type_name}: {reason}")]
    InvalidDefinition { type_name: String, reason: String },

    /// A schema file could not be parsed.
    #[error("schema parse error: {0}")]
    Parse(String),

    /// I/O error while reading a schema file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for schema results.
pub type SchemaResult<T> = Result<T, SchemaError>;
