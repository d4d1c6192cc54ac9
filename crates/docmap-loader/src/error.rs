use docmap_document::DocumentError;
use docmap_schema::SchemaError;

/// Errors raised while loading a raw record set.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The gateway already had queued writes when the load started.
    #[error("persistence gateway has {0} pending operations")]
    PendingOperations(usize),

    /// A reference names a key with no raw record of the target type.
    #[error("reference {owner}.{field} points at missing {type_name} record {key:?}")]
    UnknownReference {
        type_name: String,
        key: String,
        owner: String,
        field: String,
    },

    /// A record was requested that is not in the input.
    #[error("no {type_name} record with key {key:?}")]
    UnknownRecord { type_name: String, key: String },

    /// A raw field value does not have the shape its declaration needs.
    #[error("invalid raw value for {type_name}.{field}: {reason}")]
    InvalidRawValue {
        type_name: String,
        field: String,
        reason: String,
    },

    #[error("failed to read raw records: {0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Convenience alias for loader results.
pub type LoaderResult<T> = Result<T, LoaderError>;
