use docmap_document::DocumentError;

/// Errors raised by the store backends themselves.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A stored document names a type the schema does not know.
    #[error("unknown stored type: {0}")]
    UnknownType(String),

    /// Embedded types have no collection of their own.
    #[error("embedded type {0} is not stored on its own")]
    EmbeddedType(String),

    /// Snapshot encoding failure.
    #[error("codec error: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for DocumentError {
    fn from(err: StoreError) -> Self {
        DocumentError::Backend(Box::new(err))
    }
}
