use serde::{Deserialize, Serialize};

/// Prefix of the synthetic keys given to promoted embedded records.
pub const DEFAULT_EMBEDDED_KEY_PREFIX: &str = "_embedded_";

/// Configuration for a [`DataLoader`](crate::DataLoader).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Prefix for synthetic keys of promoted embedded records. Input keys
    /// should not start with it.
    pub embedded_key_prefix: String,
    /// Flush the gateway once everything is built. When `false`, the
    /// built entities are left queued for the caller to flush.
    pub flush: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            embedded_key_prefix: DEFAULT_EMBEDDED_KEY_PREFIX.to_string(),
            flush: true,
        }
    }
}

impl LoaderConfig {
    /// Build and queue, but leave flushing to the caller.
    pub fn without_flush() -> Self {
        Self {
            flush: false,
            ..Default::default()
        }
    }
}
