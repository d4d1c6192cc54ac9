use serde::{Deserialize, Serialize};

/// Configuration for [`InMemoryDocumentStore`](crate::InMemoryDocumentStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Hand out the live instance of an already loaded entity instead of
    /// decoding a fresh copy.
    pub identity_map: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { identity_map: true }
    }
}

impl StoreConfig {
    /// Every read decodes a fresh entity.
    pub fn without_identity_map() -> Self {
        Self {
            identity_map: false,
        }
    }
}
