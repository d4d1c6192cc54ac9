use std::path::Path;

use anyhow::Context;
use docmap_loader::LoaderConfig;
use docmap_store::StoreConfig;
use serde::{Deserialize, Serialize};

/// Settings file for the `load` command.
///
/// ```toml
/// [loader]
/// embedded_key_prefix = "_embedded_"
/// flush = true
///
/// [store]
/// identity_map = true
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocmapConfig {
    pub loader: LoaderConfig,
    pub store: StoreConfig,
}

impl DocmapConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&source).with_context(|| format!("parsing config {}", path.display()))
    }
}
