//! In-memory schema registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{SchemaError, SchemaResult};
use crate::file::SchemaFile;
use crate::metadata::{ReferenceTarget, TypeMetadata};
use crate::source::MetadataSource;

/// A `HashMap`-backed [`MetadataSource`].
///
/// Types are kept in registration order so that everything driven "for
/// every type" (purging, classification reports) is deterministic.
#[derive(Debug, Default)]
pub struct Schema {
    types: HashMap<String, Arc<TypeMetadata>>,
    order: Vec<String>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type and validate the whole schema afterwards.
    pub fn from_types(types: impl IntoIterator<Item = TypeMetadata>) -> SchemaResult<Self> {
        let mut schema = Self::new();
        for metadata in types {
            schema.register(metadata)?;
        }
        schema.validate()?;
        Ok(schema)
    }

    /// Parse and validate a TOML schema.
    pub fn from_toml_str(source: &str) -> SchemaResult<Self> {
        let file: SchemaFile =
            toml::from_str(source).map_err(|e| SchemaError::Parse(e.to_string()))?;
        file.into_schema()
    }

    /// Parse and validate a JSON schema.
    pub fn from_json_str(source: &str) -> SchemaResult<Self> {
        let file: SchemaFile =
            serde_json::from_str(source).map_err(|e| SchemaError::Parse(e.to_string()))?;
        file.into_schema()
    }

    /// Read a schema file; `.json` files are parsed as JSON, everything else
    /// as TOML.
    pub fn from_path(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_toml_str(&source),
        }
    }

    /// Add a type. Registration does not validate cross-type links; call
    /// [`validate`](Self::validate) once every type is in.
    pub fn register(&mut self, metadata: TypeMetadata) -> SchemaResult<()> {
        if self.types.contains_key(&metadata.name) {
            return Err(SchemaError::DuplicateType(metadata.name));
        }
        debug!(type_name = %metadata.name, embedded = metadata.embedded, "registered type");
        self.order.push(metadata.name.clone());
        self.types.insert(metadata.name.clone(), Arc::new(metadata));
        Ok(())
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Check that every referenced, embedded and parent type exists, that
    /// embed targets are embedded types, and that inheritance is acyclic.
    pub fn validate(&self) -> SchemaResult<()> {
        for name in &self.order {
            let metadata = &self.types[name];
            self.inheritance_chain(name)?;

            for decl in metadata
                .references_one
                .iter()
                .chain(metadata.references_many.iter())
            {
                match &decl.target {
                    ReferenceTarget::Single(target) => self.require_link(name, target)?,
                    ReferenceTarget::Polymorphic { aliases, .. } => {
                        for target in aliases.values() {
                            self.require_link(name, target)?;
                        }
                    }
                }
            }

            for decl in metadata.embeddeds() {
                self.require_link(name, &decl.target)?;
                if !self.types[&decl.target].embedded {
                    return Err(SchemaError::InvalidDefinition {
                        type_name: name.clone(),
                        reason: format!(
                            "field {} embeds {}, which is not an embedded type",
                            decl.name, decl.target
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    fn require_link(&self, owner: &str, target: &str) -> SchemaResult<()> {
        if self.types.contains_key(target) {
            Ok(())
        } else {
            Err(SchemaError::InvalidDefinition {
                type_name: owner.to_string(),
                reason: format!("unknown target type {target}"),
            })
        }
    }
}

impl MetadataSource for Schema {
    fn metadata_for(&self, type_name: &str) -> Option<Arc<TypeMetadata>> {
        self.types.get(type_name).cloned()
    }

    fn type_names(&self) -> Vec<String> {
        self.order.clone()
    }
}
