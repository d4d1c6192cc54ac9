//! Schema files.
//!
//! A schema file is a list of types. Fields are arrays of tables so that
//! declaration order survives parsing:
//!
//! ```toml
//! [[types]]
//! name = "Article"
//! references_one = [
//!     { name = "author", target = "Author" },
//!     { name = "like", polymorphic = true },
//!     { name = "friend", polymorphic = true, discriminator_field = "name", aliases = { au = "Author" } },
//! ]
//! embeddeds_many = [{ name = "comments", target = "Comment" }]
//!
//! [[types]]
//! name = "Comment"
//! embedded = true
//! ```

use serde::Deserialize;

use crate::error::{SchemaError, SchemaResult};
use crate::metadata::{
    AliasTable, EmbeddedDecl, ReferenceDecl, ReferenceTarget, TypeMetadata,
    DEFAULT_DISCRIMINATOR_FIELD,
};
use crate::registry::Schema;

/// Top-level shape of a schema file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    #[serde(default)]
    pub types: Vec<TypeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeSpec {
    pub name: String,
    #[serde(default)]
    pub embedded: bool,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub references_one: Vec<ReferenceSpec>,
    #[serde(default)]
    pub references_many: Vec<ReferenceSpec>,
    #[serde(default)]
    pub embeddeds_one: Vec<EmbeddedDecl>,
    #[serde(default)]
    pub embeddeds_many: Vec<EmbeddedDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceSpec {
    pub name: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub polymorphic: bool,
    #[serde(default)]
    pub discriminator_field: Option<String>,
    #[serde(default)]
    pub aliases: AliasTable,
}

impl ReferenceSpec {
    fn into_decl(self, type_name: &str) -> SchemaResult<ReferenceDecl> {
        let target = match (self.polymorphic, self.target) {
            (true, None) => ReferenceTarget::Polymorphic {
                discriminator_field: self
                    .discriminator_field
                    .unwrap_or_else(|| DEFAULT_DISCRIMINATOR_FIELD.to_string()),
                aliases: self.aliases,
            },
            (false, Some(target)) if self.aliases.is_empty() => ReferenceTarget::Single(target),
            (true, Some(_)) => {
                return Err(invalid(type_name, &self.name, "polymorphic reference with a target"))
            }
            (false, Some(_)) => {
                return Err(invalid(type_name, &self.name, "aliases on a single-type reference"))
            }
            (false, None) => return Err(invalid(type_name, &self.name, "missing target")),
        };
        Ok(ReferenceDecl {
            name: self.name,
            target,
        })
    }
}

fn invalid(type_name: &str, field: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidDefinition {
        type_name: type_name.to_string(),
        reason: format!("field {field}: {reason}"),
    }
}

impl TypeSpec {
    fn into_metadata(self) -> SchemaResult<TypeMetadata> {
        let name = self.name;
        let references_one = self
            .references_one
            .into_iter()
            .map(|spec| spec.into_decl(&name))
            .collect::<SchemaResult<Vec<_>>>()?;
        let references_many = self
            .references_many
            .into_iter()
            .map(|spec| spec.into_decl(&name))
            .collect::<SchemaResult<Vec<_>>>()?;

        Ok(TypeMetadata {
            name,
            embedded: self.embedded,
            inheritance: self.extends,
            references_one,
            references_many,
            embeddeds_one: self.embeddeds_one,
            embeddeds_many: self.embeddeds_many,
        })
    }
}

impl SchemaFile {
    /// Build and validate a [`Schema`] from the parsed file.
    pub fn into_schema(self) -> SchemaResult<Schema> {
        let types = self
            .types
            .into_iter()
            .map(TypeSpec::into_metadata)
            .collect::<SchemaResult<Vec<_>>>()?;
        Schema::from_types(types)
    }
}
