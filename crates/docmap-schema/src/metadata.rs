//! Per-type field declarations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field name under which polymorphic references store their concrete type
/// when no other name is configured.
pub const DEFAULT_DISCRIMINATOR_FIELD: &str = "_type";

/// Short alias → concrete type name, for polymorphic references.
pub type AliasTable = BTreeMap<String, String>;

/// The kind of a declared (non-scalar) field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    ReferenceOne,
    ReferenceMany,
    EmbeddedOne,
    EmbeddedMany,
}

/// What a reference field points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceTarget {
    /// One declared type (or any type extending it).
    Single(String),
    /// Any of several concrete types, told apart by a discriminator value
    /// stored next to the identity.
    ///
    /// With an empty alias table every document type is acceptable and the
    /// literal type name is stored. Otherwise only aliased types are
    /// acceptable and the alias is stored.
    Polymorphic {
        discriminator_field: String,
        aliases: AliasTable,
    },
}

impl ReferenceTarget {
    /// A reference to exactly one declared type.
    pub fn single(type_name: impl Into<String>) -> Self {
        Self::Single(type_name.into())
    }

    /// A polymorphic reference using the default discriminator field and no
    /// alias table.
    pub fn polymorphic() -> Self {
        Self::Polymorphic {
            discriminator_field: DEFAULT_DISCRIMINATOR_FIELD.to_string(),
            aliases: AliasTable::new(),
        }
    }

    /// A polymorphic reference with a custom discriminator field and alias
    /// table.
    pub fn polymorphic_with(
        discriminator_field: impl Into<String>,
        aliases: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self::Polymorphic {
            discriminator_field: discriminator_field.into(),
            aliases: aliases
                .into_iter()
                .map(|(alias, ty)| (alias.into(), ty.into()))
                .collect(),
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self, Self::Polymorphic { .. })
    }

    /// The discriminator field name, for polymorphic targets.
    pub fn discriminator_field(&self) -> Option<&str> {
        match self {
            Self::Single(_) => None,
            Self::Polymorphic {
                discriminator_field,
                ..
            } => Some(discriminator_field),
        }
    }

    /// The alias table, for polymorphic targets.
    pub fn aliases(&self) -> Option<&AliasTable> {
        match self {
            Self::Single(_) => None,
            Self::Polymorphic { aliases, .. } => Some(aliases),
        }
    }

    /// Resolve a stored discriminator value to a concrete type name.
    ///
    /// Aliases win over literal type names. For a single target the declared
    /// type is returned regardless of `value`.
    pub fn resolve_discriminator(&self, value: &str) -> String {
        match self {
            Self::Single(target) => target.clone(),
            Self::Polymorphic { aliases, .. } => aliases
                .get(value)
                .cloned()
                .unwrap_or_else(|| value.to_string()),
        }
    }

    /// The discriminator value to store for an entity of `type_name`.
    ///
    /// `None` when the type has no alias in a non-empty alias table, or the
    /// target is not polymorphic.
    pub fn discriminator_value(&self, type_name: &str) -> Option<String> {
        match self {
            Self::Single(_) => None,
            Self::Polymorphic { aliases, .. } if aliases.is_empty() => {
                Some(type_name.to_string())
            }
            Self::Polymorphic { aliases, .. } => aliases
                .iter()
                .find(|(_, ty)| ty.as_str() == type_name)
                .map(|(alias, _)| alias.clone()),
        }
    }
}

impl From<&str> for ReferenceTarget {
    fn from(type_name: &str) -> Self {
        Self::Single(type_name.to_string())
    }
}

impl From<String> for ReferenceTarget {
    fn from(type_name: String) -> Self {
        Self::Single(type_name)
    }
}

/// A declared reference field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDecl {
    pub name: String,
    pub target: ReferenceTarget,
}

/// A declared embedded field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedDecl {
    pub name: String,
    pub target: String,
}

/// Metadata for one entity type.
///
/// Declarations keep their declaration order; loading and encoding walk
/// fields in that order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMetadata {
    pub name: String,
    /// Embedded types have no independent store identity lifecycle.
    pub embedded: bool,
    /// Parent type whose reference declarations this type inherits.
    pub inheritance: Option<String>,
    pub references_one: Vec<ReferenceDecl>,
    pub references_many: Vec<ReferenceDecl>,
    pub embeddeds_one: Vec<EmbeddedDecl>,
    pub embeddeds_many: Vec<EmbeddedDecl>,
}

impl TypeMetadata {
    fn bare(name: impl Into<String>, embedded: bool) -> Self {
        Self {
            name: name.into(),
            embedded,
            inheritance: None,
            references_one: Vec::new(),
            references_many: Vec::new(),
            embeddeds_one: Vec::new(),
            embeddeds_many: Vec::new(),
        }
    }

    /// A top-level (independently stored) type.
    pub fn document(name: impl Into<String>) -> Self {
        Self::bare(name, false)
    }

    /// An embedded type.
    pub fn embedded(name: impl Into<String>) -> Self {
        Self::bare(name, true)
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.inheritance = Some(parent.into());
        self
    }

    pub fn reference_one(
        mut self,
        name: impl Into<String>,
        target: impl Into<ReferenceTarget>,
    ) -> Self {
        self.references_one.push(ReferenceDecl {
            name: name.into(),
            target: target.into(),
        });
        self
    }

    pub fn reference_many(
        mut self,
        name: impl Into<String>,
        target: impl Into<ReferenceTarget>,
    ) -> Self {
        self.references_many.push(ReferenceDecl {
            name: name.into(),
            target: target.into(),
        });
        self
    }

    pub fn embeds_one(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.embeddeds_one.push(EmbeddedDecl {
            name: name.into(),
            target: target.into(),
        });
        self
    }

    pub fn embeds_many(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.embeddeds_many.push(EmbeddedDecl {
            name: name.into(),
            target: target.into(),
        });
        self
    }

    /// Whether this type itself declares outward references. Inherited
    /// declarations are not considered; see
    /// [`MetadataSource::has_references`](crate::MetadataSource::has_references).
    pub fn declares_references(&self) -> bool {
        !self.references_one.is_empty() || !self.references_many.is_empty()
    }

    /// All embedded declarations: embedded-one first, then embedded-many.
    pub fn embeddeds(&self) -> impl Iterator<Item = &EmbeddedDecl> {
        self.embeddeds_one.iter().chain(self.embeddeds_many.iter())
    }

    pub fn embedded_one(&self, name: &str) -> Option<&EmbeddedDecl> {
        self.embeddeds_one.iter().find(|decl| decl.name == name)
    }

    pub fn embedded_many(&self, name: &str) -> Option<&EmbeddedDecl> {
        self.embeddeds_many.iter().find(|decl| decl.name == name)
    }
}

/// Reference declarations of a type merged with those of its ancestors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceFields {
    pub one: Vec<ReferenceDecl>,
    pub many: Vec<ReferenceDecl>,
}

impl ReferenceFields {
    pub fn find_one(&self, name: &str) -> Option<&ReferenceDecl> {
        self.one.iter().find(|decl| decl.name == name)
    }

    pub fn find_many(&self, name: &str) -> Option<&ReferenceDecl> {
        self.many.iter().find(|decl| decl.name == name)
    }

    /// Whether `name` is any reference field.
    pub fn contains(&self, name: &str) -> bool {
        self.find_one(name).is_some() || self.find_many(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.one.is_empty() && self.many.is_empty()
    }
}
