//! The [`MetadataSource`] trait: the schema service the rest of docmap reads.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{SchemaError, SchemaResult};
use crate::metadata::{ReferenceDecl, ReferenceFields, ReferenceTarget, TypeMetadata};

/// Lookup of per-type metadata.
///
/// Implementations only need to answer `metadata_for` and `type_names`;
/// inheritance walking and flattening are provided on top of them.
pub trait MetadataSource: Send + Sync {
    /// Metadata for `type_name`, or `None` if the type is unknown.
    fn metadata_for(&self, type_name: &str) -> Option<Arc<TypeMetadata>>;

    /// All known type names, in registration order.
    fn type_names(&self) -> Vec<String>;

    /// Metadata for `type_name`, failing on unknown types.
    fn require(&self, type_name: &str) -> SchemaResult<Arc<TypeMetadata>> {
        self.metadata_for(type_name)
            .ok_or_else(|| SchemaError::UnknownType(type_name.to_string()))
    }

    /// The type followed by each of its ancestors, nearest first.
    fn inheritance_chain(&self, type_name: &str) -> SchemaResult<Vec<Arc<TypeMetadata>>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(type_name.to_string());

        while let Some(name) = current {
            if !seen.insert(name.clone()) {
                return Err(SchemaError::InheritanceCycle(type_name.to_string()));
            }
            let metadata = self.require(&name)?;
            current = metadata.inheritance.clone();
            chain.push(metadata);
        }

        Ok(chain)
    }

    /// Reference declarations of `type_name` including inherited ones.
    ///
    /// Ancestor declarations come first. When a type redeclares a field
    /// name its own declaration replaces the ancestor's in place.
    fn reference_fields(&self, type_name: &str) -> SchemaResult<ReferenceFields> {
        let chain = self.inheritance_chain(type_name)?;
        let mut fields = ReferenceFields::default();

        for metadata in chain.iter().rev() {
            merge_declarations(&mut fields.one, &metadata.references_one);
            merge_declarations(&mut fields.many, &metadata.references_many);
        }

        Ok(fields)
    }

    /// Whether `type_name` has any reference field, inherited ones
    /// included.
    fn has_references(&self, type_name: &str) -> SchemaResult<bool> {
        Ok(!self.reference_fields(type_name)?.is_empty())
    }

    /// Whether `candidate` is `target` or extends it.
    fn is_subtype(&self, candidate: &str, target: &str) -> SchemaResult<bool> {
        Ok(self
            .inheritance_chain(candidate)?
            .iter()
            .any(|metadata| metadata.name == target))
    }

    /// Whether an entity of type `candidate` may be stored in a field
    /// declared with `target`.
    fn accepts(&self, target: &ReferenceTarget, candidate: &str) -> SchemaResult<bool> {
        match target {
            ReferenceTarget::Single(declared) => self.is_subtype(candidate, declared),
            ReferenceTarget::Polymorphic { aliases, .. } if aliases.is_empty() => {
                Ok(!self.require(candidate)?.embedded)
            }
            ReferenceTarget::Polymorphic { aliases, .. } => {
                Ok(aliases.values().any(|ty| ty == candidate))
            }
        }
    }
}

fn merge_declarations(into: &mut Vec<ReferenceDecl>, declarations: &[ReferenceDecl]) {
    for decl in declarations {
        match into.iter_mut().find(|existing| existing.name == decl.name) {
            Some(existing) => *existing = decl.clone(),
            None => into.push(decl.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Schema;

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .register(
                TypeMetadata::document("Content")
                    .reference_one("owner", "User")
                    .reference_many("tags", "Tag"),
            )
            .unwrap();
        schema
            .register(
                TypeMetadata::document("Article")
                    .extends("Content")
                    .reference_one("category", "Category")
                    .reference_one("owner", "Admin"),
            )
            .unwrap();
        schema
            .register(TypeMetadata::document("Video").extends("Article"))
            .unwrap();
        for name in ["User", "Tag", "Category"] {
            schema.register(TypeMetadata::document(name)).unwrap();
        }
        schema
            .register(TypeMetadata::document("Admin").extends("User"))
            .unwrap();
        schema
            .register(TypeMetadata::embedded("Address"))
            .unwrap();
        schema
    }

    #[test]
    fn chain_is_nearest_first() {
        let schema = schema();
        let chain: Vec<_> = schema
            .inheritance_chain("Video")
            .unwrap()
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(chain, vec!["Video", "Article", "Content"]);
    }

    #[test]
    fn flattening_puts_ancestors_first() {
        let fields = schema().reference_fields("Video").unwrap();
        let names: Vec<_> = fields.one.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["owner", "category"]);
        assert_eq!(fields.many.len(), 1);
        assert_eq!(fields.many[0].name, "tags");
    }

    #[test]
    fn own_declaration_shadows_ancestor() {
        let fields = schema().reference_fields("Article").unwrap();
        let owner = fields.find_one("owner").unwrap();
        assert_eq!(owner.target, ReferenceTarget::single("Admin"));
    }

    #[test]
    fn inherited_references_count() {
        let mut schema = schema();
        schema
            .register(TypeMetadata::embedded("BaseNote").reference_one("author", "User"))
            .unwrap();
        schema
            .register(TypeMetadata::embedded("Note").extends("BaseNote"))
            .unwrap();
        assert!(schema.has_references("Note").unwrap());
        assert!(schema.has_references("Video").unwrap());
        assert!(!schema.has_references("Address").unwrap());
        assert!(!schema.require("Note").unwrap().declares_references());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let err = schema().reference_fields("Nope").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType(name) if name == "Nope"));
    }

    #[test]
    fn inheritance_cycle_is_detected() {
        let mut schema = Schema::new();
        schema
            .register(TypeMetadata::document("A").extends("B"))
            .unwrap();
        schema
            .register(TypeMetadata::document("B").extends("A"))
            .unwrap();
        let err = schema.inheritance_chain("A").unwrap_err();
        assert!(matches!(err, SchemaError::InheritanceCycle(_)));
    }

    // -----------------------------------------------------------------------
    // Target acceptance
    // -----------------------------------------------------------------------

    #[test]
    fn single_target_accepts_subtypes() {
        let schema = schema();
        let target = ReferenceTarget::single("User");
        assert!(schema.accepts(&target, "User").unwrap());
        assert!(schema.accepts(&target, "Admin").unwrap());
        assert!(!schema.accepts(&target, "Tag").unwrap());
    }

    #[test]
    fn open_polymorphic_accepts_any_document_type() {
        let schema = schema();
        let target = ReferenceTarget::polymorphic();
        assert!(schema.accepts(&target, "Tag").unwrap());
        assert!(!schema.accepts(&target, "Address").unwrap());
    }

    #[test]
    fn aliased_polymorphic_accepts_only_aliased_types() {
        let schema = schema();
        let target = ReferenceTarget::polymorphic_with("name", [("us", "User")]);
        assert!(schema.accepts(&target, "User").unwrap());
        assert!(!schema.accepts(&target, "Category").unwrap());
    }
}
