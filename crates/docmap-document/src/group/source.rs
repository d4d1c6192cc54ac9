//! Baseline sources: how a group learns what the store already holds.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use docmap_schema::{AliasTable, EmbeddedDecl, ReferenceDecl};
use docmap_types::EntityId;
use serde_json::Value;

use crate::entity::{Entity, EntityRef};
use crate::error::{DocumentError, DocumentResult};
use crate::gateway::Criteria;
use crate::reference;

/// Materialises the saved baseline of a group.
///
/// Failures are passed to the caller of [`Group::saved`](super::Group::saved)
/// unchanged.
pub trait BaselineSource: Send + Sync {
    fn load_saved(&self) -> DocumentResult<Vec<EntityRef>>;

    /// Discriminator field name, for polymorphic sources.
    fn discriminator_field(&self) -> Option<&str> {
        None
    }

    /// Alias table, for polymorphic sources.
    fn discriminator_map(&self) -> Option<&AliasTable> {
        None
    }
}

fn upgrade(owner: &Weak<Entity>) -> DocumentResult<EntityRef> {
    owner.upgrade().ok_or(DocumentError::OwnerDropped)
}

/// Baseline of a single-type multi-reference field.
pub struct ReferenceSource {
    owner: Weak<Entity>,
    decl: ReferenceDecl,
}

impl ReferenceSource {
    pub fn new(owner: Weak<Entity>, decl: ReferenceDecl) -> Self {
        Self { owner, decl }
    }
}

impl BaselineSource for ReferenceSource {
    fn load_saved(&self) -> DocumentResult<Vec<EntityRef>> {
        let owner = upgrade(&self.owner)?;
        let Some(raw) = owner.stored_field_value(&self.decl.name)? else {
            return Ok(Vec::new());
        };
        let pairs = reference::decode_list(owner.type_name(), &self.decl, &raw)?;
        let Some((target, _)) = pairs.first() else {
            return Ok(Vec::new());
        };
        let target = target.clone();
        let ids = pairs.into_iter().map(|(_, id)| id).collect();
        owner.gateway()?.fetch_by_criteria(&target, &Criteria::Ids(ids))
    }
}

/// Baseline of a polymorphic multi-reference field.
///
/// Stored pairs are grouped by concrete type so each type is fetched once;
/// the result follows stored pair order. Pairs whose document is gone are
/// skipped.
pub struct PolymorphicReferenceSource {
    owner: Weak<Entity>,
    decl: ReferenceDecl,
}

impl PolymorphicReferenceSource {
    pub fn new(owner: Weak<Entity>, decl: ReferenceDecl) -> Self {
        Self { owner, decl }
    }
}

impl BaselineSource for PolymorphicReferenceSource {
    fn load_saved(&self) -> DocumentResult<Vec<EntityRef>> {
        let owner = upgrade(&self.owner)?;
        let Some(raw) = owner.stored_field_value(&self.decl.name)? else {
            return Ok(Vec::new());
        };
        let pairs = reference::decode_list(owner.type_name(), &self.decl, &raw)?;
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_type: BTreeMap<&str, Vec<EntityId>> = BTreeMap::new();
        for (type_name, id) in &pairs {
            by_type.entry(type_name.as_str()).or_default().push(*id);
        }

        let gateway = owner.gateway()?;
        let mut fetched: HashMap<(&str, EntityId), EntityRef> = HashMap::new();
        for (type_name, ids) in by_type {
            for entity in gateway.fetch_by_criteria(type_name, &Criteria::Ids(ids))? {
                fetched.insert((type_name, entity.id()), entity);
            }
        }

        Ok(pairs
            .iter()
            .filter_map(|(type_name, id)| fetched.get(&(type_name.as_str(), *id)).cloned())
            .collect())
    }

    fn discriminator_field(&self) -> Option<&str> {
        self.decl.target.discriminator_field()
    }

    fn discriminator_map(&self) -> Option<&AliasTable> {
        self.decl.target.aliases()
    }
}

/// Baseline of an embedded-many field, rebuilt from the owner's stored
/// sub-documents.
pub struct EmbeddedSource {
    owner: Weak<Entity>,
    decl: EmbeddedDecl,
}

impl EmbeddedSource {
    pub fn new(owner: Weak<Entity>, decl: EmbeddedDecl) -> Self {
        Self { owner, decl }
    }
}

impl BaselineSource for EmbeddedSource {
    fn load_saved(&self) -> DocumentResult<Vec<EntityRef>> {
        let owner = upgrade(&self.owner)?;
        let Some(raw) = owner.stored_field_value(&self.decl.name)? else {
            return Ok(Vec::new());
        };
        let invalid = |reason: &str| DocumentError::InvalidStoredValue {
            type_name: owner.type_name().to_string(),
            field: self.decl.name.clone(),
            reason: reason.to_string(),
        };

        let Value::Array(items) = raw else {
            return Err(invalid("expected an array"));
        };
        let metadata = owner.schema().require(&self.decl.target)?;
        items
            .iter()
            .map(|item| {
                let document = item
                    .as_object()
                    .ok_or_else(|| invalid("expected an embedded document"))?;
                Entity::from_stored_document(
                    Arc::clone(&metadata),
                    Arc::clone(owner.schema()),
                    owner.gateway_handle(),
                    document,
                )
            })
            .collect()
    }
}
