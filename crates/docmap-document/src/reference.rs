//! Stored form of references.
//!
//! A single-type reference is stored as the target's id string. A
//! polymorphic reference is stored as a two-key object: the discriminator
//! (type name or alias, under the configured field name) and `"id"`.

use docmap_schema::{ReferenceDecl, ReferenceTarget};
use docmap_types::EntityId;
use serde_json::Value;

use crate::entity::Entity;
use crate::error::{DocumentError, DocumentResult};

/// Key holding the identity inside a polymorphic reference.
pub const REFERENCE_ID_FIELD: &str = "id";

/// Encode a reference from an entity of `owner_type` to `target`.
pub fn encode(owner_type: &str, decl: &ReferenceDecl, target: &Entity) -> DocumentResult<Value> {
    match &decl.target {
        ReferenceTarget::Single(_) => Ok(Value::String(target.id().to_string())),
        ReferenceTarget::Polymorphic {
            discriminator_field,
            ..
        } => {
            let discriminator = decl
                .target
                .discriminator_value(target.type_name())
                .ok_or_else(|| DocumentError::InvalidTargetType {
                    type_name: owner_type.to_string(),
                    field: decl.name.clone(),
                    actual: target.type_name().to_string(),
                })?;
            let mut pair = serde_json::Map::new();
            pair.insert(discriminator_field.clone(), Value::String(discriminator));
            pair.insert(
                REFERENCE_ID_FIELD.to_string(),
                Value::String(target.id().to_string()),
            );
            Ok(Value::Object(pair))
        }
    }
}

/// Decode a stored reference into the concrete target type and identity.
pub fn decode(
    owner_type: &str,
    decl: &ReferenceDecl,
    raw: &Value,
) -> DocumentResult<(String, EntityId)> {
    let invalid = |reason: &str| DocumentError::InvalidStoredValue {
        type_name: owner_type.to_string(),
        field: decl.name.clone(),
        reason: reason.to_string(),
    };

    match &decl.target {
        ReferenceTarget::Single(target) => {
            let id = raw.as_str().ok_or_else(|| invalid("expected an id string"))?;
            Ok((target.clone(), EntityId::parse(id)?))
        }
        ReferenceTarget::Polymorphic {
            discriminator_field,
            ..
        } => {
            let pair = raw
                .as_object()
                .ok_or_else(|| invalid("expected a discriminator/id object"))?;
            let discriminator = pair
                .get(discriminator_field)
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("missing discriminator"))?;
            let id = pair
                .get(REFERENCE_ID_FIELD)
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("missing id"))?;
            Ok((
                decl.target.resolve_discriminator(discriminator),
                EntityId::parse(id)?,
            ))
        }
    }
}

/// Decode a stored array of references, keeping stored order.
pub fn decode_list(
    owner_type: &str,
    decl: &ReferenceDecl,
    raw: &Value,
) -> DocumentResult<Vec<(String, EntityId)>> {
    let items = raw
        .as_array()
        .ok_or_else(|| DocumentError::InvalidStoredValue {
            type_name: owner_type.to_string(),
            field: decl.name.clone(),
            reason: "expected an array".to_string(),
        })?;
    items
        .iter()
        .map(|item| decode(owner_type, decl, item))
        .collect()
}
