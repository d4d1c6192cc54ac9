//! Live entities.
//!
//! An [`Entity`] is shared through [`EntityRef`] handles. Its identity and
//! type are fixed at construction; everything else lives behind a lock so
//! that the same instance can be linked from many places in a graph.
//!
//! Relationship fields hydrated from the store keep their stored form until
//! first read, then resolve through the gateway and cache the live entity.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use docmap_schema::{FieldKind, MetadataSource, ReferenceFields, TypeMetadata};
use docmap_types::EntityId;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DocumentError, DocumentResult};
use crate::gateway::{DocumentStore, StoredDocument, ID_FIELD, TYPE_FIELD};
use crate::group::{
    BaselineSource, EmbeddedSource, Group, PolymorphicReferenceSource, ReferenceSource,
};
use crate::reference;

/// Shared handle to an entity. Equality is identity equality.
pub type EntityRef = Arc<Entity>;

/// An identified, typed record.
pub struct Entity {
    id: EntityId,
    metadata: Arc<TypeMetadata>,
    schema: Arc<dyn MetadataSource>,
    gateway: Weak<dyn DocumentStore>,
    this: Weak<Entity>,
    state: RwLock<EntityState>,
}

#[derive(Clone, Default)]
struct EntityState {
    fields: Map<String, Value>,
    references: BTreeMap<String, EntityRef>,
    raw_references: BTreeMap<String, Value>,
    embedded: BTreeMap<String, EntityRef>,
    raw_embedded: BTreeMap<String, StoredDocument>,
    groups: BTreeMap<String, Arc<Mutex<Group>>>,
    /// Last stored form of multi-valued fields.
    raw_groups: BTreeMap<String, Value>,
    persisted: bool,
}

impl Entity {
    /// Create a new entity with a freshly generated identity.
    pub fn create(
        metadata: Arc<TypeMetadata>,
        schema: Arc<dyn MetadataSource>,
        gateway: Weak<dyn DocumentStore>,
    ) -> EntityRef {
        Self::with_id(EntityId::new(), metadata, schema, gateway)
    }

    /// Create a new entity with a caller-supplied identity.
    pub fn with_id(
        id: EntityId,
        metadata: Arc<TypeMetadata>,
        schema: Arc<dyn MetadataSource>,
        gateway: Weak<dyn DocumentStore>,
    ) -> EntityRef {
        Self::build(id, metadata, schema, gateway, EntityState::default())
    }

    fn build(
        id: EntityId,
        metadata: Arc<TypeMetadata>,
        schema: Arc<dyn MetadataSource>,
        gateway: Weak<dyn DocumentStore>,
        state: EntityState,
    ) -> EntityRef {
        Arc::new_cyclic(|this| Self {
            id,
            metadata,
            schema,
            gateway,
            this: this.clone(),
            state: RwLock::new(state),
        })
    }

    /// Rebuild an entity from its stored document.
    ///
    /// Top-level documents must carry `_id`; embedded ones get a session-local
    /// identity.
    pub fn from_stored_document(
        metadata: Arc<TypeMetadata>,
        schema: Arc<dyn MetadataSource>,
        gateway: Weak<dyn DocumentStore>,
        document: &StoredDocument,
    ) -> DocumentResult<EntityRef> {
        let id = if metadata.embedded {
            EntityId::new()
        } else {
            let raw = document
                .get(ID_FIELD)
                .and_then(Value::as_str)
                .ok_or_else(|| DocumentError::InvalidStoredValue {
                    type_name: metadata.name.clone(),
                    field: ID_FIELD.to_string(),
                    reason: "missing id".to_string(),
                })?;
            EntityId::parse(raw)?
        };

        let references = schema.reference_fields(&metadata.name)?;
        let mut state = EntityState {
            persisted: true,
            ..EntityState::default()
        };

        for (name, value) in document {
            if name == ID_FIELD || name == TYPE_FIELD {
                continue;
            }
            let is_relationship = references.contains(name)
                || metadata.embedded_one(name).is_some()
                || metadata.embedded_many(name).is_some();
            if is_relationship && value.is_null() {
                continue;
            }

            if references.find_one(name).is_some() {
                state.raw_references.insert(name.clone(), value.clone());
            } else if references.find_many(name).is_some() || metadata.embedded_many(name).is_some()
            {
                state.raw_groups.insert(name.clone(), value.clone());
            } else if metadata.embedded_one(name).is_some() {
                let sub = value
                    .as_object()
                    .ok_or_else(|| DocumentError::InvalidStoredValue {
                        type_name: metadata.name.clone(),
                        field: name.clone(),
                        reason: "expected an embedded document".to_string(),
                    })?;
                state.raw_embedded.insert(name.clone(), sub.clone());
            } else {
                state.fields.insert(name.clone(), value.clone());
            }
        }

        Ok(Self::build(id, metadata, schema, gateway, state))
    }

    fn read(&self) -> RwLockReadGuard<'_, EntityState> {
        self.state.read().expect("lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, EntityState> {
        self.state.write().expect("lock poisoned")
    }

    // ---------------------------------------------------------------
    // Identity
    // ---------------------------------------------------------------

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &Arc<TypeMetadata> {
        &self.metadata
    }

    pub fn schema(&self) -> &Arc<dyn MetadataSource> {
        &self.schema
    }

    pub fn is_embedded(&self) -> bool {
        self.metadata.embedded
    }

    /// `true` until the entity has been written to (or read from) the store.
    pub fn is_new(&self) -> bool {
        !self.read().persisted
    }

    pub fn mark_persisted(&self) {
        self.write().persisted = true;
    }

    /// Whether two handles point at the very same instance.
    pub fn ptr_eq(a: &EntityRef, b: &EntityRef) -> bool {
        Arc::ptr_eq(a, b)
    }

    /// The gateway this entity was created by.
    pub fn gateway(&self) -> DocumentResult<Arc<dyn DocumentStore>> {
        self.gateway.upgrade().ok_or(DocumentError::GatewayClosed)
    }

    pub(crate) fn gateway_handle(&self) -> Weak<dyn DocumentStore> {
        self.gateway.clone()
    }

    /// Reference declarations of this type, inherited ones included.
    pub fn reference_fields(&self) -> DocumentResult<ReferenceFields> {
        Ok(self.schema.reference_fields(self.type_name())?)
    }

    /// Kind of a relationship field, `None` for scalars.
    pub fn field_kind(&self, field: &str) -> DocumentResult<Option<FieldKind>> {
        let references = self.reference_fields()?;
        Ok(if references.find_one(field).is_some() {
            Some(FieldKind::ReferenceOne)
        } else if references.find_many(field).is_some() {
            Some(FieldKind::ReferenceMany)
        } else if self.metadata.embedded_one(field).is_some() {
            Some(FieldKind::EmbeddedOne)
        } else if self.metadata.embedded_many(field).is_some() {
            Some(FieldKind::EmbeddedMany)
        } else {
            None
        })
    }

    fn unknown_field(&self, field: &str) -> DocumentError {
        DocumentError::UnknownField {
            type_name: self.type_name().to_string(),
            field: field.to_string(),
        }
    }

    fn invalid_target(&self, field: &str, actual: &str) -> DocumentError {
        DocumentError::InvalidTargetType {
            type_name: self.type_name().to_string(),
            field: field.to_string(),
            actual: actual.to_string(),
        }
    }

    // ---------------------------------------------------------------
    // Scalars
    // ---------------------------------------------------------------

    pub fn get(&self, field: &str) -> Option<Value> {
        self.read().fields.get(field).cloned()
    }

    /// All scalar fields.
    pub fn fields(&self) -> Map<String, Value> {
        self.read().fields.clone()
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> DocumentResult<()> {
        if self.field_kind(field)?.is_some() {
            return Err(DocumentError::FieldKindMismatch {
                type_name: self.type_name().to_string(),
                field: field.to_string(),
                expected: "scalar",
            });
        }
        self.write().fields.insert(field.to_string(), value.into());
        Ok(())
    }

    pub fn unset(&self, field: &str) -> Option<Value> {
        self.write().fields.remove(field)
    }

    /// Bulk-assign raw data.
    ///
    /// Scalars are stored as given. Embedded fields take raw sub-records
    /// (an object, or an array of objects for embedded-many) and become
    /// plain embedded entities; nothing inside them is resolved. `null`
    /// clears an embedded field. Reference fields cannot be assigned this
    /// way.
    pub fn assign(&self, data: Map<String, Value>) -> DocumentResult<()> {
        for (field, value) in data {
            match self.field_kind(&field)? {
                None => {
                    self.write().fields.insert(field, value);
                }
                Some(FieldKind::EmbeddedOne) => {
                    if value.is_null() {
                        self.clear_embedded(&field)?;
                        continue;
                    }
                    let target = self.embedded_target(&field)?;
                    let child = self.build_embedded(&field, &target, value)?;
                    self.set_embedded(&field, &child)?;
                }
                Some(FieldKind::EmbeddedMany) => {
                    if value.is_null() {
                        self.with_group(&field, |group| group.replace(Vec::new()))??;
                        continue;
                    }
                    let target = self.embedded_target(&field)?;
                    let Value::Array(items) = value else {
                        return Err(DocumentError::InvalidStoredValue {
                            type_name: self.type_name().to_string(),
                            field,
                            reason: "expected an array of sub-records".to_string(),
                        });
                    };
                    let children = items
                        .into_iter()
                        .map(|item| self.build_embedded(&field, &target, item))
                        .collect::<DocumentResult<Vec<_>>>()?;
                    self.with_group(&field, |group| group.add_many(children))?;
                }
                Some(_) => {
                    return Err(DocumentError::FieldKindMismatch {
                        type_name: self.type_name().to_string(),
                        field,
                        expected: "scalar or embedded",
                    })
                }
            }
        }
        Ok(())
    }

    fn embedded_target(&self, field: &str) -> DocumentResult<String> {
        self.metadata
            .embedded_one(field)
            .or_else(|| self.metadata.embedded_many(field))
            .map(|decl| decl.target.clone())
            .ok_or_else(|| self.unknown_field(field))
    }

    fn build_embedded(&self, field: &str, target: &str, value: Value) -> DocumentResult<EntityRef> {
        let Value::Object(data) = value else {
            return Err(DocumentError::InvalidStoredValue {
                type_name: self.type_name().to_string(),
                field: field.to_string(),
                reason: "expected a sub-record object".to_string(),
            });
        };
        let child = Entity::create(
            self.schema.require(target)?,
            Arc::clone(&self.schema),
            self.gateway.clone(),
        );
        child.assign(data)?;
        Ok(child)
    }

    // ---------------------------------------------------------------
    // Single references
    // ---------------------------------------------------------------

    /// The entity a single-reference field points at.
    ///
    /// A reference still in stored form is fetched through the gateway on
    /// first read and cached.
    pub fn reference(&self, field: &str) -> DocumentResult<Option<EntityRef>> {
        let references = self.reference_fields()?;
        let decl = references
            .find_one(field)
            .ok_or_else(|| self.unknown_field(field))?;

        let raw = {
            let state = self.read();
            if let Some(target) = state.references.get(field) {
                return Ok(Some(Arc::clone(target)));
            }
            state.raw_references.get(field).cloned()
        };
        let Some(raw) = raw else {
            return Ok(None);
        };

        let (type_name, id) = reference::decode(self.type_name(), decl, &raw)?;
        let resolved = self.gateway()?.fetch_one(&type_name, &id)?;
        if let Some(target) = &resolved {
            let mut state = self.write();
            state.raw_references.remove(field);
            state
                .references
                .insert(field.to_string(), Arc::clone(target));
        }
        Ok(resolved)
    }

    /// Point a single-reference field at `target`.
    ///
    /// Fails with [`DocumentError::InvalidTargetType`] when `target` is not
    /// an instance of an acceptable type for the field.
    pub fn set_reference(&self, field: &str, target: &EntityRef) -> DocumentResult<()> {
        let references = self.reference_fields()?;
        let decl = references
            .find_one(field)
            .ok_or_else(|| self.unknown_field(field))?;
        if target.is_embedded() || !self.schema.accepts(&decl.target, target.type_name())? {
            return Err(self.invalid_target(field, target.type_name()));
        }

        let mut state = self.write();
        state.raw_references.remove(field);
        state
            .references
            .insert(field.to_string(), Arc::clone(target));
        Ok(())
    }

    pub fn clear_reference(&self, field: &str) -> DocumentResult<()> {
        if self.reference_fields()?.find_one(field).is_none() {
            return Err(self.unknown_field(field));
        }
        let mut state = self.write();
        state.raw_references.remove(field);
        state.references.remove(field);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Embedded-one
    // ---------------------------------------------------------------

    pub fn embedded(&self, field: &str) -> DocumentResult<Option<EntityRef>> {
        let decl = self
            .metadata
            .embedded_one(field)
            .ok_or_else(|| self.unknown_field(field))?;

        let raw = {
            let state = self.read();
            if let Some(child) = state.embedded.get(field) {
                return Ok(Some(Arc::clone(child)));
            }
            state.raw_embedded.get(field).cloned()
        };
        let Some(raw) = raw else {
            return Ok(None);
        };

        let child = Entity::from_stored_document(
            self.schema.require(&decl.target)?,
            Arc::clone(&self.schema),
            self.gateway.clone(),
            &raw,
        )?;
        let mut state = self.write();
        state.raw_embedded.remove(field);
        let child = state
            .embedded
            .entry(field.to_string())
            .or_insert(child);
        Ok(Some(Arc::clone(child)))
    }

    pub fn set_embedded(&self, field: &str, child: &EntityRef) -> DocumentResult<()> {
        let decl = self
            .metadata
            .embedded_one(field)
            .ok_or_else(|| self.unknown_field(field))?;
        if !child.is_embedded() || !self.schema.is_subtype(child.type_name(), &decl.target)? {
            return Err(self.invalid_target(field, child.type_name()));
        }

        let mut state = self.write();
        state.raw_embedded.remove(field);
        state.embedded.insert(field.to_string(), Arc::clone(child));
        Ok(())
    }

    pub fn clear_embedded(&self, field: &str) -> DocumentResult<()> {
        if self.metadata.embedded_one(field).is_none() {
            return Err(self.unknown_field(field));
        }
        let mut state = self.write();
        state.raw_embedded.remove(field);
        state.embedded.remove(field);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Groups
    // ---------------------------------------------------------------

    /// The group behind a multi-reference or embedded-many field, created
    /// on first access.
    pub fn group(&self, field: &str) -> DocumentResult<Arc<Mutex<Group>>> {
        if let Some(group) = self.read().groups.get(field) {
            return Ok(Arc::clone(group));
        }

        let references = self.reference_fields()?;
        let source: Box<dyn BaselineSource> = if let Some(decl) = references.find_many(field) {
            if decl.target.is_polymorphic() {
                Box::new(PolymorphicReferenceSource::new(
                    self.this.clone(),
                    decl.clone(),
                ))
            } else {
                Box::new(ReferenceSource::new(self.this.clone(), decl.clone()))
            }
        } else if let Some(decl) = self.metadata.embedded_many(field) {
            Box::new(EmbeddedSource::new(self.this.clone(), decl.clone()))
        } else {
            return Err(self.unknown_field(field));
        };

        let group = Group::new(field, source).with_owner(self.this.clone());
        let mut state = self.write();
        let group = state
            .groups
            .entry(field.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(group)));
        Ok(Arc::clone(group))
    }

    /// Run `f` against the group behind `field`.
    pub fn with_group<R>(&self, field: &str, f: impl FnOnce(&mut Group) -> R) -> DocumentResult<R> {
        let group = self.group(field)?;
        let mut guard = group.lock().expect("lock poisoned");
        Ok(f(&mut *guard))
    }

    /// The last stored form of a multi-valued field, as a group baseline
    /// reads it.
    ///
    /// Top-level entities re-read their stored document; embedded ones use
    /// the snapshot taken when they were loaded or last saved. New entities
    /// have none.
    pub(crate) fn stored_field_value(&self, field: &str) -> DocumentResult<Option<Value>> {
        let (persisted, snapshot) = {
            let state = self.read();
            (state.persisted, state.raw_groups.get(field).cloned())
        };
        if self.is_embedded() {
            return Ok(snapshot);
        }
        if !persisted {
            return Ok(None);
        }
        Ok(self
            .gateway()?
            .find_document(self.type_name(), &self.id)?
            .and_then(|mut document| document.remove(field)))
    }

    // ---------------------------------------------------------------
    // Stored form
    // ---------------------------------------------------------------

    /// Encode the entity as a stored document.
    ///
    /// Multi-valued fields with a group are written from the group's
    /// reconciled view, which may load its baseline.
    pub fn to_stored_document(&self) -> DocumentResult<StoredDocument> {
        let references = self.reference_fields()?;
        let state = self.read().clone();
        let mut document = StoredDocument::new();

        if !self.is_embedded() {
            document.insert(ID_FIELD.to_string(), Value::String(self.id.to_string()));
            document.insert(
                TYPE_FIELD.to_string(),
                Value::String(self.type_name().to_string()),
            );
        }

        for (name, value) in state.fields {
            document.insert(name, value);
        }

        for decl in &references.one {
            if let Some(target) = state.references.get(&decl.name) {
                let value = reference::encode(self.type_name(), decl, target)?;
                document.insert(decl.name.clone(), value);
            } else if let Some(raw) = state.raw_references.get(&decl.name) {
                document.insert(decl.name.clone(), raw.clone());
            }
        }

        for decl in &self.metadata.embeddeds_one {
            if let Some(child) = state.embedded.get(&decl.name) {
                document.insert(decl.name.clone(), Value::Object(child.to_stored_document()?));
            } else if let Some(raw) = state.raw_embedded.get(&decl.name) {
                document.insert(decl.name.clone(), Value::Object(raw.clone()));
            }
        }

        for decl in &references.many {
            if let Some(group) = state.groups.get(&decl.name) {
                let members = group.lock().expect("lock poisoned").all()?;
                let items = members
                    .iter()
                    .map(|member| reference::encode(self.type_name(), decl, member))
                    .collect::<DocumentResult<Vec<_>>>()?;
                document.insert(decl.name.clone(), Value::Array(items));
            } else if let Some(raw) = state.raw_groups.get(&decl.name) {
                document.insert(decl.name.clone(), raw.clone());
            }
        }

        for decl in &self.metadata.embeddeds_many {
            if let Some(group) = state.groups.get(&decl.name) {
                let members = group.lock().expect("lock poisoned").all()?;
                let items = members
                    .iter()
                    .map(|member| member.to_stored_document().map(Value::Object))
                    .collect::<DocumentResult<Vec<_>>>()?;
                document.insert(decl.name.clone(), Value::Array(items));
            } else if let Some(raw) = state.raw_groups.get(&decl.name) {
                document.insert(decl.name.clone(), raw.clone());
            }
        }

        Ok(document)
    }

    /// Record that `document` (as produced by
    /// [`to_stored_document`](Self::to_stored_document)) has been written.
    ///
    /// Marks the entity persisted, refreshes stored snapshots, and consumes
    /// the pending queues of every group, recursing into embedded entities.
    pub fn committed(&self, document: &StoredDocument) -> DocumentResult<()> {
        let references = self.reference_fields()?;
        self.mark_persisted();
        let (groups, embedded) = {
            let mut state = self.write();
            let multi_valued = references
                .many
                .iter()
                .map(|decl| &decl.name)
                .chain(self.metadata.embeddeds_many.iter().map(|decl| &decl.name));
            for name in multi_valued {
                match document.get(name) {
                    Some(value) => {
                        state.raw_groups.insert(name.clone(), value.clone());
                    }
                    None => {
                        state.raw_groups.remove(name);
                    }
                }
            }
            (state.groups.clone(), state.embedded.clone())
        };

        for (name, child) in &embedded {
            if let Some(Value::Object(sub)) = document.get(name) {
                child.committed(sub)?;
            }
        }

        for (name, group) in &groups {
            let mut group = group.lock().expect("lock poisoned");
            if self.metadata.embedded_many(name).is_some() {
                if let Some(Value::Array(items)) = document.get(name) {
                    let members = group.all()?;
                    for (member, item) in members.iter().zip(items) {
                        if let Value::Object(sub) = item {
                            member.committed(sub)?;
                        }
                    }
                }
            }
            group.reset();
        }

        debug!(type_name = %self.type_name(), id = %self.id.short_id(), "entity committed");
        Ok(())
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.metadata.name)
            .field("id", &self.id)
            .finish()
    }
}
