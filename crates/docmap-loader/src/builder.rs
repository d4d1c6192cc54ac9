//! Memoised graph construction.

use std::collections::{HashMap, HashSet};

use docmap_document::{DocumentError, DocumentStore, EntityRef};
use docmap_schema::{
    MetadataSource, ReferenceDecl, ReferenceFields, ReferenceTarget, TypeMetadata,
};
use serde_json::Value;
use tracing::{debug, trace};

use crate::classify::Classification;
use crate::config::LoaderConfig;
use crate::error::{LoaderError, LoaderResult};
use crate::raw::{RawRecord, RawRecordSet};

/// Key inside a polymorphic raw reference naming the target record.
pub const RAW_REFERENCE_KEY_FIELD: &str = "key";

type RecordKey = (String, String);

/// Builds entities from raw records, each `(type, key)` at most once.
///
/// A top-level entity is memoised as soon as it is instantiated, before
/// its fields are resolved, so reference cycles between records resolve to
/// the instance under construction instead of recursing forever.
pub struct GraphBuilder<'a> {
    gateway: &'a dyn DocumentStore,
    schema: &'a dyn MetadataSource,
    config: &'a LoaderConfig,
    data: RawRecordSet,
    resolvable: HashSet<String>,
    field_maps: HashMap<String, ReferenceFields>,
    built: HashMap<RecordKey, EntityRef>,
    processed: HashSet<RecordKey>,
    embedded_counter: usize,
}

impl<'a> GraphBuilder<'a> {
    /// Prepare a build over `data`.
    ///
    /// Input types and promoted embedded types get their flattened
    /// reference maps computed up front.
    pub fn new(
        gateway: &'a dyn DocumentStore,
        schema: &'a dyn MetadataSource,
        config: &'a LoaderConfig,
        data: RawRecordSet,
        classification: &Classification,
    ) -> LoaderResult<Self> {
        let resolvable: HashSet<String> = data
            .type_names()
            .chain(classification.promoted())
            .map(String::from)
            .collect();

        let mut field_maps = HashMap::with_capacity(resolvable.len());
        for type_name in &resolvable {
            field_maps.insert(type_name.clone(), schema.reference_fields(type_name)?);
        }

        Ok(Self {
            gateway,
            schema,
            config,
            data,
            resolvable,
            field_maps,
            built: HashMap::new(),
            processed: HashSet::new(),
            embedded_counter: 0,
        })
    }

    /// Number of top-level entities built and queued.
    pub fn persisted(&self) -> usize {
        self.processed.len()
    }

    /// Input records not yet consumed by a build.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn is_processed(&self, type_name: &str, key: &str) -> bool {
        self.processed
            .contains(&(type_name.to_string(), key.to_string()))
    }

    /// The entity built for `(type_name, key)`, if any.
    pub fn built(&self, type_name: &str, key: &str) -> Option<&EntityRef> {
        self.built.get(&(type_name.to_string(), key.to_string()))
    }

    fn field_map(&mut self, type_name: &str) -> LoaderResult<ReferenceFields> {
        if let Some(fields) = self.field_maps.get(type_name) {
            return Ok(fields.clone());
        }
        let fields = self.schema.reference_fields(type_name)?;
        self.field_maps.insert(type_name.to_string(), fields.clone());
        Ok(fields)
    }

    /// Build (or return the already built) entity for `(type_name, key)`.
    pub fn build(&mut self, type_name: &str, key: &str) -> LoaderResult<EntityRef> {
        let record_key: RecordKey = (type_name.to_string(), key.to_string());
        if let Some(entity) = self.built.get(&record_key) {
            return Ok(entity.clone());
        }

        if !self.data.contains(type_name, key) {
            return Err(unknown_record(type_name, key));
        }
        trace!(type_name, key, "building record");

        let metadata = self.schema.require(type_name)?;
        // top-level records are built once and leave the input here
        let record = if metadata.embedded {
            self.data.get(type_name, key).cloned()
        } else {
            self.data.take(type_name, key)
        };
        let record = record.ok_or_else(|| unknown_record(type_name, key))?;
        self.build_record(type_name, key, &metadata, record)
    }

    fn build_record(
        &mut self,
        type_name: &str,
        key: &str,
        metadata: &TypeMetadata,
        mut record: RawRecord,
    ) -> LoaderResult<EntityRef> {
        let record_key: RecordKey = (type_name.to_string(), key.to_string());
        let entity = self.gateway.create_entity(type_name)?;
        if !metadata.embedded {
            self.built.insert(record_key.clone(), entity.clone());
        }

        let fields = self.field_map(type_name)?;

        for decl in &fields.one {
            let Some(raw) = take_field(&mut record, &decl.name) else {
                continue;
            };
            let (target_type, target_key) = self.raw_reference(type_name, decl, &raw)?;
            let target = self.resolve(type_name, &decl.name, &target_type, &target_key)?;
            entity.set_reference(&decl.name, &target)?;
        }

        for decl in &fields.many {
            let Some(raw) = take_field(&mut record, &decl.name) else {
                continue;
            };
            let items = self.raw_array(type_name, &decl.name, raw)?;
            let mut members = Vec::with_capacity(items.len());
            for item in &items {
                let (target_type, target_key) = self.raw_reference(type_name, decl, item)?;
                members.push(self.resolve(type_name, &decl.name, &target_type, &target_key)?);
            }
            entity.with_group(&decl.name, |group| group.add_many(members))?;
        }

        for decl in &metadata.embeddeds_one {
            if !self.resolvable.contains(&decl.target) {
                continue;
            }
            let Some(raw) = take_field(&mut record, &decl.name) else {
                continue;
            };
            let child = self.build_embedded(type_name, &decl.name, &decl.target, raw)?;
            entity.set_embedded(&decl.name, &child)?;
        }

        for decl in &metadata.embeddeds_many {
            if !self.resolvable.contains(&decl.target) {
                continue;
            }
            let Some(raw) = take_field(&mut record, &decl.name) else {
                continue;
            };
            let items = self.raw_array(type_name, &decl.name, raw)?;
            let mut children = Vec::with_capacity(items.len());
            for item in items {
                children.push(self.build_embedded(type_name, &decl.name, &decl.target, item)?);
            }
            entity.with_group(&decl.name, |group| group.add_many(children))?;
        }

        // what is left: scalars and plain embedded data
        entity.assign(record)?;

        if !metadata.embedded {
            self.gateway.persist(&entity)?;
            self.processed.insert(record_key);
            debug!(type_name, key, id = %entity.id().short_id(), "record persisted");
        }

        Ok(entity)
    }

    /// Build a referenced record, reporting a missing one as a dangling
    /// reference of `owner.field`.
    fn resolve(
        &mut self,
        owner: &str,
        field: &str,
        type_name: &str,
        key: &str,
    ) -> LoaderResult<EntityRef> {
        match self.build(type_name, key) {
            Err(LoaderError::UnknownRecord { type_name, key }) => {
                Err(LoaderError::UnknownReference {
                    type_name,
                    key,
                    owner: owner.to_string(),
                    field: field.to_string(),
                })
            }
            result => result,
        }
    }

    /// Build a promoted embedded record under a synthetic key. The record
    /// never enters the input set.
    fn build_embedded(
        &mut self,
        owner: &str,
        field: &str,
        type_name: &str,
        raw: Value,
    ) -> LoaderResult<EntityRef> {
        let Value::Object(record) = raw else {
            return Err(invalid(owner, field, "expected an embedded record object"));
        };
        let key = format!("{}{}", self.config.embedded_key_prefix, self.embedded_counter);
        self.embedded_counter += 1;

        trace!(type_name, key = %key, "building embedded record");
        let metadata = self.schema.require(type_name)?;
        self.build_record(type_name, &key, &metadata, record)
    }

    /// Target type and key of a raw reference value.
    ///
    /// Single references are a bare key. Polymorphic ones are an object
    /// holding the discriminator (alias or type name) and the key.
    fn raw_reference(
        &self,
        owner: &str,
        decl: &ReferenceDecl,
        raw: &Value,
    ) -> LoaderResult<(String, String)> {
        match &decl.target {
            ReferenceTarget::Single(target) => {
                let key = raw_key(raw).ok_or_else(|| {
                    invalid(owner, &decl.name, "expected a record key")
                })?;
                Ok((target.clone(), key))
            }
            ReferenceTarget::Polymorphic {
                discriminator_field,
                ..
            } => {
                let pair = raw.as_object().ok_or_else(|| {
                    invalid(owner, &decl.name, "expected a discriminator/key object")
                })?;
                let discriminator = pair
                    .get(discriminator_field)
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(owner, &decl.name, "missing discriminator"))?;
                let key = pair
                    .get(RAW_REFERENCE_KEY_FIELD)
                    .and_then(raw_key)
                    .ok_or_else(|| invalid(owner, &decl.name, "missing record key"))?;

                let type_name = decl.target.resolve_discriminator(discriminator);
                if !self.schema.accepts(&decl.target, &type_name)? {
                    return Err(DocumentError::InvalidTargetType {
                        type_name: owner.to_string(),
                        field: decl.name.clone(),
                        actual: type_name,
                    }
                    .into());
                }
                Ok((type_name, key))
            }
        }
    }

    fn raw_array(&self, owner: &str, field: &str, raw: Value) -> LoaderResult<Vec<Value>> {
        match raw {
            Value::Array(items) => Ok(items),
            _ => Err(invalid(owner, field, "expected an array")),
        }
    }
}

/// Remove a field from a raw record. Absent and `null` are the same.
fn take_field(record: &mut RawRecord, field: &str) -> Option<Value> {
    record.remove(field).filter(|value| !value.is_null())
}

/// Record keys may be given as strings or integers.
fn raw_key(value: &Value) -> Option<String> {
    match value {
        Value::String(key) => Some(key.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn unknown_record(type_name: &str, key: &str) -> LoaderError {
    LoaderError::UnknownRecord {
        type_name: type_name.to_string(),
        key: key.to_string(),
    }
}

fn invalid(owner: &str, field: &str, reason: &str) -> LoaderError {
    LoaderError::InvalidRawValue {
        type_name: owner.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
