use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, Weak};

use docmap_document::{
    Criteria, DocumentError, DocumentResult, DocumentStore, Entity, EntityRef, FlushReport,
    StoredDocument, ID_FIELD, TYPE_FIELD,
};
use docmap_schema::MetadataSource;
use docmap_types::EntityId;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

type Collection = BTreeMap<EntityId, StoredDocument>;

/// In-memory, HashMap-based document store.
///
/// Intended for tests, fixtures and embedding. Collections are keyed by
/// root type and held behind a `RwLock`; documents are cloned on read and
/// write. The store is always handled through an `Arc` so that the
/// entities it creates can reach back to it.
pub struct InMemoryDocumentStore {
    schema: Arc<dyn MetadataSource>,
    config: StoreConfig,
    this: Weak<InMemoryDocumentStore>,
    collections: RwLock<HashMap<String, Collection>>,
    pending: Mutex<Vec<EntityRef>>,
    identity: Mutex<HashMap<EntityId, Weak<Entity>>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store with the default configuration.
    pub fn new(schema: Arc<dyn MetadataSource>) -> Arc<Self> {
        Self::with_config(schema, StoreConfig::default())
    }

    pub fn with_config(schema: Arc<dyn MetadataSource>, config: StoreConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            schema,
            config,
            this: this.clone(),
            collections: RwLock::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            identity: Mutex::new(HashMap::new()),
        })
    }

    pub fn schema(&self) -> &Arc<dyn MetadataSource> {
        &self.schema
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn gateway_handle(&self) -> Weak<dyn DocumentStore> {
        self.this.clone()
    }

    /// Collection name for `type_name`: its root ancestor.
    fn collection_for(&self, type_name: &str) -> DocumentResult<String> {
        let chain = self.schema.inheritance_chain(type_name)?;
        let Some(root) = chain.last() else {
            return Err(StoreError::UnknownType(type_name.to_string()).into());
        };
        if root.embedded || chain[0].embedded {
            return Err(StoreError::EmbeddedType(type_name.to_string()).into());
        }
        Ok(root.name.clone())
    }

    fn concrete_type<'a>(document: &'a StoredDocument, fallback: &'a str) -> &'a str {
        document
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or(fallback)
    }

    /// Documents of `type_name` or one of its subtypes, in id order.
    fn matching(
        &self,
        type_name: &str,
        criteria: &Criteria,
    ) -> DocumentResult<Vec<(EntityId, StoredDocument)>> {
        let collection = self.collection_for(type_name)?;
        let candidates: Vec<(EntityId, StoredDocument)> = {
            let collections = self.collections.read().expect("lock poisoned");
            let Some(documents) = collections.get(&collection) else {
                return Ok(Vec::new());
            };
            match criteria {
                Criteria::Ids(ids) => ids
                    .iter()
                    .filter_map(|id| documents.get(id).map(|doc| (*id, doc.clone())))
                    .collect(),
                _ => documents
                    .iter()
                    .filter(|(id, doc)| criteria.matches(id, doc))
                    .map(|(id, doc)| (*id, doc.clone()))
                    .collect(),
            }
        };

        let mut matched = Vec::with_capacity(candidates.len());
        for (id, document) in candidates {
            let concrete = Self::concrete_type(&document, type_name);
            if self.schema.metadata_for(concrete).is_none() {
                return Err(StoreError::UnknownType(concrete.to_string()).into());
            }
            if self.schema.is_subtype(concrete, type_name)? {
                matched.push((id, document));
            }
        }
        Ok(matched)
    }

    fn hydrate(
        &self,
        type_name: &str,
        id: EntityId,
        document: &StoredDocument,
    ) -> DocumentResult<EntityRef> {
        if self.config.identity_map {
            let identity = self.identity.lock().expect("lock poisoned");
            if let Some(live) = identity.get(&id).and_then(Weak::upgrade) {
                return Ok(live);
            }
        }

        let concrete = Self::concrete_type(document, type_name);
        let metadata = self
            .schema
            .metadata_for(concrete)
            .ok_or_else(|| StoreError::UnknownType(concrete.to_string()))?;
        let entity = Entity::from_stored_document(
            metadata,
            Arc::clone(&self.schema),
            self.gateway_handle(),
            document,
        )?;
        self.remember(&entity);
        Ok(entity)
    }

    fn remember(&self, entity: &EntityRef) {
        if self.config.identity_map {
            self.identity
                .lock()
                .expect("lock poisoned")
                .insert(entity.id(), Arc::downgrade(entity));
        }
    }

    // -----------------------------------------------------------------------
    // Inspection helpers
    // -----------------------------------------------------------------------

    /// Number of stored documents of `type_name` (subtypes included).
    pub fn count(&self, type_name: &str) -> DocumentResult<usize> {
        Ok(self.matching(type_name, &Criteria::All)?.len())
    }

    /// Raw stored documents of `type_name` (subtypes included), in id order.
    pub fn documents(&self, type_name: &str) -> DocumentResult<Vec<StoredDocument>> {
        Ok(self
            .matching(type_name, &Criteria::All)?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect())
    }

    /// Every stored document, grouped by collection.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<StoredDocument>> {
        let collections = self.collections.read().expect("lock poisoned");
        collections
            .iter()
            .map(|(name, documents)| (name.clone(), documents.values().cloned().collect()))
            .collect()
    }

    /// Write [`snapshot`](Self::snapshot) to `path` as pretty-printed JSON.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), "snapshot written");
        Ok(())
    }

    /// Replace the stored documents with a snapshot read from `path`, as
    /// written by [`save_snapshot`](Self::save_snapshot). Queued writes and
    /// live entities are left alone. Returns the number of documents read.
    pub fn restore_snapshot(&self, path: impl AsRef<Path>) -> StoreResult<usize> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let snapshot: BTreeMap<String, Vec<StoredDocument>> =
            serde_json::from_str(&source).map_err(|e| StoreError::Codec(e.to_string()))?;

        let mut restored = HashMap::with_capacity(snapshot.len());
        let mut total = 0;
        for (name, documents) in snapshot {
            if self.collection_for(&name).ok().as_deref() != Some(name.as_str()) {
                return Err(StoreError::UnknownType(name));
            }
            let mut collection = Collection::new();
            for document in documents {
                let id = document
                    .get(ID_FIELD)
                    .and_then(Value::as_str)
                    .ok_or_else(|| StoreError::Codec(format!("{name} document without an id")))
                    .and_then(|raw| {
                        EntityId::parse(raw).map_err(|e| StoreError::Codec(e.to_string()))
                    })?;
                collection.insert(id, document);
            }
            total += collection.len();
            restored.insert(name, collection);
        }

        *self.collections.write().expect("lock poisoned") = restored;
        debug!(path = %path.as_ref().display(), documents = total, "snapshot restored");
        Ok(total)
    }

    /// Remove all documents, queued writes and identity entries.
    pub fn clear(&self) {
        self.collections.write().expect("lock poisoned").clear();
        self.pending.lock().expect("lock poisoned").clear();
        self.identity.lock().expect("lock poisoned").clear();
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn create_entity(&self, type_name: &str) -> DocumentResult<EntityRef> {
        let metadata = self.schema.require(type_name)?;
        Ok(Entity::create(
            metadata,
            Arc::clone(&self.schema),
            self.gateway_handle(),
        ))
    }

    fn persist(&self, entity: &EntityRef) -> DocumentResult<()> {
        if entity.is_embedded() {
            return Err(DocumentError::NotPersistable(entity.type_name().to_string()));
        }
        let mut pending = self.pending.lock().expect("lock poisoned");
        if !pending.iter().any(|queued| queued == entity) {
            debug!(type_name = %entity.type_name(), id = %entity.id().short_id(), "queued for write");
            pending.push(Arc::clone(entity));
        }
        Ok(())
    }

    fn has_pending(&self) -> bool {
        !self.pending.lock().expect("lock poisoned").is_empty()
    }

    fn pending_count(&self) -> usize {
        self.pending.lock().expect("lock poisoned").len()
    }

    fn flush(&self) -> DocumentResult<FlushReport> {
        let queue = self.pending.lock().expect("lock poisoned").clone();
        if queue.is_empty() {
            return Ok(FlushReport::default());
        }

        // Encoding may read the store (group baselines), so no store lock is
        // held until every document is ready.
        let mut encoded = Vec::with_capacity(queue.len());
        for entity in &queue {
            let collection = self.collection_for(entity.type_name())?;
            encoded.push((collection, entity.to_stored_document()?));
        }

        let mut report = FlushReport::default();
        {
            let mut collections = self.collections.write().expect("lock poisoned");
            for (entity, (collection, document)) in queue.iter().zip(&encoded) {
                let previous = collections
                    .entry(collection.clone())
                    .or_default()
                    .insert(entity.id(), document.clone());
                if previous.is_some() {
                    report.updated += 1;
                } else {
                    report.inserted += 1;
                }
            }
        }

        for (entity, (_, document)) in queue.iter().zip(&encoded) {
            entity.committed(document)?;
            self.remember(entity);
        }

        let flushed: HashSet<EntityId> = queue.iter().map(|entity| entity.id()).collect();
        self.pending
            .lock()
            .expect("lock poisoned")
            .retain(|entity| !flushed.contains(&entity.id()));

        info!(
            inserted = report.inserted,
            updated = report.updated,
            "flushed pending writes"
        );
        Ok(report)
    }

    fn fetch_by_criteria(
        &self,
        type_name: &str,
        criteria: &Criteria,
    ) -> DocumentResult<Vec<EntityRef>> {
        self.matching(type_name, criteria)?
            .into_iter()
            .map(|(id, document)| self.hydrate(type_name, id, &document))
            .collect()
    }

    fn find_document(
        &self,
        type_name: &str,
        id: &EntityId,
    ) -> DocumentResult<Option<StoredDocument>> {
        let collection = self.collection_for(type_name)?;
        let collections = self.collections.read().expect("lock poisoned");
        Ok(collections
            .get(&collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    fn drop_all(&self, type_name: &str) -> DocumentResult<usize> {
        let collection = self.collection_for(type_name)?;
        let doomed: Vec<EntityId> = self
            .matching(type_name, &Criteria::All)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        {
            let mut collections = self.collections.write().expect("lock poisoned");
            if let Some(documents) = collections.get_mut(&collection) {
                for id in &doomed {
                    documents.remove(id);
                }
                if documents.is_empty() {
                    collections.remove(&collection);
                }
            }
        }
        {
            let mut identity = self.identity.lock().expect("lock poisoned");
            for id in &doomed {
                identity.remove(id);
            }
        }

        info!(type_name, dropped = doomed.len(), "dropped documents");
        Ok(doomed.len())
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collections = self.collections.read().expect("lock poisoned");
        let documents: usize = collections.values().map(BTreeMap::len).sum();
        f.debug_struct("InMemoryDocumentStore")
            .field("collections", &collections.len())
            .field("documents", &documents)
            .field("pending", &self.pending_count())
            .finish()
    }
}
