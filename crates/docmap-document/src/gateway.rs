//! The [`DocumentStore`] trait defining the persistence gateway interface.

use docmap_types::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityRef;
use crate::error::DocumentResult;

/// A document as held by the store.
pub type StoredDocument = serde_json::Map<String, Value>;

/// Identity of a top-level stored document.
pub const ID_FIELD: &str = "_id";

/// Concrete type of a top-level stored document.
pub const TYPE_FIELD: &str = "_type";

/// Filter for [`DocumentStore::fetch_by_criteria`].
#[derive(Clone, Debug, PartialEq)]
pub enum Criteria {
    /// Every document of the type.
    All,
    /// Documents with these ids, returned in list order. Ids without a
    /// document are skipped.
    Ids(Vec<EntityId>),
    /// Documents whose top-level `field` equals `value`.
    FieldEquals { field: String, value: Value },
}

impl Criteria {
    pub fn ids(ids: impl IntoIterator<Item = EntityId>) -> Self {
        Self::Ids(ids.into_iter().collect())
    }

    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether the document stored under `id` satisfies the criteria.
    pub fn matches(&self, id: &EntityId, document: &StoredDocument) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.contains(id),
            Self::FieldEquals { field, value } => document.get(field) == Some(value),
        }
    }
}

/// Outcome of a [`DocumentStore::flush`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Documents written for the first time.
    pub inserted: usize,
    /// Documents that replaced an existing version.
    pub updated: usize,
}

impl FlushReport {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Persistence gateway.
///
/// Writes are two-phase: [`persist`](Self::persist) only queues an entity,
/// [`flush`](Self::flush) commits everything queued. Reads go through
/// [`fetch_by_criteria`](Self::fetch_by_criteria) and come back as live
/// entity handles.
///
/// Implementations must be `Send + Sync`, but no operation is designed to
/// be driven concurrently from several threads against the same queue.
pub trait DocumentStore: Send + Sync {
    /// Create a bare, not yet persisted entity of `type_name`.
    fn create_entity(&self, type_name: &str) -> DocumentResult<EntityRef>;

    /// Queue an entity for writing. Queuing the same entity twice has no
    /// further effect.
    fn persist(&self, entity: &EntityRef) -> DocumentResult<()>;

    /// Whether any writes are queued.
    fn has_pending(&self) -> bool;

    /// Number of queued writes.
    fn pending_count(&self) -> usize;

    /// Commit every queued write. Blocks until done.
    fn flush(&self) -> DocumentResult<FlushReport>;

    /// Entities of `type_name` (or a type extending it) matching `criteria`.
    fn fetch_by_criteria(
        &self,
        type_name: &str,
        criteria: &Criteria,
    ) -> DocumentResult<Vec<EntityRef>>;

    /// The raw stored document of a top-level entity.
    fn find_document(
        &self,
        type_name: &str,
        id: &EntityId,
    ) -> DocumentResult<Option<StoredDocument>>;

    /// Delete every stored document of `type_name`. Returns how many were
    /// removed.
    fn drop_all(&self, type_name: &str) -> DocumentResult<usize>;

    /// Fetch a single entity by id.
    fn fetch_one(&self, type_name: &str, id: &EntityId) -> DocumentResult<Option<EntityRef>> {
        Ok(self
            .fetch_by_criteria(type_name, &Criteria::Ids(vec![*id]))?
            .into_iter()
            .next())
    }
}
