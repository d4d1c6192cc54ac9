use std::sync::Arc;

use docmap_document::{DocumentStore, FlushReport};
use docmap_schema::MetadataSource;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::builder::GraphBuilder;
use crate::classify::classify_embeddings;
use crate::config::LoaderConfig;
use crate::error::{LoaderError, LoaderResult};
use crate::raw::RawRecordSet;

/// Outcome of a [`DataLoader::load`] run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Top-level entities built and queued.
    pub persisted: usize,
    /// Stored documents removed by the purge step.
    pub purged: usize,
    /// Embedded types that were built as records of their own.
    pub promoted: Vec<String>,
    /// Result of the final flush; `None` when flushing was disabled.
    pub flush: Option<FlushReport>,
}

/// Loads raw record sets into a persistence gateway.
pub struct DataLoader {
    gateway: Arc<dyn DocumentStore>,
    schema: Arc<dyn MetadataSource>,
    config: LoaderConfig,
}

impl DataLoader {
    pub fn new(gateway: Arc<dyn DocumentStore>, schema: Arc<dyn MetadataSource>) -> Self {
        Self::with_config(gateway, schema, LoaderConfig::default())
    }

    pub fn with_config(
        gateway: Arc<dyn DocumentStore>,
        schema: Arc<dyn MetadataSource>,
        config: LoaderConfig,
    ) -> Self {
        Self {
            gateway,
            schema,
            config,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn DocumentStore> {
        &self.gateway
    }

    pub fn schema(&self) -> &Arc<dyn MetadataSource> {
        &self.schema
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Build every top-level record in `data`, queue it, and flush once.
    ///
    /// Fails with [`LoaderError::PendingOperations`] before touching the
    /// store when the gateway already has queued writes. On any later
    /// failure nothing is flushed; whatever was queued so far stays queued.
    pub fn load(&self, data: RawRecordSet, purge: bool) -> LoaderResult<LoadReport> {
        if self.gateway.has_pending() {
            return Err(LoaderError::PendingOperations(self.gateway.pending_count()));
        }

        let mut purged = 0;
        if purge {
            for type_name in self.schema.type_names() {
                if self.schema.require(&type_name)?.embedded {
                    continue;
                }
                purged += self.gateway.drop_all(&type_name)?;
            }
        }

        let mut drive = Vec::new();
        for type_name in data.type_names() {
            if self.schema.require(type_name)?.embedded {
                warn!(type_name, "embedded records are only built through their owners; skipping");
                continue;
            }
            drive.push((type_name.to_string(), data.keys(type_name)));
        }

        let input_types: Vec<String> = data.type_names().map(String::from).collect();
        let classification =
            classify_embeddings(self.schema.as_ref(), input_types.iter().map(String::as_str))?;

        let mut builder = GraphBuilder::new(
            self.gateway.as_ref(),
            self.schema.as_ref(),
            &self.config,
            data,
            &classification,
        )?;
        for (type_name, keys) in &drive {
            for key in keys {
                builder.build(type_name, key)?;
            }
        }

        let flush = if self.config.flush {
            Some(self.gateway.flush()?)
        } else {
            None
        };

        let report = LoadReport {
            persisted: builder.persisted(),
            purged,
            promoted: classification.promoted().map(String::from).collect(),
            flush,
        };
        info!(
            persisted = report.persisted,
            purged = report.purged,
            promoted = report.promoted.len(),
            flushed = report.flush.is_some(),
            "load complete"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_document::{Criteria, DocumentResult, Entity, EntityRef, StoredDocument};
    use docmap_schema::{ReferenceTarget, Schema, TypeMetadata};
    use docmap_store::InMemoryDocumentStore;
    use docmap_types::EntityId;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn blog() -> Arc<dyn MetadataSource> {
        Arc::new(
            Schema::from_types([
                TypeMetadata::document("User"),
                TypeMetadata::document("Author"),
                TypeMetadata::document("Category"),
                TypeMetadata::document("Content").reference_one("owner", "User"),
                TypeMetadata::document("Article")
                    .extends("Content")
                    .reference_one("author", "Author")
                    .reference_one("like", ReferenceTarget::polymorphic())
                    .reference_one(
                        "friend",
                        ReferenceTarget::polymorphic_with(
                            "name",
                            [("au", "Author"), ("ct", "Category")],
                        ),
                    )
                    .reference_many("categories", "Category")
                    .reference_many("related", ReferenceTarget::polymorphic())
                    .embeds_one("source", "Source")
                    .embeds_many("comments", "Comment"),
                TypeMetadata::embedded("Source"),
                TypeMetadata::embedded("Comment")
                    .reference_one("author", "Author")
                    .embeds_many("replies", "Comment"),
            ])
            .unwrap(),
        )
    }

    fn data(value: Value) -> RawRecordSet {
        RawRecordSet::from_json_str(&value.to_string()).unwrap()
    }

    fn setup() -> (Arc<InMemoryDocumentStore>, DataLoader) {
        let schema = blog();
        let store = InMemoryDocumentStore::new(Arc::clone(&schema));
        let loader = DataLoader::new(store.clone(), schema);
        (store, loader)
    }

    fn only(store: &InMemoryDocumentStore, type_name: &str) -> EntityRef {
        let mut found = store.fetch_by_criteria(type_name, &Criteria::All).unwrap();
        assert_eq!(found.len(), 1, "expected one {type_name}");
        found.remove(0)
    }

    fn by_name(store: &InMemoryDocumentStore, type_name: &str, name: &str) -> EntityRef {
        store
            .fetch_by_criteria(type_name, &Criteria::field_equals("name", name))
            .unwrap()
            .remove(0)
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    #[test]
    fn loads_and_links_a_small_graph() {
        let (store, loader) = setup();
        let report = loader
            .load(
                data(json!({
                    "Author": {"pablo": {"name": "Pablo"}},
                    "Category": {"c1": {"name": "rust"}, "c2": {"name": "db"}},
                    "Article": {"a1": {
                        "title": "Hello",
                        "author": "pablo",
                        "categories": ["c2", "c1"],
                    }},
                })),
                false,
            )
            .unwrap();

        assert_eq!(report.persisted, 4);
        assert_eq!(report.flush, Some(FlushReport { inserted: 4, updated: 0 }));
        assert!(!store.has_pending());

        let article = only(&store, "Article");
        assert_eq!(article.get("title"), Some(json!("Hello")));
        let author = article.reference("author").unwrap().unwrap();
        assert_eq!(author.get("name"), Some(json!("Pablo")));
        let categories = article.with_group("categories", |g| g.all()).unwrap().unwrap();
        let names: Vec<_> = categories.iter().map(|c| c.get("name").unwrap()).collect();
        assert_eq!(names, vec![json!("db"), json!("rust")]);
    }

    #[test]
    fn inherited_references_are_resolved() {
        let (store, loader) = setup();
        loader
            .load(
                data(json!({
                    "Article": {"a1": {"owner": "root"}},
                    "User": {"root": {"name": "root"}},
                })),
                false,
            )
            .unwrap();
        let article = only(&store, "Article");
        let owner = article.reference("owner").unwrap().unwrap();
        assert_eq!(owner.type_name(), "User");
    }

    #[test]
    fn embeds_with_inherited_references_are_resolved() {
        let schema: Arc<dyn MetadataSource> = Arc::new(
            Schema::from_types([
                TypeMetadata::document("Author"),
                TypeMetadata::embedded("BaseNote").reference_one("author", "Author"),
                TypeMetadata::embedded("Note").extends("BaseNote"),
                TypeMetadata::document("Article").embeds_one("note", "Note"),
            ])
            .unwrap(),
        );
        let store = InMemoryDocumentStore::new(Arc::clone(&schema));
        let loader = DataLoader::new(store.clone(), schema);
        let report = loader
            .load(
                data(json!({
                    "Article": {"a1": {"note": {"text": "x", "author": "pablo"}}},
                    "Author": {"pablo": {"name": "Pablo"}},
                })),
                false,
            )
            .unwrap();
        assert_eq!(report.promoted, vec!["Note"]);
        assert_eq!(report.persisted, 2);

        let note = only(&store, "Article").embedded("note").unwrap().unwrap();
        assert_eq!(note.get("text"), Some(json!("x")));
        let author = note.reference("author").unwrap().unwrap();
        assert_eq!(author.get("name"), Some(json!("Pablo")));
    }

    #[test]
    fn polymorphic_raw_references() {
        let (store, loader) = setup();
        loader
            .load(
                data(json!({
                    "Author": {"pablo": {"name": "Pablo"}},
                    "Category": {"c1": {"name": "rust"}},
                    "Article": {"a1": {
                        "like": {"_type": "Category", "key": "c1"},
                        "friend": {"name": "au", "key": "pablo"},
                        "related": [
                            {"_type": "Author", "key": "pablo"},
                            {"_type": "Category", "key": "c1"},
                        ],
                    }},
                })),
                false,
            )
            .unwrap();

        let article = only(&store, "Article");
        assert_eq!(article.reference("like").unwrap().unwrap().type_name(), "Category");
        assert_eq!(article.reference("friend").unwrap().unwrap().type_name(), "Author");
        let related = article.with_group("related", |g| g.all()).unwrap().unwrap();
        let types: Vec<_> = related.iter().map(|e| e.type_name().to_string()).collect();
        assert_eq!(types, vec!["Author", "Category"]);

        let stored = &store.documents("Article").unwrap()[0];
        assert_eq!(stored["friend"]["name"], json!("au"));
    }

    #[test]
    fn unaliased_polymorphic_target_is_rejected() {
        let (_store, loader) = setup();
        let err = loader
            .load(
                data(json!({
                    "User": {"u": {}},
                    "Article": {"a1": {"friend": {"name": "User", "key": "u"}}},
                })),
                false,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LoaderError::Document(docmap_document::DocumentError::InvalidTargetType { .. })
        ));
    }

    #[test]
    fn integer_keys_are_accepted() {
        let (store, loader) = setup();
        loader
            .load(
                data(json!({
                    "Category": {"1": {"name": "one"}},
                    "Article": {"a1": {"categories": [1]}},
                })),
                false,
            )
            .unwrap();
        let article = only(&store, "Article");
        assert_eq!(article.with_group("categories", |g| g.count()).unwrap().unwrap(), 1);
    }

    #[test]
    fn reference_cycles_terminate() {
        let schema: Arc<dyn MetadataSource> = Arc::new(
            Schema::from_types([
                TypeMetadata::document("Person").reference_one("partner", "Person"),
            ])
            .unwrap(),
        );
        let store = InMemoryDocumentStore::new(Arc::clone(&schema));
        let loader = DataLoader::new(store.clone(), schema);
        let report = loader
            .load(
                data(json!({"Person": {
                    "a": {"name": "a", "partner": "b"},
                    "b": {"name": "b", "partner": "a"},
                }})),
                false,
            )
            .unwrap();
        assert_eq!(report.persisted, 2);

        let a = by_name(&store, "Person", "a");
        let b = a.reference("partner").unwrap().unwrap();
        assert!(Entity::ptr_eq(&b.reference("partner").unwrap().unwrap(), &a));
    }

    // -----------------------------------------------------------------------
    // Embedded records
    // -----------------------------------------------------------------------

    #[test]
    fn promoted_embeds_resolve_their_references() {
        let (store, loader) = setup();
        let report = loader
            .load(
                data(json!({
                    "Author": {"pablo": {"name": "Pablo"}},
                    "Article": {"a1": {
                        "comments": [{
                            "text": "first",
                            "author": "pablo",
                            "replies": [{"text": "re", "author": "pablo"}],
                        }],
                    }},
                })),
                false,
            )
            .unwrap();
        assert_eq!(report.promoted, vec!["Comment"]);
        assert_eq!(report.persisted, 2);

        let article = only(&store, "Article");
        let pablo = by_name(&store, "Author", "pablo");
        let comments = article.with_group("comments", |g| g.all()).unwrap().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].get("text"), Some(json!("first")));
        assert!(Entity::ptr_eq(&comments[0].reference("author").unwrap().unwrap(), &pablo));

        let replies = comments[0].with_group("replies", |g| g.all()).unwrap().unwrap();
        assert_eq!(replies[0].get("text"), Some(json!("re")));
        assert_eq!(replies[0].reference("author").unwrap(), Some(pablo));
    }

    #[test]
    fn plain_embeds_are_assigned_as_data() {
        let (store, loader) = setup();
        let report = loader
            .load(
                data(json!({"Article": {"a1": {"source": {"name": "wire", "url": "x"}}}})),
                false,
            )
            .unwrap();
        assert!(!report.promoted.iter().any(|name| name == "Source"));

        let article = only(&store, "Article");
        let source = article.embedded("source").unwrap().unwrap();
        assert_eq!(source.get("name"), Some(json!("wire")));
        assert_eq!(source.get("url"), Some(json!("x")));
    }

    #[test]
    fn dangling_reference_in_embed_is_reported() {
        let (store, loader) = setup();
        let err = loader
            .load(
                data(json!({"Article": {"a1": {"comments": [{"author": "ghost"}]}}})),
                false,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LoaderError::UnknownReference { owner, field, .. } if owner == "Comment" && field == "author"
        ));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn embedded_top_level_input_is_skipped() {
        let (store, loader) = setup();
        let report = loader
            .load(data(json!({"Source": {"s": {"name": "x"}}})), false)
            .unwrap();
        assert_eq!(report.persisted, 0);
        assert!(store.snapshot().is_empty());
    }

    // -----------------------------------------------------------------------
    // Preconditions, purge and flushing
    // -----------------------------------------------------------------------

    #[test]
    fn dangling_reference_fails_without_flushing() {
        let (store, loader) = setup();
        let err = loader
            .load(
                data(json!({
                    "Category": {"c1": {}},
                    "Article": {"a1": {"author": "ghost"}},
                })),
                false,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LoaderError::UnknownReference { type_name, key, owner, field }
                if type_name == "Author" && key == "ghost" && owner == "Article" && field == "author"
        ));
        assert!(store.snapshot().is_empty());
        // what was built before the failure is still queued
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn pending_writes_block_the_load() {
        let (store, loader) = setup();
        let existing = store.create_entity("Author").unwrap();
        store.persist(&existing).unwrap();
        store.flush().unwrap();
        let queued = store.create_entity("Author").unwrap();
        store.persist(&queued).unwrap();

        let err = loader
            .load(data(json!({"Author": {"x": {}}})), true)
            .unwrap_err();
        assert!(matches!(err, LoaderError::PendingOperations(1)));
        // no purge, no flush
        assert_eq!(store.count("Author").unwrap(), 1);
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn purge_drops_existing_documents() {
        let (store, loader) = setup();
        loader
            .load(data(json!({"Author": {"a": {}, "b": {}}})), false)
            .unwrap();
        let report = loader
            .load(data(json!({"Category": {"c": {}}})), true)
            .unwrap();
        assert_eq!(report.purged, 2);
        assert_eq!(store.count("Author").unwrap(), 0);
        assert_eq!(store.count("Category").unwrap(), 1);
    }

    #[test]
    fn without_flush_everything_stays_queued() {
        let schema = blog();
        let store = InMemoryDocumentStore::new(Arc::clone(&schema));
        let loader = DataLoader::with_config(store.clone(), schema, LoaderConfig::without_flush());
        let report = loader
            .load(data(json!({"Author": {"a": {}}, "Category": {"c": {}}})), false)
            .unwrap();
        assert_eq!(report.flush, None);
        assert_eq!(store.pending_count(), 2);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn reloading_gives_the_same_shape() {
        let input = json!({
            "Author": {"pablo": {"name": "Pablo"}, "pedro": {"name": "Pedro"}},
            "Article": {
                "a1": {"title": "one", "author": "pedro"},
                "a2": {"title": "two", "author": "pablo"},
            },
        });
        let shape = |store: &InMemoryDocumentStore| -> Vec<(Value, Value)> {
            let mut pairs: Vec<_> = store
                .fetch_by_criteria("Article", &Criteria::All)
                .unwrap()
                .iter()
                .map(|a| {
                    let author = a.reference("author").unwrap().unwrap();
                    (a.get("title").unwrap(), author.get("name").unwrap())
                })
                .collect();
            pairs.sort_by_key(|(title, _)| title.to_string());
            pairs
        };

        let (first, loader) = setup();
        loader.load(data(input.clone()), false).unwrap();
        let (second, loader) = setup();
        loader.load(data(input), false).unwrap();
        assert_eq!(shape(&first), shape(&second));
        assert_eq!(
            shape(&first),
            vec![(json!("one"), json!("Pedro")), (json!("two"), json!("Pablo"))]
        );
    }

    // -----------------------------------------------------------------------
    // Deduplication
    // -----------------------------------------------------------------------

    /// Counts `persist` calls per entity on top of an in-memory store.
    struct CountingStore {
        inner: Arc<InMemoryDocumentStore>,
        persists: Mutex<HashMap<EntityId, usize>>,
    }

    impl DocumentStore for CountingStore {
        fn create_entity(&self, type_name: &str) -> DocumentResult<EntityRef> {
            self.inner.create_entity(type_name)
        }

        fn persist(&self, entity: &EntityRef) -> DocumentResult<()> {
            *self
                .persists
                .lock()
                .unwrap()
                .entry(entity.id())
                .or_default() += 1;
            self.inner.persist(entity)
        }

        fn has_pending(&self) -> bool {
            self.inner.has_pending()
        }

        fn pending_count(&self) -> usize {
            self.inner.pending_count()
        }

        fn flush(&self) -> DocumentResult<FlushReport> {
            self.inner.flush()
        }

        fn fetch_by_criteria(
            &self,
            type_name: &str,
            criteria: &Criteria,
        ) -> DocumentResult<Vec<EntityRef>> {
            self.inner.fetch_by_criteria(type_name, criteria)
        }

        fn find_document(
            &self,
            type_name: &str,
            id: &EntityId,
        ) -> DocumentResult<Option<StoredDocument>> {
            self.inner.find_document(type_name, id)
        }

        fn drop_all(&self, type_name: &str) -> DocumentResult<usize> {
            self.inner.drop_all(type_name)
        }
    }

    #[test]
    fn shared_targets_are_built_and_persisted_once() {
        let schema = blog();
        let counting = Arc::new(CountingStore {
            inner: InMemoryDocumentStore::new(Arc::clone(&schema)),
            persists: Mutex::new(HashMap::new()),
        });
        let loader = DataLoader::new(counting.clone(), schema);
        loader
            .load(
                data(json!({
                    "Article": {
                        "a1": {"author": "pablo"},
                        "a2": {"author": "pablo"},
                    },
                    "Author": {"pablo": {"name": "Pablo"}},
                })),
                false,
            )
            .unwrap();

        let articles = counting
            .fetch_by_criteria("Article", &Criteria::All)
            .unwrap();
        let first = articles[0].reference("author").unwrap().unwrap();
        let second = articles[1].reference("author").unwrap().unwrap();
        assert!(Entity::ptr_eq(&first, &second));

        let persists = counting.persists.lock().unwrap();
        assert_eq!(persists.len(), 3);
        assert!(persists.values().all(|count| *count == 1));
        assert_eq!(counting.inner.count("Author").unwrap(), 1);
    }
}
