//! Shared fixtures for unit tests.

use std::sync::{Arc, Weak};

use docmap_schema::{MetadataSource, ReferenceTarget, Schema, TypeMetadata};
use docmap_types::EntityId;

use crate::entity::{Entity, EntityRef};
use crate::error::{DocumentError, DocumentResult};
use crate::gateway::{Criteria, DocumentStore, FlushReport, StoredDocument};

/// A gateway that refuses everything. Only used as the type behind a
/// dangling `Weak`.
pub(crate) struct NoGateway;

impl DocumentStore for NoGateway {
    fn create_entity(&self, _type_name: &str) -> DocumentResult<EntityRef> {
        Err(DocumentError::GatewayClosed)
    }

    fn persist(&self, _entity: &EntityRef) -> DocumentResult<()> {
        Err(DocumentError::GatewayClosed)
    }

    fn has_pending(&self) -> bool {
        false
    }

    fn pending_count(&self) -> usize {
        0
    }

    fn flush(&self) -> DocumentResult<FlushReport> {
        Err(DocumentError::GatewayClosed)
    }

    fn fetch_by_criteria(
        &self,
        _type_name: &str,
        _criteria: &Criteria,
    ) -> DocumentResult<Vec<EntityRef>> {
        Err(DocumentError::GatewayClosed)
    }

    fn find_document(
        &self,
        _type_name: &str,
        _id: &EntityId,
    ) -> DocumentResult<Option<StoredDocument>> {
        Err(DocumentError::GatewayClosed)
    }

    fn drop_all(&self, _type_name: &str) -> DocumentResult<usize> {
        Err(DocumentError::GatewayClosed)
    }
}

pub(crate) fn detached() -> Weak<dyn DocumentStore> {
    Weak::<NoGateway>::new()
}

pub(crate) fn schema() -> Arc<dyn MetadataSource> {
    let schema = Schema::from_types([
        TypeMetadata::document("Author"),
        TypeMetadata::document("Category"),
        TypeMetadata::document("User"),
        TypeMetadata::document("Admin").extends("User"),
        TypeMetadata::document("Article")
            .reference_one("author", "Author")
            .reference_one("editor", "User")
            .reference_one("like", ReferenceTarget::polymorphic())
            .reference_one(
                "friend",
                ReferenceTarget::polymorphic_with("name", [("au", "Author"), ("ct", "Category")]),
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
    .expect("fixture schema is valid");
    Arc::new(schema)
}

/// A fresh, detached entity of `type_name`.
pub(crate) fn entity(type_name: &str) -> EntityRef {
    let schema = schema();
    Entity::create(
        schema.require(type_name).expect("fixture type"),
        schema,
        detached(),
    )
}
