//! Live entities and change tracking for docmap.
//!
//! An [`Entity`] is an identified, typed record shared by handle
//! ([`EntityRef`]). Multi-valued relationship fields are backed by a
//! [`Group`], which lazily loads the stored baseline and tracks pending
//! additions and removals against it.
//!
//! # Key Types
//!
//! - [`Entity`] / [`EntityRef`] -- Identity-compared entity handles
//! - [`Group`] -- Change-set over a saved baseline (`saved + add - remove`)
//! - [`BaselineSource`] -- How a group materialises its saved baseline
//! - [`DocumentStore`] -- The persistence gateway interface
//! - [`Criteria`] -- Fetch filters understood by every gateway
//!
//! # Stored document shape
//!
//! - `_id` / `_type` for top-level entities
//! - scalar fields as-is
//! - single references as an id string, or `{<discriminator>: .., "id": ..}`
//!   for polymorphic references
//! - embedded-one fields as nested documents, multi-valued fields as arrays

pub mod entity;
pub mod error;
pub mod gateway;
pub mod group;
pub mod reference;

#[cfg(test)]
pub(crate) mod testing;

pub use entity::{Entity, EntityRef};
pub use error::{DocumentError, DocumentResult};
pub use gateway::{Criteria, DocumentStore, FlushReport, StoredDocument, ID_FIELD, TYPE_FIELD};
pub use group::{
    BaselineSource, EmbeddedSource, Group, PolymorphicReferenceSource, ReferenceSource,
};
