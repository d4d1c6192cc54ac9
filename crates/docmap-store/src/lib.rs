//! Document storage for docmap.
//!
//! Backends implement the [`DocumentStore`](docmap_document::DocumentStore)
//! gateway defined in `docmap-document`:
//!
//! - [`InMemoryDocumentStore`] -- `HashMap`-based store for tests, fixtures
//!   and embedding
//!
//! # Storage model
//!
//! 1. One collection per root type. Documents of a subtype live in their
//!    root ancestor's collection and carry their concrete type in `_type`.
//! 2. Writes are two-phase: `persist` queues, `flush` commits.
//! 3. Reads hand out live entities. With the identity map enabled, an
//!    entity that is still alive is returned instead of a fresh copy.
//! 4. Embedded entities are never stored on their own.

pub mod config;
pub mod error;
pub mod memory;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryDocumentStore;
