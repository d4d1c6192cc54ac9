//! Foundation types for docmap.
//!
//! Every other docmap crate depends on `docmap-types`.
//!
//! # Key Types
//!
//! - [`EntityId`] — Time-ordered (UUID v7) identity assigned to every entity
//!   at creation and immutable afterwards
//! - [`TypeError`] — Parsing failures for foundation types

pub mod error;
pub mod id;

pub use error::TypeError;
pub use id::EntityId;
