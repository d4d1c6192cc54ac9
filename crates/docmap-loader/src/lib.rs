//! Reference graph loader for docmap.
//!
//! Turns a raw record set (`type -> key -> record`, with references
//! written as record keys) into a graph of live entities, queues every
//! top-level entity on a [`DocumentStore`](docmap_document::DocumentStore)
//! and flushes once.
//!
//! # Key Types
//!
//! - [`DataLoader`] -- Entry point: precondition check, purge, build, flush
//! - [`RawRecordSet`] -- Ordered raw input, usually read from JSON
//! - [`Classification`] -- Which embedded types must be built as records
//! - [`GraphBuilder`] -- Memoised, cycle-safe record construction
//!
//! # Raw references
//!
//! - single references: the target record's key (string or integer)
//! - polymorphic references: `{<discriminator>: <alias or type>, "key": <key>}`
//! - multi-valued references: an array of either form
//!
//! Embedded types that declare references, or that embed such a type, are
//! *promoted*: their nested raw records are built like top-level records so
//! their references resolve to the same instances as everywhere else.
//! Other embedded data is assigned as-is.

pub mod builder;
pub mod classify;
pub mod config;
pub mod error;
pub mod loader;
pub mod raw;

pub use builder::{GraphBuilder, RAW_REFERENCE_KEY_FIELD};
pub use classify::{classify_embeddings, Classification};
pub use config::{LoaderConfig, DEFAULT_EMBEDDED_KEY_PREFIX};
pub use error::{LoaderError, LoaderResult};
pub use loader::{DataLoader, LoadReport};
pub use raw::{RawRecord, RawRecordSet};
