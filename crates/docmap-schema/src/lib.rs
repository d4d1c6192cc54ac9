//! Entity type metadata for docmap.
//!
//! Describes, per entity type, which fields are references to other
//! entities and which are embedded sub-records, what they point at, and
//! which type a type extends. Everything that resolves or persists an
//! entity graph consults this metadata through the [`MetadataSource`] trait.
//!
//! # Key Types
//!
//! - [`TypeMetadata`] -- Declared reference and embedding fields of one type
//! - [`ReferenceTarget`] -- A single target type or a discriminated set of types
//! - [`MetadataSource`] -- The schema service interface (lookup + flattening)
//! - [`Schema`] -- In-memory registry, loadable from TOML or JSON files

pub mod error;
pub mod file;
pub mod metadata;
pub mod registry;
pub mod source;

pub use error::{SchemaError, SchemaResult};
pub use file::SchemaFile;
pub use metadata::{
    AliasTable, EmbeddedDecl, FieldKind, ReferenceDecl, ReferenceFields, ReferenceTarget,
    TypeMetadata, DEFAULT_DISCRIMINATOR_FIELD,
};
pub use registry::Schema;
pub use source::MetadataSource;
