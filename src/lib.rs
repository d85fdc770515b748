//! # rowbind - Object-relational mapping over embedded SQLite
//!
//! Persists plain Rust structs without hand-written SQL.
//!
//! rowbind provides:
//! - Explicit schema description per type (`Entity::describe`), memoized process-wide
//! - A column codec between typed field values and SQLite storage values
//! - Relationship resolution into join-table rows with cascade control
//! - A session exposing save/update/delete/find, eager and lazy result materialization

pub mod naming;
pub mod value;
pub mod row;
pub mod entity;
pub mod codec;
pub mod identity;
pub mod relationship;
pub mod query;
pub mod storage;
pub mod materialize;
pub mod session;
pub mod registry;
pub mod config;
pub mod ui;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-exports for convenient access
pub use entity::{
    Cardinality, Entity, EntityDescriptor, FieldDescriptor, Handle, HandleKey, Modifiers, Node,
    Record, Relationship, RelationshipDescriptor, Schema, TypeTag,
};
pub use entity::cache::{descriptor_of, fields_of};
pub use value::{Column, FieldValue};
pub use row::Row;
pub use identity::IdentityMap;
pub use query::{Query, ToArg};
pub use materialize::EntityCursor;
pub use session::{BatchReport, Session, UpdateOutcome};
pub use registry::Registry;
pub use storage::SqliteStore;

/// Result type alias for rowbind operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for rowbind operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error on {entity}: {message}")]
    Configuration { entity: String, message: String },

    #[error("Cannot coerce {entity}.{field}: {message}")]
    Coercion {
        entity: String,
        field: String,
        message: String,
    },

    #[error("Expected at most one {entity} row, but {count} matched")]
    Cardinality { entity: String, count: usize },

    #[error("Misuse: {0}")]
    Misuse(String),

    #[error("{entity}.{field} refers to an entity that has no identifier")]
    UnsavedReference { entity: String, field: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for per-field coercion problems, which never abort a result set
    pub fn is_coercion(&self) -> bool {
        matches!(self, Error::Coercion { .. })
    }
}
