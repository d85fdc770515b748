//! Storage Layer - SQLite-backed persistence
//!
//! One table per entity (named after the entity, `ID` primary key) plus one
//! join table per relationship field:
//! - <ENTITY>(ID, <FIELD columns>)
//! - <OWNER>_<FIELD>(<OWNER>_ID, <FIELD>_ID)

pub mod schema;
pub mod sqlite;

pub use sqlite::{SqliteStore, TableStats};
