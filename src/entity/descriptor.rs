//! Descriptors - the immutable schema data the mapping engine consumes
//!
//! A type's [`EntityDescriptor`] is computed once from its [`Schema`](super::Schema)
//! and never changes afterwards.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Value type of a field; selects the codec rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Integer,
    Float,
    Boolean,
    Text,
    Binary,
    /// Date/time-like values, stored as epoch milliseconds
    Timestamp,
    /// Enumerations, stored by variant name
    Enum,
    /// Arbitrary precision decimals, stored as canonical text
    Decimal,
    /// A single nested entity, stored as the referent's identifier
    Entity,
    /// A collection of nested entities, realised through a join table
    EntityCollection,
}

impl TypeTag {
    /// Get the string representation of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::Boolean => "boolean",
            TypeTag::Text => "text",
            TypeTag::Binary => "binary",
            TypeTag::Timestamp => "timestamp",
            TypeTag::Enum => "enum",
            TypeTag::Decimal => "decimal",
            TypeTag::Entity => "entity",
            TypeTag::EntityCollection => "entity_collection",
        }
    }

    /// SQLite column affinity used for this tag
    pub fn affinity(&self) -> Option<&'static str> {
        match self {
            TypeTag::Integer | TypeTag::Boolean | TypeTag::Timestamp | TypeTag::Entity => {
                Some("INTEGER")
            }
            TypeTag::Float => Some("REAL"),
            TypeTag::Text | TypeTag::Enum | TypeTag::Decimal => Some("TEXT"),
            TypeTag::Binary => Some("BLOB"),
            TypeTag::EntityCollection => None,
        }
    }

    /// Whether values of this tag reference other entities
    pub fn is_entity(&self) -> bool {
        matches!(self, TypeTag::Entity | TypeTag::EntityCollection)
    }
}

impl FromStr for TypeTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "integer" | "int" | "long" => Ok(TypeTag::Integer),
            "float" | "double" | "real" => Ok(TypeTag::Float),
            "boolean" | "bool" => Ok(TypeTag::Boolean),
            "text" | "string" => Ok(TypeTag::Text),
            "binary" | "blob" | "bytes" => Ok(TypeTag::Binary),
            "timestamp" | "date" | "datetime" => Ok(TypeTag::Timestamp),
            "enum" => Ok(TypeTag::Enum),
            "decimal" => Ok(TypeTag::Decimal),
            "entity" => Ok(TypeTag::Entity),
            "entity_collection" | "entities" => Ok(TypeTag::EntityCollection),
            _ => Err(Error::Misuse(format!("Unknown type tag: {}", s))),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Field modifiers declared in the schema
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Excluded from persistence by explicit request
    pub ignored: bool,
    /// Process-internal state that never reaches the store
    pub transient: bool,
    /// The row identifier field
    pub identity: bool,
    /// Part of the natural key used by `update`
    pub unique: bool,
}

impl Modifiers {
    pub fn identity() -> Self {
        Self { identity: true, ..Self::default() }
    }

    pub fn unique() -> Self {
        Self { unique: true, ..Self::default() }
    }

    pub fn ignored() -> Self {
        Self { ignored: true, ..Self::default() }
    }

    pub fn transient() -> Self {
        Self { transient: true, ..Self::default() }
    }

    /// Whether a field with these modifiers is written to the store
    pub fn is_persisted(&self) -> bool {
        !self.ignored && !self.transient
    }
}

/// Whether a relationship holds one referent or many
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Single,
    Collection,
}

/// Join-table metadata for a relationship field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    pub cardinality: Cardinality,
    /// Saving the owner also saves the referents
    pub cascade: bool,
    pub join_table: String,
    /// Join column holding the owner's identifier
    pub owner_column: String,
    /// Join column holding the referent's identifier
    pub referent_column: String,
}

/// One persisted field of an entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Entity the field belongs to
    pub entity: String,
    pub name: String,
    /// Storage column; `None` for collections, which have no column
    pub column: Option<String>,
    pub tag: TypeTag,
    pub modifiers: Modifiers,
    pub relationship: Option<RelationshipDescriptor>,
    /// Rust type name of the referenced entity, for entity-tagged fields
    pub target: Option<&'static str>,
    /// Position within the entity's field list
    pub index: usize,
}

impl FieldDescriptor {
    pub fn is_identity(&self) -> bool {
        self.modifiers.identity
    }

    pub fn is_unique(&self) -> bool {
        self.modifiers.unique
    }

    /// A nested entity stored as an identifier column (plain reference or single relationship)
    pub fn is_entity_reference(&self) -> bool {
        self.tag == TypeTag::Entity
    }

    pub fn is_relationship(&self) -> bool {
        self.relationship.is_some()
    }
}

/// Schema of an entity type, as consumed by the codec, resolver and materializer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Logical entity name
    pub name: String,
    pub table: String,
    /// Persisted fields, most-derived first
    pub fields: Vec<FieldDescriptor>,
    /// Index of the identity field within `fields`
    pub identity: Option<usize>,
    /// Indices of unique-constrained fields within `fields`
    pub unique: Vec<usize>,
    /// Declared fields excluded from persistence (ignored or transient)
    pub excluded: Vec<String>,
}

impl EntityDescriptor {
    pub fn identity_field(&self) -> Option<&FieldDescriptor> {
        self.identity.map(|i| &self.fields[i])
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.unique.iter().map(|&i| &self.fields[i])
    }

    pub fn relationships(&self) -> impl Iterator<Item = (&FieldDescriptor, &RelationshipDescriptor)> {
        self.fields
            .iter()
            .filter_map(|f| f.relationship.as_ref().map(|r| (f, r)))
    }

    /// Look up a persisted field by name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip_through_str() {
        for tag in [
            TypeTag::Integer,
            TypeTag::Float,
            TypeTag::Boolean,
            TypeTag::Text,
            TypeTag::Binary,
            TypeTag::Timestamp,
            TypeTag::Enum,
            TypeTag::Decimal,
            TypeTag::Entity,
            TypeTag::EntityCollection,
        ] {
            assert_eq!(tag.as_str().parse::<TypeTag>().unwrap(), tag);
        }
        assert!("pointer".parse::<TypeTag>().is_err());
    }

    #[test]
    fn test_affinity() {
        assert_eq!(TypeTag::Decimal.affinity(), Some("TEXT"));
        assert_eq!(TypeTag::Timestamp.affinity(), Some("INTEGER"));
        assert_eq!(TypeTag::EntityCollection.affinity(), None);
    }

    #[test]
    fn test_modifiers() {
        assert!(Modifiers::unique().is_persisted());
        assert!(!Modifiers::ignored().is_persisted());
        assert!(!Modifiers::transient().is_persisted());
    }
}
