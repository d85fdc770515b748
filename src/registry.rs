//! Registry - the set of persistable types an application declares
//!
//! Used by bulk tooling (table creation, listings); the per-object mapping
//! path never consults it.

use std::any::TypeId;

use crate::entity::{Entity, EntityDescriptor, cache};
use crate::session::Session;
use crate::Result;

type Describe = fn() -> Result<&'static EntityDescriptor>;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<(TypeId, Describe)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`; registering a type twice has no effect
    pub fn register<T: Entity>(mut self) -> Self {
        let type_id = TypeId::of::<T>();
        if !self.entries.iter().any(|(id, _)| *id == type_id) {
            self.entries.push((type_id, cache::descriptor_of::<T> as Describe));
        }
        self
    }

    /// Descriptors of every registered type, in registration order
    pub fn descriptors(&self) -> Result<Vec<&'static EntityDescriptor>> {
        self.entries.iter().map(|(_, describe)| describe()).collect()
    }

    /// Descriptor of the registered entity with this name or table
    pub fn find(&self, name: &str) -> Result<Option<&'static EntityDescriptor>> {
        Ok(self
            .descriptors()?
            .into_iter()
            .find(|d| d.name == name || d.table.eq_ignore_ascii_case(name)))
    }

    /// Create the tables of every registered type
    pub fn create_tables(&self, session: &Session) -> Result<usize> {
        let descriptors = self.descriptors()?;
        for descriptor in &descriptors {
            session.store().create_tables(descriptor)?;
        }
        tracing::info!("Created tables for {} entities", descriptors.len());
        Ok(descriptors.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
