//! Field schema cache - one built mapping per entity type per process
//!
//! Mappings are built on first use and leaked, so lookups after the first
//! return `&'static` references without further locking than a read guard.
//! Concurrent first callers may both build; the first insert wins and every
//! caller observes the same mapping.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use super::descriptor::{EntityDescriptor, FieldDescriptor};
use super::schema::Mapping;
use super::Entity;
use crate::naming;
use crate::{Error, Result};

type Slot = std::result::Result<&'static (dyn Any + Send + Sync), (String, String)>;

static MAPPINGS: OnceLock<RwLock<HashMap<TypeId, Slot>>> = OnceLock::new();

fn mappings() -> &'static RwLock<HashMap<TypeId, Slot>> {
    MAPPINGS.get_or_init(|| RwLock::new(HashMap::new()))
}

fn slot_of<T: Entity>() -> Slot {
    let type_id = TypeId::of::<T>();

    if let Some(slot) = mappings()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&type_id)
    {
        return slot.clone();
    }

    // Built outside the lock: `describe` may consult other entity types
    let built = T::describe().build();

    let mut map = mappings().write().unwrap_or_else(PoisonError::into_inner);
    if let Some(slot) = map.get(&type_id) {
        return slot.clone();
    }
    let slot: Slot = match built {
        Ok(mapping) => {
            tracing::debug!(
                "Cached schema for {} ({} fields)",
                mapping.descriptor.name,
                mapping.descriptor.fields.len()
            );
            let leaked: &'static Mapping<T> = Box::leak(Box::new(mapping));
            Ok(leaked)
        }
        Err(Error::Configuration { entity, message }) => Err((entity, message)),
        Err(other) => Err((naming::short_type_name(type_name::<T>()).to_string(), other.to_string())),
    };
    map.insert(type_id, slot.clone());
    slot
}

/// Built mapping (descriptor plus accessors) for `T`
pub(crate) fn mapping_of<T: Entity>() -> Result<&'static Mapping<T>> {
    match slot_of::<T>() {
        Ok(any) => any.downcast_ref::<Mapping<T>>().ok_or_else(|| {
            Error::Misuse(format!("schema cache holds a foreign mapping for {}", type_name::<T>()))
        }),
        Err((entity, message)) => Err(Error::Configuration { entity, message }),
    }
}

/// Descriptor of `T`, computed once per process
pub fn descriptor_of<T: Entity>() -> Result<&'static EntityDescriptor> {
    mapping_of::<T>().map(|mapping| &mapping.descriptor)
}

/// Persisted fields of `T` in stable order (most-derived first)
pub fn fields_of<T: Entity>() -> Result<&'static [FieldDescriptor]> {
    descriptor_of::<T>().map(|descriptor| descriptor.fields.as_slice())
}
