//! Entities - persistable types, their schema and shared handles
//!
//! A type opts into persistence by implementing [`Entity`] and describing
//! its fields with a [`Schema`]. Instances that take part in object graphs
//! are shared through [`Handle`]s, which carry a stable [`HandleKey`] used
//! for identity tracking instead of value equality.

pub mod cache;
mod descriptor;
mod schema;

pub use descriptor::{
    Cardinality, EntityDescriptor, FieldDescriptor, Modifiers, RelationshipDescriptor, TypeTag,
};
pub use schema::{Relationship, Schema};

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::FieldValue;
use crate::{Error, Result};

/// A type that can be persisted.
///
/// `describe` is called once per type per process; the result is memoized
/// by [`cache`].
pub trait Entity: Default + 'static {
    fn describe() -> Schema<Self>;
}

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a handle, shared by all of its clones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleKey(u64);

impl HandleKey {
    fn next() -> Self {
        HandleKey(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared, mutable reference to an entity instance
pub struct Handle<T> {
    key: HandleKey,
    cell: Rc<RefCell<T>>,
}

impl<T: Entity> Handle<T> {
    pub fn new(value: T) -> Self {
        Self {
            key: HandleKey::next(),
            cell: Rc::new(RefCell::new(value)),
        }
    }

    /// Type-erased view of this handle
    pub fn erase(&self) -> Node {
        let record: Rc<RefCell<dyn Record>> = self.cell.clone();
        let any: Rc<dyn Any> = self.cell.clone();
        Node {
            key: self.key,
            record,
            any,
            descriptor: cache::descriptor_of::<T>,
        }
    }
}

impl<T> Handle<T> {
    pub fn key(&self) -> HandleKey {
        self.key
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.cell.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.cell.borrow_mut()
    }

    /// Whether both handles refer to the same instance
    pub fn same(&self, other: &Handle<T>) -> bool {
        self.key == other.key
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.try_borrow() {
            Ok(value) => f.debug_tuple("Handle").field(&self.key).field(&*value).finish(),
            Err(_) => f.debug_tuple("Handle").field(&self.key).field(&"<borrowed>").finish(),
        }
    }
}

/// Type-erased entity handle
#[derive(Clone)]
pub struct Node {
    key: HandleKey,
    record: Rc<RefCell<dyn Record>>,
    any: Rc<dyn Any>,
    descriptor: fn() -> Result<&'static EntityDescriptor>,
}

impl Node {
    pub fn key(&self) -> HandleKey {
        self.key
    }

    pub fn record(&self) -> &RefCell<dyn Record> {
        &self.record
    }

    /// Recover the typed handle, if this node holds a `U`
    pub fn downcast<U: Entity>(&self) -> Option<Handle<U>> {
        Rc::clone(&self.any)
            .downcast::<RefCell<U>>()
            .ok()
            .map(|cell| Handle { key: self.key, cell })
    }

    /// Non-owning reference to the instance, dead once every handle is dropped
    pub fn downgrade(&self) -> Weak<dyn Any> {
        Rc::downgrade(&self.any)
    }

    /// Descriptor of the entity behind this node
    pub fn descriptor(&self) -> Result<&'static EntityDescriptor> {
        (self.descriptor)()
    }

    /// Read one field without panicking on a conflicting borrow
    pub fn read(&self, field: &FieldDescriptor) -> Result<FieldValue> {
        self.record
            .try_borrow()
            .map_err(|_| Error::Misuse(format!("entity {} is mutably borrowed", self.key)))?
            .read(field)
    }

    /// Write one field without panicking on a conflicting borrow
    pub fn write(&self, field: &FieldDescriptor, value: FieldValue) -> Result<()> {
        self.record
            .try_borrow_mut()
            .map_err(|_| Error::Misuse(format!("entity {} is already borrowed", self.key)))?
            .write(field, value)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .descriptor()
            .map(|d| d.name.as_str())
            .unwrap_or("<unknown>");
        write!(f, "Node({} {})", name, self.key)
    }
}

/// Object-safe field access for any entity
pub trait Record {
    fn descriptor(&self) -> Result<&'static EntityDescriptor>;

    fn read(&self, field: &FieldDescriptor) -> Result<FieldValue>;

    fn write(&mut self, field: &FieldDescriptor, value: FieldValue) -> Result<()>;
}

impl<T: Entity> Record for T {
    fn descriptor(&self) -> Result<&'static EntityDescriptor> {
        cache::descriptor_of::<T>()
    }

    fn read(&self, field: &FieldDescriptor) -> Result<FieldValue> {
        let mapping = cache::mapping_of::<T>()?;
        let accessor = mapping.accessor(field)?;
        Ok((accessor.read)(self))
    }

    fn write(&mut self, field: &FieldDescriptor, value: FieldValue) -> Result<()> {
        let mapping = cache::mapping_of::<T>()?;
        let accessor = mapping.accessor(field)?;
        (accessor.write)(self, value).map_err(|message| Error::Coercion {
            entity: field.entity.clone(),
            field: field.name.clone(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Author, Book};

    #[test]
    fn test_clones_share_key() {
        let a = Handle::new(Author::named("Ann"));
        let b = a.clone();
        let c = Handle::new(Author::named("Ann"));

        assert!(a.same(&b));
        assert!(!a.same(&c));
        assert_eq!(a.erase().key(), b.key());
    }

    #[test]
    fn test_downcast_recovers_typed_handle() {
        let book = Handle::new(Book::titled("Dune"));
        let node = book.erase();

        let back = node.downcast::<Book>().unwrap();
        assert!(back.same(&book));
        assert!(node.downcast::<Author>().is_none());
    }

    #[test]
    fn test_downgrade_tracks_every_handle() {
        let book = Handle::new(Book::titled("Dune"));
        let weak = book.erase().downgrade();
        let clone = book.clone();

        drop(book);
        assert!(weak.upgrade().is_some());
        drop(clone);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_record_reads_and_writes_fields() {
        let book = Handle::new(Book::titled("Dune"));
        let node = book.erase();
        let descriptor = node.descriptor().unwrap();
        let title = descriptor.field("title").unwrap();

        let value = node.record().borrow().read(title).unwrap();
        assert_eq!(value, FieldValue::Text("Dune".into()));

        node.record()
            .borrow_mut()
            .write(title, FieldValue::Text("Emma".into()))
            .unwrap();
        assert_eq!(book.borrow().title, "Emma");

        let err = node
            .record()
            .borrow_mut()
            .write(title, FieldValue::Integer(3))
            .unwrap_err();
        assert!(err.is_coercion());
    }
}
