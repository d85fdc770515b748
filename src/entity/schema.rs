//! Schema builder - explicit per-type field registration
//!
//! Each persisted field is declared together with the accessor pair used to
//! read and write it, so no runtime probing of field or method names happens.

use std::any::type_name;
use std::collections::HashSet;

use super::descriptor::{
    Cardinality, EntityDescriptor, FieldDescriptor, Modifiers, RelationshipDescriptor, TypeTag,
};
use super::{Entity, Handle, Node};
use crate::materialize::{self, LoadContext};
use crate::naming::{self, ID_COLUMN};
use crate::session::Session;
use crate::value::{Column, FieldValue};
use crate::{Error, Result};

/// Loads the entity with the given identifier, type-erased
pub(crate) type Loader = fn(&Session, i64, &mut LoadContext) -> Result<Option<Node>>;

type Reader<T> = Box<dyn Fn(&T) -> FieldValue + Send + Sync>;
type Writer<T> = Box<dyn Fn(&mut T, FieldValue) -> std::result::Result<(), String> + Send + Sync>;

pub(crate) struct Accessor<T> {
    pub(crate) read: Reader<T>,
    pub(crate) write: Writer<T>,
    /// Present on entity-referencing columns
    pub(crate) loader: Option<Loader>,
}

/// Relationship options for `has_one` / `has_many` fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationship {
    cascade: bool,
    join_table: Option<String>,
    owner_column: Option<String>,
    referent_column: Option<String>,
}

impl Relationship {
    /// Saving the owner also saves the referents
    pub fn cascading() -> Self {
        Self {
            cascade: true,
            ..Self::default()
        }
    }

    /// Only link rows are written; referents must already be saved
    pub fn link_only() -> Self {
        Self::default()
    }

    pub fn join_table(mut self, name: impl Into<String>) -> Self {
        self.join_table = Some(name.into());
        self
    }

    pub fn owner_column(mut self, name: impl Into<String>) -> Self {
        self.owner_column = Some(name.into());
        self
    }

    pub fn referent_column(mut self, name: impl Into<String>) -> Self {
        self.referent_column = Some(name.into());
        self
    }

    fn resolve(&self, owner: &str, field: &str, cardinality: Cardinality) -> RelationshipDescriptor {
        RelationshipDescriptor {
            cardinality,
            cascade: self.cascade,
            join_table: self
                .join_table
                .clone()
                .unwrap_or_else(|| naming::join_table_name(owner, field)),
            owner_column: self
                .owner_column
                .clone()
                .unwrap_or_else(|| naming::join_column_name(owner)),
            referent_column: self
                .referent_column
                .clone()
                .unwrap_or_else(|| naming::join_column_name(field)),
        }
    }
}

struct Declared<T> {
    name: String,
    tag: TypeTag,
    modifiers: Modifiers,
    relationship: Option<(Relationship, Cardinality)>,
    target: Option<&'static str>,
    /// `None` for ignored and transient fields
    accessor: Option<Accessor<T>>,
}

impl<T: 'static> Declared<T> {
    /// Re-target an ancestor's field onto a descendant through a projection
    fn project<D: 'static>(self, get: fn(&D) -> &T, get_mut: fn(&mut D) -> &mut T) -> Declared<D> {
        let accessor = self.accessor.map(|acc| {
            let Accessor { read, write, loader } = acc;
            Accessor {
                read: Box::new(move |d: &D| read(get(d))) as Reader<D>,
                write: Box::new(move |d: &mut D, value: FieldValue| write(get_mut(d), value))
                    as Writer<D>,
                loader,
            }
        });
        Declared {
            name: self.name,
            tag: self.tag,
            modifiers: self.modifiers,
            relationship: self.relationship,
            target: self.target,
            accessor,
        }
    }
}

/// Built form of a schema: the descriptor plus one accessor per persisted field
pub(crate) struct Mapping<T> {
    pub(crate) descriptor: EntityDescriptor,
    accessors: Vec<Accessor<T>>,
}

impl<T> Mapping<T> {
    pub(crate) fn accessor(&self, field: &FieldDescriptor) -> Result<&Accessor<T>> {
        if field.entity != self.descriptor.name {
            return Err(Error::Misuse(format!(
                "field {}.{} does not belong to {}",
                field.entity, field.name, self.descriptor.name
            )));
        }
        self.accessors.get(field.index).ok_or_else(|| {
            Error::Misuse(format!("{} has no field at index {}", field.entity, field.index))
        })
    }
}

/// Field declarations for an entity type.
///
/// ```
/// use rowbind::{Entity, Schema};
///
/// #[derive(Default)]
/// struct Author {
///     id: Option<i64>,
///     name: String,
/// }
///
/// impl Entity for Author {
///     fn describe() -> Schema<Self> {
///         Schema::<Self>::new("Author")
///             .id("id", |a| &a.id, |a| &mut a.id)
///             .field("name", |a| &a.name, |a| &mut a.name)
///     }
/// }
/// ```
pub struct Schema<T> {
    name: String,
    table: Option<String>,
    fields: Vec<Declared<T>>,
    /// Flattened ancestor fields, appended after the type's own
    inherited: Vec<Declared<T>>,
}

impl<T: Entity> Schema<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: Vec::new(),
            inherited: Vec::new(),
        }
    }

    /// Override the table name (defaults to the upper snake case entity name)
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    pub fn id<F: Column + 'static>(
        self,
        name: &str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        self.scalar(name, Modifiers::identity(), get, get_mut)
    }

    pub fn field<F: Column + 'static>(
        self,
        name: &str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        self.scalar(name, Modifiers::default(), get, get_mut)
    }

    /// A unique-constrained field; unique fields form the natural key for `update`
    pub fn unique<F: Column + 'static>(
        self,
        name: &str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        self.scalar(name, Modifiers::unique(), get, get_mut)
    }

    pub fn ignore(self, name: &str) -> Self {
        self.excluded(name, Modifiers::ignored())
    }

    pub fn transient(self, name: &str) -> Self {
        self.excluded(name, Modifiers::transient())
    }

    /// A plain embedded reference, stored as the referent's identifier
    pub fn reference<U: Entity>(
        self,
        name: &str,
        get: fn(&T) -> Option<Handle<U>>,
        set: fn(&mut T, Option<Handle<U>>),
    ) -> Self {
        self.single::<U>(name, None, get, set)
    }

    /// A single-valued relationship: stored as an identifier column and a join row
    pub fn has_one<U: Entity>(
        self,
        name: &str,
        relationship: Relationship,
        get: fn(&T) -> Option<Handle<U>>,
        set: fn(&mut T, Option<Handle<U>>),
    ) -> Self {
        self.single::<U>(name, Some(relationship), get, set)
    }

    /// A collection relationship, realised only through its join table
    pub fn has_many<U: Entity>(
        mut self,
        name: &str,
        relationship: Relationship,
        get: fn(&T) -> Vec<Handle<U>>,
    ) -> Self {
        let field = name.to_string();
        let accessor = Accessor {
            read: Box::new(move |t: &T| {
                FieldValue::Entities(get(t).iter().map(Handle::erase).collect())
            }) as Reader<T>,
            write: Box::new(move |_: &mut T, _: FieldValue| {
                Err(format!("collection {} is read through its join table", field))
            }) as Writer<T>,
            loader: None,
        };
        self.fields.push(Declared {
            name: name.to_string(),
            tag: TypeTag::EntityCollection,
            modifiers: Modifiers::default(),
            relationship: Some((relationship, Cardinality::Collection)),
            target: Some(naming::short_type_name(type_name::<U>())),
            accessor: Some(accessor),
        });
        self
    }

    /// Inherit every field of `P`, appended after this type's own fields
    pub fn extends<P: Entity>(mut self, get: fn(&T) -> &P, get_mut: fn(&mut T) -> &mut P) -> Self {
        let parent = P::describe();
        for declared in parent.fields.into_iter().chain(parent.inherited) {
            self.inherited.push(declared.project(get, get_mut));
        }
        self
    }

    fn scalar<F: Column + 'static>(
        mut self,
        name: &str,
        modifiers: Modifiers,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        let accessor = Accessor {
            read: Box::new(move |t: &T| get(t).to_field()) as Reader<T>,
            write: Box::new(move |t: &mut T, value: FieldValue| {
                F::from_field(value).map(|parsed| *get_mut(t) = parsed)
            }) as Writer<T>,
            loader: None,
        };
        self.fields.push(Declared {
            name: name.to_string(),
            tag: F::TAG,
            modifiers,
            relationship: None,
            target: None,
            accessor: Some(accessor),
        });
        self
    }

    fn single<U: Entity>(
        mut self,
        name: &str,
        relationship: Option<Relationship>,
        get: fn(&T) -> Option<Handle<U>>,
        set: fn(&mut T, Option<Handle<U>>),
    ) -> Self {
        let target = naming::short_type_name(type_name::<U>());
        let accessor = Accessor {
            read: Box::new(move |t: &T| match get(t) {
                Some(handle) => FieldValue::Entity(handle.erase()),
                None => FieldValue::Null,
            }) as Reader<T>,
            write: Box::new(move |t: &mut T, value: FieldValue| match value {
                FieldValue::Null => {
                    set(t, None);
                    Ok(())
                }
                FieldValue::Entity(node) => {
                    let handle = node
                        .downcast::<U>()
                        .ok_or_else(|| format!("expected a {} entity", target))?;
                    set(t, Some(handle));
                    Ok(())
                }
                other => Err(format!("expected entity value, got {}", other.kind_name())),
            }) as Writer<T>,
            loader: Some(materialize::load_by_id::<U> as Loader),
        };
        self.fields.push(Declared {
            name: name.to_string(),
            tag: TypeTag::Entity,
            modifiers: Modifiers::default(),
            relationship: relationship.map(|r| (r, Cardinality::Single)),
            target: Some(target),
            accessor: Some(accessor),
        });
        self
    }

    fn excluded(mut self, name: &str, modifiers: Modifiers) -> Self {
        self.fields.push(Declared {
            name: name.to_string(),
            tag: TypeTag::Text,
            modifiers,
            relationship: None,
            target: None,
            accessor: None,
        });
        self
    }

    /// Validate the declarations and produce the descriptor with its accessors
    pub(crate) fn build(self) -> Result<Mapping<T>> {
        let entity = self.name;
        let config_error = |message: String| Error::Configuration {
            entity: entity.clone(),
            message,
        };

        let mut fields = Vec::new();
        let mut accessors = Vec::new();
        let mut excluded = Vec::new();
        let mut identity = None;
        let mut unique = Vec::new();
        let mut columns = HashSet::new();

        for declared in self.fields.into_iter().chain(self.inherited) {
            let accessor = match declared.accessor {
                Some(accessor) if declared.modifiers.is_persisted() => accessor,
                _ => {
                    excluded.push(declared.name);
                    continue;
                }
            };

            let index = fields.len();
            let column = if declared.modifiers.identity {
                if let Some(previous) = identity {
                    let previous: &FieldDescriptor = &fields[previous];
                    return Err(config_error(format!(
                        "multiple identity fields declared ({} and {})",
                        previous.name, declared.name
                    )));
                }
                if declared.tag != TypeTag::Integer {
                    return Err(config_error(format!(
                        "identity field {} must be an integer, not {}",
                        declared.name, declared.tag
                    )));
                }
                identity = Some(index);
                Some(ID_COLUMN.to_string())
            } else if declared.tag == TypeTag::EntityCollection {
                None
            } else {
                let column = naming::to_sql_name(&declared.name);
                if column == ID_COLUMN {
                    return Err(config_error(format!(
                        "field {} maps to the reserved {} column; declare it with `id`",
                        declared.name, ID_COLUMN
                    )));
                }
                Some(column)
            };

            if let Some(column) = &column {
                if !columns.insert(column.clone()) {
                    return Err(config_error(format!(
                        "field {} maps to column {} which is already taken",
                        declared.name, column
                    )));
                }
            }

            let relationship = match declared.relationship {
                Some((options, cardinality)) => {
                    let resolved = options.resolve(&entity, &declared.name, cardinality);
                    if resolved.owner_column == resolved.referent_column {
                        return Err(config_error(format!(
                            "relationship {} uses {} for both join columns",
                            declared.name, resolved.owner_column
                        )));
                    }
                    Some(resolved)
                }
                None => None,
            };

            if declared.modifiers.unique {
                unique.push(index);
            }

            fields.push(FieldDescriptor {
                entity: entity.clone(),
                name: declared.name,
                column,
                tag: declared.tag,
                modifiers: declared.modifiers,
                relationship,
                target: declared.target,
                index,
            });
            accessors.push(accessor);
        }

        let table = self
            .table
            .unwrap_or_else(|| naming::to_sql_name(&entity));

        Ok(Mapping {
            descriptor: EntityDescriptor {
                name: entity,
                table,
                fields,
                identity,
                unique,
                excluded,
            },
            accessors,
        })
    }
}
