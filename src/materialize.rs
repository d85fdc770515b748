//! Result materializer - store rows back into typed entities
//!
//! Rows are decoded field by field. A field that cannot be read is reported
//! as a coercion diagnostic and keeps its default value; the rest of the row
//! and the rest of the result set are still materialized.
//!
//! Entity columns hold the referent's identifier and are resolved by loading
//! the referent. A [`LoadContext`] remembers every entity loaded during one
//! read, so a referent shared by many rows (or a cycle back to an object
//! being loaded) resolves to the same handle.

use std::collections::HashMap;

use rusqlite::types::Value;

use crate::codec;
use crate::entity::{Entity, FieldDescriptor, Handle, Node, cache};
use crate::naming::ID_COLUMN;
use crate::row::Row;
use crate::session::Session;
use crate::value::FieldValue;
use crate::{Error, Result};

/// Entities loaded during one read, keyed by table and row id
#[derive(Debug, Default)]
pub struct LoadContext {
    loaded: HashMap<(String, i64), Node>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str, id: i64) -> Option<&Node> {
        self.loaded.get(&(table.to_string(), id))
    }

    fn insert(&mut self, table: &str, id: i64, node: Node) {
        self.loaded.insert((table.to_string(), id), node);
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

/// Build a `T` from one row
pub(crate) fn materialize<T: Entity>(
    session: &Session,
    row: &Row,
    context: &mut LoadContext,
) -> Result<Handle<T>> {
    let mapping = cache::mapping_of::<T>()?;
    let descriptor = &mapping.descriptor;
    let id = row.id();

    if let Some(id) = id {
        if let Some(handle) = context.get(&descriptor.table, id).and_then(Node::downcast::<T>) {
            return Ok(handle);
        }
    }

    let handle = Handle::new(T::default());
    if let Some(id) = id {
        let node = handle.erase();
        session.identities().borrow_mut().record(&node, id);
        context.insert(&descriptor.table, id, node);
    }

    let mut references: Vec<(&FieldDescriptor, i64)> = Vec::new();
    {
        let mut entity = handle.borrow_mut();
        for field in &descriptor.fields {
            let Some(column) = &field.column else {
                continue;
            };
            let Some(stored) = row.get(column) else {
                session.report(Error::Coercion {
                    entity: descriptor.name.clone(),
                    field: field.name.clone(),
                    message: format!("column {} is missing from the result", column),
                });
                continue;
            };
            if let Value::Null = stored {
                continue;
            }

            let decoded = codec::decode(stored, field).and_then(|value| {
                if field.is_entity_reference() {
                    references.push((field, value.as_integer().unwrap_or(0)));
                    Ok(())
                } else {
                    let accessor = mapping.accessor(field)?;
                    (accessor.write)(&mut *entity, value).map_err(|message| Error::Coercion {
                        entity: descriptor.name.clone(),
                        field: field.name.clone(),
                        message,
                    })
                }
            });
            if let Err(err) = decoded {
                session.report(err);
            }
        }
    }

    // Referents load with the entity unborrowed, so cycles can reach it
    for (field, referent_id) in references {
        if referent_id <= 0 {
            continue;
        }
        let accessor = mapping.accessor(field)?;
        let Some(loader) = accessor.loader else {
            continue;
        };
        match loader(session, referent_id, context)? {
            Some(node) => {
                let written = (accessor.write)(&mut *handle.borrow_mut(), FieldValue::Entity(node));
                if let Err(message) = written {
                    session.report(Error::Coercion {
                        entity: descriptor.name.clone(),
                        field: field.name.clone(),
                        message,
                    });
                }
            }
            None => tracing::debug!(
                "{}.{} refers to missing row {}",
                descriptor.name,
                field.name,
                referent_id
            ),
        }
    }

    Ok(handle)
}

/// Build one `T` per row, sharing referents between rows
pub(crate) fn materialize_all<T: Entity>(session: &Session, rows: &[Row]) -> Result<Vec<Handle<T>>> {
    let mut context = LoadContext::new();
    rows.iter()
        .map(|row| materialize::<T>(session, row, &mut context))
        .collect()
}

/// Load the `U` with the given identifier, reusing already loaded instances
pub(crate) fn load_by_id<U: Entity>(
    session: &Session,
    id: i64,
    context: &mut LoadContext,
) -> Result<Option<Node>> {
    let descriptor = cache::descriptor_of::<U>()?;
    if let Some(node) = context.get(&descriptor.table, id) {
        return Ok(Some(node.clone()));
    }

    let sql = format!("SELECT * FROM {} WHERE {} = ?", descriptor.table, ID_COLUMN);
    let rows = session.store().read_rows(&sql, &[Value::Integer(id)])?;
    match rows.first() {
        Some(row) => Ok(Some(materialize::<U>(session, row, context)?.erase())),
        None => Ok(None),
    }
}

/// Forward-only, lazily materializing sequence over an open result cursor.
///
/// The cursor is released as soon as it is exhausted, on [`close`](Self::close),
/// or when the scope that opened it ends.
pub struct EntityCursor<'c, T: Entity> {
    session: &'c Session,
    rows: Option<rusqlite::Rows<'c>>,
    columns: Vec<String>,
    peeked: Option<Handle<T>>,
    context: LoadContext,
}

impl<'c, T: Entity> EntityCursor<'c, T> {
    pub(crate) fn new(session: &'c Session, rows: rusqlite::Rows<'c>, columns: Vec<String>) -> Self {
        Self {
            session,
            rows: Some(rows),
            columns,
            peeked: None,
            context: LoadContext::new(),
        }
    }

    /// Whether another entity is available; closes the cursor once exhausted
    pub fn has_next(&mut self) -> Result<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        let Some(rows) = self.rows.as_mut() else {
            return Ok(false);
        };

        let row = match rows.next()? {
            Some(row) => Row::from_sqlite(row, &self.columns)?,
            None => {
                self.close();
                return Ok(false);
            }
        };

        let handle = materialize::<T>(self.session, &row, &mut self.context)?;
        self.peeked = Some(handle);
        Ok(true)
    }

    /// The next entity; advancing past the end is a misuse error
    pub fn next_entity(&mut self) -> Result<Handle<T>> {
        if self.has_next()? {
            if let Some(handle) = self.peeked.take() {
                return Ok(handle);
            }
        }
        Err(Error::Misuse("cursor advanced past its last row".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.rows.is_none()
    }

    /// Release the underlying result cursor
    pub fn close(&mut self) {
        if self.rows.take().is_some() {
            tracing::debug!("Closed cursor over {} columns", self.columns.len());
        }
        self.peeked = None;
    }
}

impl<T: Entity> Iterator for EntityCursor<'_, T> {
    type Item = Result<Handle<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => self.peeked.take().map(Ok),
            Ok(false) => None,
            Err(err) => {
                self.close();
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Author, Book, Event, Person, Status, session_with};

    fn book_row(id: i64, title: &str, author: i64) -> Row {
        let mut row = Row::new();
        row.set("ID", id);
        row.set("TITLE", title.to_string());
        row.set("AUTHOR", author);
        row
    }

    #[test]
    fn test_materialize_scalars() {
        let session = session_with::<Book>();
        let mut context = LoadContext::new();

        let book = materialize::<Book>(&session, &book_row(4, "Dune", 0), &mut context).unwrap();
        assert_eq!(book.borrow().id, Some(4));
        assert_eq!(book.borrow().title, "Dune");
        assert!(book.borrow().author.is_none());
        assert!(session.take_coercion_errors().is_empty());
    }

    #[test]
    fn test_referents_shared_between_rows() {
        let session = session_with::<Book>();
        session.create_table::<Author>().unwrap();
        session
            .execute_statement("INSERT INTO AUTHOR (ID, NAME) VALUES (9, 'Herbert')", &[])
            .unwrap();

        let rows = vec![book_row(1, "Dune", 9), book_row(2, "Children of Dune", 9)];
        let books = materialize_all::<Book>(&session, &rows).unwrap();

        let first = books[0].borrow().author.clone().unwrap();
        let second = books[1].borrow().author.clone().unwrap();
        assert!(first.same(&second));
        assert_eq!(first.borrow().name, "Herbert");
    }

    #[test]
    fn test_missing_referent_row_leaves_field_empty() {
        let session = session_with::<Book>();
        session.create_table::<Author>().unwrap();

        let mut context = LoadContext::new();
        let book = materialize::<Book>(&session, &book_row(1, "Orphan", 77), &mut context).unwrap();
        assert!(book.borrow().author.is_none());
    }

    #[test]
    fn test_self_reference_resolves_to_same_handle() {
        let session = session_with::<Person>();
        session
            .execute_statement("INSERT INTO PERSON (ID, NAME, PARTNER) VALUES (1, 'n', 1)", &[])
            .unwrap();

        let people = session.list_all::<Person>().unwrap();
        let person = &people[0];
        let partner = person.borrow().partner.clone().unwrap();
        assert!(partner.same(person));
    }

    #[test]
    fn test_coercion_errors_do_not_abort_the_row() {
        let session = session_with::<Event>();
        session
            .execute_statement(
                "INSERT INTO EVENT (ID, TITLE, ATTENDEES, STATUS) VALUES (1, 'launch', 'many', 'Cancelled')",
                &[],
            )
            .unwrap();

        let events = session.list_all::<Event>().unwrap();
        assert_eq!(events.len(), 1);
        let event = events[0].borrow();
        assert_eq!(event.title, "launch");
        assert_eq!(event.attendees, 0);
        assert_eq!(event.status, Status::Draft);

        let errors = session.take_coercion_errors();
        let fields: Vec<_> = errors
            .iter()
            .filter_map(|e| match e {
                Error::Coercion { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["attendees", "status"]);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let session = session_with::<Book>();
        let mut row = Row::new();
        row.set("ID", 1i64);
        row.set("TITLE", "Partial".to_string());

        let mut context = LoadContext::new();
        let book = materialize::<Book>(&session, &row, &mut context).unwrap();
        assert_eq!(book.borrow().title, "Partial");
        assert_eq!(session.take_coercion_errors().len(), 1);
    }
}
