//! Session - the persistence orchestrator
//!
//! A session owns one store connection and one identity map. Every write
//! operation runs as a unit of work inside a single SQLite transaction;
//! identifiers assigned during the unit become visible to the saved objects
//! only once that transaction commits.
//!
//! When the caller already holds a transaction (opened with a raw `BEGIN`),
//! a unit runs inside a savepoint instead. Its identifiers stay staged until
//! the caller's transaction ends, and are promoted or dropped depending on
//! whether it committed.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use rusqlite::params_from_iter;
use rusqlite::types::Value;

use crate::codec;
use crate::config::{self, RowbindConfig};
use crate::entity::{Entity, Handle, Node, cache};
use crate::identity::{self, IdentityMap};
use crate::materialize::{self, EntityCursor};
use crate::naming::{self, ID_COLUMN, placeholders};
use crate::query::Query;
use crate::relationship::{self, SavePlan};
use crate::row::Row;
use crate::storage::SqliteStore;
use crate::value::FieldValue;
use crate::{Error, Result};

/// Result of [`Session::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Existing rows were updated
    Updated(usize),
    /// No row matched, so the object was inserted with this identifier
    Inserted(i64),
}

impl UpdateOutcome {
    pub fn rows_affected(&self) -> usize {
        match self {
            UpdateOutcome::Updated(rows) => *rows,
            UpdateOutcome::Inserted(_) => 1,
        }
    }

    pub fn inserted_id(&self) -> Option<i64> {
        match self {
            UpdateOutcome::Inserted(id) => Some(*id),
            UpdateOutcome::Updated(_) => None,
        }
    }
}

/// Outcome of a batch operation; a failed batch affected nothing
#[derive(Debug)]
pub struct BatchReport {
    affected: usize,
    error: Option<Error>,
}

impl BatchReport {
    pub fn affected(&self) -> usize {
        self.affected
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<usize> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.affected),
        }
    }
}

/// An entity column written as `0` that must be patched once its referent has an id
struct PendingReference {
    table: String,
    row_id: i64,
    column: String,
    referent: Node,
}

const UNIT_SAVEPOINT: &str = "rowbind_unit";

// How the connection's last transaction ended, as reported by SQLite hooks
const TX_OPEN: u8 = 0;
const TX_COMMITTED: u8 = 1;
const TX_ROLLED_BACK: u8 = 2;

struct DepthGuard<'a>(&'a Cell<u32>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<u32>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

pub struct Session {
    store: SqliteStore,
    identities: RefCell<IdentityMap>,
    diagnostics: RefCell<Vec<Error>>,
    depth: Cell<u32>,
    /// Staged ids wait for a transaction the caller opened
    deferred: Cell<bool>,
    tx_outcome: Arc<AtomicU8>,
    log_saves: bool,
}

impl Session {
    pub fn new(store: SqliteStore) -> Self {
        let tx_outcome = Arc::new(AtomicU8::new(TX_OPEN));

        let on_commit = Arc::clone(&tx_outcome);
        store.connection().commit_hook(Some(move || {
            on_commit.store(TX_COMMITTED, Ordering::SeqCst);
            false
        }));
        let on_rollback = Arc::clone(&tx_outcome);
        store.connection().rollback_hook(Some(move || {
            on_rollback.store(TX_ROLLED_BACK, Ordering::SeqCst);
        }));

        Self {
            store,
            identities: RefCell::new(IdentityMap::new()),
            diagnostics: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            deferred: Cell::new(false),
            tx_outcome,
            log_saves: false,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(SqliteStore::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(SqliteStore::open_in_memory()?))
    }

    /// Open the configured database (in memory when none is configured)
    pub fn from_config(config: &RowbindConfig) -> Result<Self> {
        let session = match &config.database {
            Some(database) => {
                let path = Path::new(database);
                config::ensure_db_dir(path)?;
                Self::open(path)?
            }
            None => Self::open_in_memory()?,
        };
        Ok(session.with_save_logging(config.debug))
    }

    /// Log every saved object at info level instead of debug
    pub fn with_save_logging(mut self, enabled: bool) -> Self {
        self.log_saves = enabled;
        self
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn identities(&self) -> &RefCell<IdentityMap> {
        &self.identities
    }

    /// Row identifier of a saved or loaded object, if known
    pub fn id_of<T: Entity>(&self, entity: &Handle<T>) -> Result<Option<i64>> {
        self.settle();
        identity::resolve_id(&entity.erase(), &self.identities.borrow())
    }

    /// Record a per-field problem that did not abort the operation
    pub(crate) fn report(&self, err: Error) {
        tracing::warn!("{}", err);
        self.diagnostics.borrow_mut().push(err);
    }

    /// Drain the coercion problems collected while reading
    pub fn take_coercion_errors(&self) -> Vec<Error> {
        std::mem::take(&mut *self.diagnostics.borrow_mut())
    }

    /// Create the table and join tables of `T`
    pub fn create_table<T: Entity>(&self) -> Result<()> {
        self.store.create_tables(cache::descriptor_of::<T>()?)
    }

    // ========== Units of Work ==========

    /// Run `body` as one atomic unit.
    ///
    /// Nested units join the enclosing one. On success the transaction
    /// commits and staged identifiers are handed to their objects; on error
    /// the transaction rolls back and staged identifiers are dropped.
    pub fn atomic<R>(&self, body: impl FnOnce() -> Result<R>) -> Result<R> {
        if self.depth.get() > 0 {
            return body();
        }
        self.settle();

        let conn = self.store.connection();
        if !conn.is_autocommit() {
            return self.atomic_in_savepoint(body);
        }

        let tx = conn.unchecked_transaction()?;
        let _depth = DepthGuard::enter(&self.depth);
        let outcome = body().and_then(|value| {
            tx.commit()?;
            Ok(value)
        });
        self.finish_unit(outcome.is_ok());
        outcome
    }

    /// Run a unit inside a transaction the caller opened.
    ///
    /// A failure rolls back to the savepoint, leaving the caller's earlier
    /// work intact. Identifiers stay staged until [`settle`](Self::settle)
    /// sees the caller's transaction end.
    fn atomic_in_savepoint<R>(&self, body: impl FnOnce() -> Result<R>) -> Result<R> {
        let conn = self.store.connection();
        let snapshot = self.identities.borrow().snapshot_staged();
        conn.execute_batch(&format!("SAVEPOINT {}", UNIT_SAVEPOINT))?;

        let outcome = {
            let _depth = DepthGuard::enter(&self.depth);
            body().and_then(|value| {
                conn.execute_batch(&format!("RELEASE {}", UNIT_SAVEPOINT))?;
                Ok(value)
            })
        };

        match &outcome {
            Ok(_) => self.deferred.set(true),
            Err(_) => {
                let undo = format!("ROLLBACK TO {0}; RELEASE {0}", UNIT_SAVEPOINT);
                if let Err(err) = conn.execute_batch(&undo) {
                    tracing::warn!("Could not roll back to {}: {}", UNIT_SAVEPOINT, err);
                }
                self.identities.borrow_mut().restore_staged(snapshot);
            }
        }
        // The caller's transaction is still open, whatever the hooks saw
        self.tx_outcome.store(TX_OPEN, Ordering::SeqCst);
        outcome
    }

    /// Promote or drop identifiers staged inside a caller's transaction once
    /// that transaction has ended. A no-op while it is still open.
    pub fn settle(&self) {
        if !self.deferred.get() || !self.store.connection().is_autocommit() {
            return;
        }
        self.deferred.set(false);
        let committed = self.tx_outcome.swap(TX_OPEN, Ordering::SeqCst) == TX_COMMITTED;
        tracing::debug!(
            "Caller transaction {}",
            if committed { "committed" } else { "rolled back" }
        );
        self.finish_unit(committed);
    }

    fn finish_unit(&self, committed: bool) {
        if !committed {
            let dropped = self.identities.borrow_mut().discard_staged();
            if dropped > 0 {
                tracing::debug!("Rolled back {} staged identifiers", dropped);
            }
            return;
        }

        let staged = self.identities.borrow_mut().take_staged();
        for (node, id) in staged {
            match inject_id(&node, id) {
                Ok(true) => {}
                Ok(false) => self.identities.borrow_mut().record(&node, id),
                Err(err) => {
                    tracing::warn!("Could not assign id {} to {:?}: {}", id, node, err);
                    self.identities.borrow_mut().record(&node, id);
                }
            }
        }
    }

    // ========== Save ==========

    /// Save an object and everything it cascades to; returns its row id
    pub fn save<T: Entity>(&self, entity: &Handle<T>) -> Result<i64> {
        let root = entity.erase();
        self.atomic(|| self.persist_graph(&root))
    }

    fn persist_graph(&self, root: &Node) -> Result<i64> {
        let plan = relationship::plan_save(root)?;
        let mut pending = Vec::new();

        for member in &plan.members {
            self.write_row(member, &mut pending)?;
        }
        let id = self.write_row(root, &mut pending)?;

        self.fix_references(pending)?;
        self.flush_links(&plan, true)?;
        Ok(id)
    }

    /// Upsert one object's row and stage its identifier
    fn write_row(&self, node: &Node, pending: &mut Vec<PendingReference>) -> Result<i64> {
        let descriptor = node.descriptor()?;
        let encoded = codec::encode_row(node, &self.identities.borrow())?;
        let mut row = encoded.row;

        let known = match identity::declared_id(node)? {
            Some(id) => Some(id),
            None => self.identities.borrow().get(node.key()),
        };
        if let Some(id) = known {
            row.set(ID_COLUMN, id);
        }

        let id = self.store.insert_or_replace(&descriptor.table, &row)?;
        self.identities.borrow_mut().stage(node, id);

        if self.log_saves {
            tracing::info!("{} saved : {}", descriptor.name, id);
        } else {
            tracing::debug!("{} saved : {}", descriptor.name, id);
        }

        pending.extend(encoded.pending.into_iter().map(|(column, referent)| PendingReference {
            table: descriptor.table.clone(),
            row_id: id,
            column,
            referent,
        }));
        Ok(id)
    }

    fn fix_references(&self, pending: Vec<PendingReference>) -> Result<()> {
        for reference in pending {
            let referent_id = identity::resolve_id(&reference.referent, &self.identities.borrow())?;
            let Some(referent_id) = referent_id else {
                tracing::debug!(
                    "{}.{} of row {} refers to an unsaved entity; left as 0",
                    reference.table,
                    reference.column,
                    reference.row_id
                );
                continue;
            };

            let mut row = Row::new();
            row.set(reference.column, referent_id);
            self.store.update(
                &reference.table,
                &row,
                &format!("{} = ?", ID_COLUMN),
                &[Value::Integer(reference.row_id)],
            )?;
        }
        Ok(())
    }

    /// Write join rows; with `strict`, an endpoint without an id aborts the unit
    fn flush_links(&self, plan: &SavePlan, strict: bool) -> Result<usize> {
        let mut written = 0;
        for (table, links) in &plan.joins {
            for link in links {
                let ids = self.identities.borrow();
                let owner = identity::resolve_id(&link.owner, &ids)?;
                let referent = identity::resolve_id(&link.referent, &ids)?;
                drop(ids);

                let (Some(owner), Some(referent)) = (owner, referent) else {
                    if strict {
                        return Err(Error::UnsavedReference {
                            entity: link.owner.descriptor()?.name.clone(),
                            field: link.field.clone(),
                        });
                    }
                    continue;
                };

                let mut row = Row::new();
                row.set(link.owner_column.clone(), owner);
                row.set(link.referent_column.clone(), referent);
                if self.store.insert_or_ignore(table, &row)? {
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    // ========== Update / Delete ==========

    /// Update the object's row, keyed by its unique fields when it has any,
    /// otherwise by its id. Falls back to a save when no row matches.
    pub fn update<T: Entity>(&self, entity: &Handle<T>) -> Result<UpdateOutcome> {
        let node = entity.erase();
        self.atomic(|| self.update_node(&node))
    }

    fn update_node(&self, node: &Node) -> Result<UpdateOutcome> {
        let descriptor = node.descriptor()?;

        let (filter, args) = if descriptor.unique.is_empty() {
            let id = identity::resolve_id(node, &self.identities.borrow())?;
            match id {
                Some(id) => (format!("{} = ?", ID_COLUMN), vec![Value::Integer(id)]),
                None => return Ok(UpdateOutcome::Inserted(self.persist_graph(node)?)),
            }
        } else {
            let ids = self.identities.borrow();
            let mut clauses = Vec::new();
            let mut args = Vec::new();
            for field in descriptor.unique_fields() {
                let Some(column) = &field.column else {
                    continue;
                };
                clauses.push(format!("{} = ?", column));
                args.push(codec::encode(&node.read(field)?, field, &ids)?);
            }
            (clauses.join(" AND "), args)
        };

        let encoded = codec::encode_row(node, &self.identities.borrow())?;
        let changed = if encoded.row.is_empty() {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", descriptor.table, filter);
            self.store.count(&sql, &args)? as usize
        } else {
            self.store.update(&descriptor.table, &encoded.row, &filter, &args)?
        };

        if changed == 0 {
            tracing::debug!("No {} row matched {}; inserting", descriptor.name, filter);
            return Ok(UpdateOutcome::Inserted(self.persist_graph(node)?));
        }

        self.flush_links(&relationship::plan_links(node)?, false)?;
        Ok(UpdateOutcome::Updated(changed))
    }

    /// Delete the object's row; false when it was never persisted
    pub fn delete<T: Entity>(&self, entity: &Handle<T>) -> Result<bool> {
        self.delete_node(&entity.erase())
    }

    fn delete_node(&self, node: &Node) -> Result<bool> {
        let descriptor = node.descriptor()?;
        let id = identity::resolve_id(node, &self.identities.borrow())?;
        let Some(id) = id.filter(|id| *id > 0) else {
            tracing::debug!("Cannot delete {}: it was never persisted", descriptor.name);
            return Ok(false);
        };

        let deleted = self.store.delete(
            &descriptor.table,
            Some(&format!("{} = ?", ID_COLUMN)),
            &[Value::Integer(id)],
        )?;
        self.identities.borrow_mut().forget(node.key());
        tracing::info!("{} deleted : {}", descriptor.name, id);
        Ok(deleted > 0)
    }

    // ========== Batches ==========

    pub fn save_in_tx<T: Entity>(&self, entities: &[Handle<T>]) -> BatchReport {
        self.batch("save", entities, |node| self.persist_graph(node).map(|_| 1))
    }

    pub fn update_in_tx<T: Entity>(&self, entities: &[Handle<T>]) -> BatchReport {
        self.batch("update", entities, |node| {
            self.update_node(node).map(|outcome| outcome.rows_affected())
        })
    }

    pub fn delete_in_tx<T: Entity>(&self, entities: &[Handle<T>]) -> BatchReport {
        self.batch("delete", entities, |node| self.delete_node(node).map(usize::from))
    }

    fn batch<T: Entity>(
        &self,
        operation: &str,
        entities: &[Handle<T>],
        step: impl Fn(&Node) -> Result<usize>,
    ) -> BatchReport {
        let outcome = self.atomic(|| {
            let mut affected = 0;
            for entity in entities {
                affected += step(&entity.erase())?;
            }
            Ok(affected)
        });

        match outcome {
            Ok(affected) => BatchReport {
                affected,
                error: None,
            },
            Err(err) => {
                tracing::warn!(
                    "{} batch of {} {} rolled back: {}",
                    operation,
                    entities.len(),
                    naming::short_type_name(std::any::type_name::<T>()),
                    err
                );
                BatchReport {
                    affected: 0,
                    error: Some(err),
                }
            }
        }
    }

    // ========== Reads ==========

    pub fn find<T: Entity>(&self, query: &Query) -> Result<Vec<Handle<T>>> {
        let descriptor = cache::descriptor_of::<T>()?;
        let rows = self
            .store
            .read_rows(&query.select_sql(&descriptor.table), query.arguments())?;
        materialize::materialize_all::<T>(self, &rows)
    }

    pub fn find_by_id<T: Entity>(&self, id: i64) -> Result<Option<Handle<T>>> {
        let query = Query::new().filter(format!("{} = ?", ID_COLUMN)).arg(id).limit(1);
        Ok(self.find::<T>(&query)?.into_iter().next())
    }

    pub fn find_by_ids<T: Entity>(&self, ids: &[i64]) -> Result<Vec<Handle<T>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::new()
            .filter(format!("{} IN ({})", ID_COLUMN, placeholders(ids.len())))
            .args(ids);
        self.find::<T>(&query)
    }

    /// The single matching object; more than one match is a cardinality error
    pub fn find_unique<T: Entity>(&self, query: &Query) -> Result<Option<Handle<T>>> {
        let descriptor = cache::descriptor_of::<T>()?;
        let rows = self
            .store
            .read_rows(&query.select_sql(&descriptor.table), query.arguments())?;
        if rows.len() > 1 {
            return Err(Error::Cardinality {
                entity: descriptor.name.clone(),
                count: rows.len(),
            });
        }
        Ok(materialize::materialize_all::<T>(self, &rows)?.into_iter().next())
    }

    pub fn list_all<T: Entity>(&self) -> Result<Vec<Handle<T>>> {
        self.find::<T>(&Query::new())
    }

    pub fn list_all_ordered<T: Entity>(&self, order_by: &str) -> Result<Vec<Handle<T>>> {
        self.find::<T>(&Query::new().order_by(order_by))
    }

    pub fn first<T: Entity>(&self) -> Result<Option<Handle<T>>> {
        let query = Query::new().order_by(format!("{} ASC", ID_COLUMN)).limit(1);
        Ok(self.find::<T>(&query)?.into_iter().next())
    }

    pub fn last<T: Entity>(&self) -> Result<Option<Handle<T>>> {
        let query = Query::new().order_by(format!("{} DESC", ID_COLUMN)).limit(1);
        Ok(self.find::<T>(&query)?.into_iter().next())
    }

    pub fn count<T: Entity>(&self, query: &Query) -> Result<i64> {
        let descriptor = cache::descriptor_of::<T>()?;
        self.store
            .count(&query.count_sql(&descriptor.table), query.arguments())
    }

    pub fn count_all<T: Entity>(&self) -> Result<i64> {
        self.count::<T>(&Query::new())
    }

    /// Materialize the result of an arbitrary `SELECT`
    pub fn find_with_query<T: Entity>(&self, sql: &str, args: &[Value]) -> Result<Vec<Handle<T>>> {
        let rows = self.store.read_rows(sql, args)?;
        materialize::materialize_all::<T>(self, &rows)
    }

    /// Objects linked to `owner` through its relationship field `field`
    pub fn find_related<O: Entity, T: Entity>(
        &self,
        owner: &Handle<O>,
        field: &str,
    ) -> Result<Vec<Handle<T>>> {
        let owner_descriptor = cache::descriptor_of::<O>()?;
        let descriptor = cache::descriptor_of::<T>()?;

        let relationship = owner_descriptor
            .field(field)
            .and_then(|f| f.relationship.as_ref().map(|r| (f, r)));
        let Some((field, relationship)) = relationship else {
            return Err(Error::Misuse(format!(
                "{} has no relationship field {}",
                owner_descriptor.name, field
            )));
        };
        let target = naming::short_type_name(std::any::type_name::<T>());
        if field.target != Some(target) {
            return Err(Error::Misuse(format!(
                "{}.{} does not refer to {}",
                owner_descriptor.name, field.name, target
            )));
        }

        let Some(owner_id) = self.id_of(owner)? else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT a.* FROM {table} a INNER JOIN {join} b ON a.{id} = b.{referent} WHERE b.{owner} = ?",
            table = descriptor.table,
            join = relationship.join_table,
            id = ID_COLUMN,
            referent = relationship.referent_column,
            owner = relationship.owner_column,
        );
        self.find_with_query::<T>(&sql, &[Value::Integer(owner_id)])
    }

    /// Row ids selected by an arbitrary query (its `ID` column)
    pub fn query_ids(&self, sql: &str, args: &[Value]) -> Result<Vec<i64>> {
        Ok(self
            .store
            .read_rows(sql, args)?
            .iter()
            .filter_map(Row::id)
            .collect())
    }

    // ========== Lazy Reads ==========

    /// Stream the matching objects through a cursor that lives for the closure
    pub fn with_cursor<T: Entity, R>(
        &self,
        query: &Query,
        f: impl FnOnce(&mut EntityCursor<'_, T>) -> Result<R>,
    ) -> Result<R> {
        let descriptor = cache::descriptor_of::<T>()?;
        self.with_query_cursor(&query.select_sql(&descriptor.table), query.arguments(), f)
    }

    pub fn with_query_cursor<T: Entity, R>(
        &self,
        sql: &str,
        args: &[Value],
        f: impl FnOnce(&mut EntityCursor<'_, T>) -> Result<R>,
    ) -> Result<R> {
        tracing::debug!("{}", sql);
        let mut stmt = self.store.connection().prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt.query(params_from_iter(args.iter()))?;

        let mut cursor = EntityCursor::new(self, rows, columns);
        let outcome = f(&mut cursor);
        cursor.close();
        outcome
    }

    // ========== Bulk ==========

    pub fn delete_all<T: Entity>(&self) -> Result<usize> {
        let descriptor = cache::descriptor_of::<T>()?;
        self.store.delete(&descriptor.table, None, &[])
    }

    pub fn delete_where<T: Entity>(&self, filter: &str, args: &[Value]) -> Result<usize> {
        let descriptor = cache::descriptor_of::<T>()?;
        self.store.delete(&descriptor.table, Some(filter), args)
    }

    /// Run a raw statement; `COMMIT` / `ROLLBACK` issued here settle staged ids
    pub fn execute_statement(&self, sql: &str, args: &[Value]) -> Result<usize> {
        let changed = self.store.execute(sql, args)?;
        self.settle();
        Ok(changed)
    }
}

/// Write `id` into the object's identity field; false when it has none
fn inject_id(node: &Node, id: i64) -> Result<bool> {
    let descriptor = node.descriptor()?;
    match descriptor.identity_field() {
        Some(field) => {
            node.write(field, FieldValue::Integer(id))?;
            Ok(true)
        }
        None => Ok(false),
    }
}
