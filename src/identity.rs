//! Identity map - row identifiers of objects that cannot carry their own
//!
//! Identifiers assigned during an unfinished unit of work are *staged*; they
//! become visible as *committed* (or get injected into the object's identity
//! field) only once the enclosing transaction commits. A rollback discards
//! them, so an object never observes the identifier of a row that does not
//! exist.
//!
//! Committed entries hold the object weakly: once every handle to it is
//! dropped the entry is swept, so reads do not accumulate in the map.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Weak;

use crate::entity::{HandleKey, Node};
use crate::value::FieldValue;
use crate::Result;

/// Committed entries are swept for dead objects once the map reaches this size
const MIN_SWEEP: usize = 64;

#[derive(Debug, Default)]
pub struct IdentityMap {
    committed: HashMap<HandleKey, (Weak<dyn Any>, i64)>,
    staged: HashMap<HandleKey, (Node, i64)>,
    sweep_at: usize,
}

/// Staged entries as they were at the start of a unit of work
#[derive(Debug)]
pub struct StagedSnapshot(HashMap<HandleKey, (Node, i64)>);

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier known for this object, staged entries first
    pub fn get(&self, key: HandleKey) -> Option<i64> {
        self.staged(key).or_else(|| self.committed(key))
    }

    pub fn staged(&self, key: HandleKey) -> Option<i64> {
        self.staged.get(&key).map(|(_, id)| *id)
    }

    pub fn committed(&self, key: HandleKey) -> Option<i64> {
        self.committed
            .get(&key)
            .filter(|(object, _)| object.strong_count() > 0)
            .map(|(_, id)| *id)
    }

    /// Stage an identifier assigned inside the current unit of work
    pub fn stage(&mut self, node: &Node, id: i64) {
        self.staged.insert(node.key(), (node.clone(), id));
    }

    /// Record a committed identifier directly
    pub fn record(&mut self, node: &Node, id: i64) {
        if self.committed.len() >= self.sweep_at.max(MIN_SWEEP) {
            self.prune();
        }
        self.committed.insert(node.key(), (node.downgrade(), id));
    }

    /// Drop committed entries whose objects are gone; returns how many were dropped
    pub fn prune(&mut self) -> usize {
        let before = self.committed.len();
        self.committed.retain(|_, (object, _)| object.strong_count() > 0);
        self.sweep_at = self.committed.len() * 2;
        before - self.committed.len()
    }

    /// Drain staged entries for promotion after a commit
    pub fn take_staged(&mut self) -> Vec<(Node, i64)> {
        self.staged.drain().map(|(_, entry)| entry).collect()
    }

    /// Drop staged entries after a rollback
    pub fn discard_staged(&mut self) -> usize {
        let count = self.staged.len();
        self.staged.clear();
        count
    }

    pub fn snapshot_staged(&self) -> StagedSnapshot {
        StagedSnapshot(self.staged.clone())
    }

    /// Put staged entries back as they were at `snapshot`
    pub fn restore_staged(&mut self, snapshot: StagedSnapshot) {
        self.staged = snapshot.0;
    }

    pub fn forget(&mut self, key: HandleKey) {
        self.committed.remove(&key);
        self.staged.remove(&key);
    }

    pub fn len(&self) -> usize {
        self.committed.len() + self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.staged.is_empty()
    }
}

/// Resolve the row identifier of an entity.
///
/// A staged identifier wins over the object's own identity field, which wins
/// over a committed map entry; identity values `<= 0` count as unassigned.
pub fn resolve_id(node: &Node, ids: &IdentityMap) -> Result<Option<i64>> {
    if let Some(id) = ids.staged(node.key()) {
        return Ok(Some(id));
    }
    if let Some(id) = declared_id(node)? {
        return Ok(Some(id));
    }
    Ok(ids.committed(node.key()))
}

/// The value of the object's identity field, if it declares one and it is set
pub fn declared_id(node: &Node) -> Result<Option<i64>> {
    let descriptor = node.descriptor()?;
    let Some(field) = descriptor.identity_field() else {
        return Ok(None);
    };
    match node.read(field)? {
        FieldValue::Integer(id) if id > 0 => Ok(Some(id)),
        _ => Ok(None),
    }
}
