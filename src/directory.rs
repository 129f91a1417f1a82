use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use log::{debug, trace};
use thiserror::Error;

use crate::models::{Fields, TableId};

/// Latest published fields per key for one table
pub type Slot = HashMap<String, Fields>;

#[derive(Debug, Error, PartialEq)]
pub enum DirectoryError {
    /// Nothing was ever published for this table
    #[error("Slot {0} has not been populated")]
    SlotAbsent(TableId),
    #[error("Key '{key}' is absent from slot {table}")]
    KeyAbsent { table: TableId, key: String },
    #[error("Field '{field}' is absent from {table} '{key}'")]
    FieldAbsent {
        table: TableId,
        key: String,
        field: String,
    },
    #[error("Malformed dependency path '{0}', expected '<key>/<field>'")]
    MalformedPath(String),
}

/// A Manager's declaration that it may read `path` ("<key>/<field>")
/// from another table's slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub table: TableId,
    pub path: String,
}

impl Dependency {
    pub fn new(store: &str, table: &str, path: &str) -> Self {
        Self {
            table: TableId::new(store, table),
            path: path.to_string(),
        }
    }

    /// Split the path on the first '/' into (key, field)
    pub fn key_and_field(&self) -> Result<(&str, &str), DirectoryError> {
        match self.path.split_once('/') {
            Some((key, field)) if !key.is_empty() && !field.is_empty() => Ok((key, field)),
            _ => Err(DirectoryError::MalformedPath(self.path.clone())),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.path)
    }
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<TableId, Slot>,
    subscriptions: BTreeSet<TableId>,
    // Bumped whenever a key is created, including after a remove
    incarnations: HashMap<(TableId, String), u64>,
    last_incarnation: u64,
}

/// Process-wide store of records that Managers published for each other.
///
/// Cloning gives another handle to the same store. All access happens from
/// the single event loop thread, one mutator at a time.
#[derive(Clone, Debug, Default)]
pub struct Directory {
    inner: Rc<RefCell<Inner>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert `key` in the slot for `table`, creating the slot on first use
    pub fn put(&self, table: &TableId, key: &str, fields: Fields) {
        trace!("Directory put {} '{}'", table, key);
        let mut inner = self.inner.borrow_mut();
        let created = inner
            .slots
            .entry(table.clone())
            .or_default()
            .insert(key.to_string(), fields)
            .is_none();
        if created {
            inner.last_incarnation += 1;
            let incarnation = inner.last_incarnation;
            inner
                .incarnations
                .insert((table.clone(), key.to_string()), incarnation);
        }
    }

    /// Remove `key` from the slot; no-op if the slot or key is absent.
    /// The slot itself is kept.
    pub fn remove(&self, table: &TableId, key: &str) {
        let mut inner = self.inner.borrow_mut();
        let removed = inner
            .slots
            .get_mut(table)
            .map(|slot| slot.remove(key).is_some())
            .unwrap_or(false);
        if removed {
            trace!("Directory remove {} '{}'", table, key);
            inner.incarnations.remove(&(table.clone(), key.to_string()));
        }
    }

    /// Identifies one lifetime of `key`: overwrites keep it, a remove
    /// followed by a put yields a new one
    pub fn incarnation(&self, table: &TableId, key: &str) -> Option<u64> {
        self.inner
            .borrow()
            .incarnations
            .get(&(table.clone(), key.to_string()))
            .copied()
    }

    /// Snapshot of the full key -> fields mapping for `table`
    pub fn get(&self, table: &TableId) -> Result<Slot, DirectoryError> {
        self.inner
            .borrow()
            .slots
            .get(table)
            .cloned()
            .ok_or_else(|| DirectoryError::SlotAbsent(table.clone()))
    }

    pub fn contains(&self, table: &TableId, key: &str) -> bool {
        self.inner
            .borrow()
            .slots
            .get(table)
            .map(|slot| slot.contains_key(key))
            .unwrap_or(false)
    }

    /// Resolve a single dependency value
    pub fn lookup(&self, dependency: &Dependency) -> Result<String, DirectoryError> {
        let (key, field) = dependency.key_and_field()?;
        let inner = self.inner.borrow();
        let slot = inner
            .slots
            .get(&dependency.table)
            .ok_or_else(|| DirectoryError::SlotAbsent(dependency.table.clone()))?;
        let fields = slot.get(key).ok_or_else(|| DirectoryError::KeyAbsent {
            table: dependency.table.clone(),
            key: key.to_string(),
        })?;
        fields
            .get(field)
            .cloned()
            .ok_or_else(|| DirectoryError::FieldAbsent {
                table: dependency.table.clone(),
                key: key.to_string(),
                field: field.to_string(),
            })
    }

    /// Record the tables a Manager depends on
    pub fn subscribe(&self, dependencies: &[Dependency]) {
        let mut inner = self.inner.borrow_mut();
        for dep in dependencies {
            if inner.subscriptions.insert(dep.table.clone()) {
                debug!("Directory subscription -> {}", dep.table);
            }
        }
    }

    /// De-duplicated set of tables any Manager declared as a dependency
    pub fn subscriptions(&self) -> BTreeSet<TableId> {
        self.inner.borrow().subscriptions.clone()
    }
}
