//! In-memory collection with single-field secondary indexes
//!
//! # API
//!
//! - `insert(doc)` / `remove(rid)` keep every index in step with the records
//! - `create_index` / `drop_index` bump the catalog epoch
//! - `next_record_after(rid)` drives resumable collection scans
//! - `get(rid)` fails for records marked corrupt (modelled storage fault)

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::btree::{IndexKey, IndexTree};
use super::errors::{CatalogError, CatalogResult};

/// Record identity; stable for the record's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    pub const MIN: RecordId = RecordId(0);
    pub const MAX: RecordId = RecordId(u64::MAX);
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index descriptor as published to planners
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub field: String,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    descriptor: IndexDescriptor,
    tree: IndexTree,
}

/// A collection of JSON documents
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    records: BTreeMap<RecordId, Value>,
    next_id: u64,
    indexes: BTreeMap<String, IndexEntry>,
    epoch: u64,
    corrupt: BTreeSet<RecordId>,
    dropped: bool,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: BTreeMap::new(),
            next_id: 1,
            indexes: BTreeMap::new(),
            epoch: 0,
            corrupt: BTreeSet::new(),
            dropped: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog version; changes whenever the index set changes
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Insert a document, returning its new record id
    pub fn insert(&mut self, doc: Value) -> RecordId {
        let rid = RecordId(self.next_id);
        self.next_id += 1;
        for entry in self.indexes.values_mut() {
            if let Some(key) = doc.get(&entry.descriptor.field).and_then(IndexKey::from_json) {
                entry.tree.insert(key, rid);
            }
        }
        self.records.insert(rid, doc);
        rid
    }

    /// Remove a document; returns the removed body
    pub fn remove(&mut self, rid: RecordId) -> Option<Value> {
        let doc = self.records.remove(&rid)?;
        for entry in self.indexes.values_mut() {
            if let Some(key) = doc.get(&entry.descriptor.field).and_then(IndexKey::from_json) {
                entry.tree.remove(&key, rid);
            }
        }
        self.corrupt.remove(&rid);
        Some(doc)
    }

    /// Read a document. Missing records are `Ok(None)`; corrupt ones fail.
    pub fn get(&self, rid: RecordId) -> CatalogResult<Option<&Value>> {
        if self.corrupt.contains(&rid) {
            return Err(CatalogError::DataCorruption(rid));
        }
        Ok(self.records.get(&rid))
    }

    /// Next record id in storage order strictly after `after`
    pub fn next_record_after(&self, after: Option<RecordId>) -> Option<RecordId> {
        match after {
            None => self.records.keys().next().copied(),
            Some(rid) => self
                .records
                .range((std::ops::Bound::Excluded(rid), std::ops::Bound::Unbounded))
                .next()
                .map(|(r, _)| *r),
        }
    }

    /// Make future reads of `rid` fail with a storage fault
    pub fn mark_corrupt(&mut self, rid: RecordId) {
        self.corrupt.insert(rid);
    }

    /// Build a new index over the existing records
    pub fn create_index(&mut self, descriptor: IndexDescriptor) -> CatalogResult<()> {
        if self.indexes.contains_key(&descriptor.name) {
            return Err(CatalogError::IndexExists(descriptor.name));
        }
        let mut tree = IndexTree::new();
        for (rid, doc) in &self.records {
            if let Some(key) = doc.get(&descriptor.field).and_then(IndexKey::from_json) {
                tree.insert(key, *rid);
            }
        }
        self.indexes
            .insert(descriptor.name.clone(), IndexEntry { descriptor, tree });
        self.epoch += 1;
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> CatalogResult<()> {
        self.indexes
            .remove(name)
            .ok_or_else(|| CatalogError::IndexNotFound(name.to_string()))?;
        self.epoch += 1;
        Ok(())
    }

    /// Drop every record and index; the collection stays unusable
    pub fn drop_collection(&mut self) {
        self.records.clear();
        self.indexes.clear();
        self.corrupt.clear();
        self.dropped = true;
        self.epoch += 1;
    }

    pub fn index(&self, name: &str) -> Option<&IndexTree> {
        self.indexes.get(name).map(|e| &e.tree)
    }

    pub fn descriptor(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.get(name).map(|e| &e.descriptor)
    }

    /// Tree of `name`, only while it still indexes `field`
    pub fn index_on(&self, name: &str, field: &str) -> Option<&IndexTree> {
        self.indexes
            .get(name)
            .filter(|e| e.descriptor.field == field)
            .map(|e| &e.tree)
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Descriptors in index-name order
    pub fn descriptors(&self) -> impl Iterator<Item = &IndexDescriptor> {
        self.indexes.values().map(|e| &e.descriptor)
    }

    pub fn index_names(&self) -> BTreeSet<String> {
        self.indexes.keys().cloned().collect()
    }
}

/// Collection handle shared between operations.
///
/// Holding the read guard is what a yield releases.
#[derive(Debug, Clone)]
pub struct SharedCollection {
    inner: Arc<RwLock<Collection>>,
}

impl SharedCollection {
    pub fn new(collection: Collection) -> Self {
        Self {
            inner: Arc::new(RwLock::new(collection)),
        }
    }

    pub fn read(&self) -> CatalogResult<RwLockReadGuard<'_, Collection>> {
        self.inner.read().map_err(|_| CatalogError::LockPoisoned)
    }

    pub fn write(&self) -> CatalogResult<RwLockWriteGuard<'_, Collection>> {
        self.inner.write().map_err(|_| CatalogError::LockPoisoned)
    }
}
