//! Metadata Arena
//!
//! In-process cache of immutable metadata objects.
//!
//! ## Concurrency:
//! - Each map sits behind its own `RwLock` (many readers, rare inserts)
//! - Snapshots and manifests never change once written, so a cached value
//!   can never go stale
//! - LATEST is mutable and is never cached here
//!
//! ## Bounds:
//! - Each map holds at most `capacity` objects; inserting past that evicts
//!   the oldest insert first. Evicted objects are simply re-read from storage.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::manifest::{ManifestEntry, ManifestFileMeta};
use crate::schema::TableSchema;
use crate::snapshot::Snapshot;

/// Default number of objects kept per map
pub const DEFAULT_CAPACITY: usize = 1024;

/// Insert-ordered map that drops its oldest entry when full
#[derive(Debug)]
struct Bounded<K, V> {
    map: HashMap<K, Arc<V>>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> Bounded<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &K) -> Option<Arc<V>> {
        self.map.get(key).cloned()
    }

    /// An existing entry wins
    fn insert(&mut self, key: K, value: V) -> Arc<V> {
        if let Some(existing) = self.map.get(&key) {
            return existing.clone();
        }
        while self.map.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.map.remove(&oldest);
                }
                None => break,
            }
        }
        let value = Arc::new(value);
        self.order.push_back(key.clone());
        self.map.insert(key, value.clone());
        value
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Shared cache keyed by snapshot id, schema id and manifest file name
#[derive(Debug)]
pub struct MetadataArena {
    snapshots: RwLock<Bounded<u64, Snapshot>>,
    schemas: RwLock<Bounded<u64, TableSchema>>,
    manifests: RwLock<Bounded<String, Vec<ManifestEntry>>>,
    manifest_lists: RwLock<Bounded<String, Vec<ManifestFileMeta>>>,
}

impl Default for MetadataArena {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MetadataArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena holding at most `capacity` objects of each kind
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            snapshots: RwLock::new(Bounded::new(capacity)),
            schemas: RwLock::new(Bounded::new(capacity)),
            manifests: RwLock::new(Bounded::new(capacity)),
            manifest_lists: RwLock::new(Bounded::new(capacity)),
        }
    }

    pub fn snapshot(&self, id: u64) -> Option<Arc<Snapshot>> {
        self.snapshots.read().get(&id)
    }

    /// Cache a snapshot; an existing entry wins
    pub fn insert_snapshot(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        self.snapshots.write().insert(snapshot.id, snapshot)
    }

    pub fn schema(&self, id: u64) -> Option<Arc<TableSchema>> {
        self.schemas.read().get(&id)
    }

    pub fn insert_schema(&self, schema: TableSchema) -> Arc<TableSchema> {
        self.schemas.write().insert(schema.id, schema)
    }

    pub fn manifest(&self, file_name: &str) -> Option<Arc<Vec<ManifestEntry>>> {
        self.manifests.read().get(&file_name.to_string())
    }

    pub fn insert_manifest(&self, file_name: &str, entries: Vec<ManifestEntry>) -> Arc<Vec<ManifestEntry>> {
        self.manifests.write().insert(file_name.to_string(), entries)
    }

    pub fn manifest_list(&self, file_name: &str) -> Option<Arc<Vec<ManifestFileMeta>>> {
        self.manifest_lists.read().get(&file_name.to_string())
    }

    pub fn insert_manifest_list(
        &self,
        file_name: &str,
        metas: Vec<ManifestFileMeta>,
    ) -> Arc<Vec<ManifestFileMeta>> {
        self.manifest_lists.write().insert(file_name.to_string(), metas)
    }

    /// Number of cached objects across all maps (for testing/debugging)
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
            + self.schemas.read().len()
            + self.manifests.read().len()
            + self.manifest_lists.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
