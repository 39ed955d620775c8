//! The record arena and its resolver maps.

use std::collections::HashMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::{Mutex, RwLock};

use crate::error::GraphError;
use crate::record::{NodeId, SourceRecord};

/// Append-only arena of source records plus the two resolver maps
/// (`path → node`, `module name → node`).
///
/// Scanning threads read the arena under the read lock and clone the
/// `Arc`; insertion takes the write lock. `NodeId`s are indices and stay
/// valid forever. Lock order is `by_path` before `records`; `intern` is
/// the only place both are held.
pub struct SourceDb {
    records: RwLock<Vec<Arc<SourceRecord>>>,
    by_path: Mutex<HashMap<Utf8PathBuf, NodeId>>,
    by_module: Mutex<HashMap<String, NodeId>>,
}

impl SourceDb {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            by_path: Mutex::new(HashMap::new()),
            by_module: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: NodeId) -> Arc<SourceRecord> {
        self.records.read()[id].clone()
    }

    /// A point-in-time copy of the arena, for sequential passes.
    pub fn snapshot(&self) -> Vec<Arc<SourceRecord>> {
        self.records.read().clone()
    }

    pub fn lookup_path(&self, path: &Utf8Path) -> Option<NodeId> {
        self.by_path.lock().get(path).copied()
    }

    /// Get the record for `path`, inserting a fresh one if it is new.
    /// Returns the id and whether an insertion happened.
    pub fn intern(
        &self,
        path: &Utf8Path,
        make: impl FnOnce() -> SourceRecord,
    ) -> (NodeId, bool) {
        let mut by_path = self.by_path.lock();
        if let Some(&id) = by_path.get(path) {
            return (id, false);
        }
        let mut records = self.records.write();
        let id = records.len();
        records.push(Arc::new(make()));
        by_path.insert(path.to_owned(), id);
        (id, true)
    }

    /// Claim a module name for a provider record.
    pub fn register_module(&self, name: &str, id: NodeId) -> Result<(), GraphError> {
        let mut by_module = self.by_module.lock();
        if let Some(&first) = by_module.get(name) {
            return Err(GraphError::DuplicateModule {
                name: name.to_string(),
                first: self.get(first).source_path.clone(),
                second: self.get(id).source_path.clone(),
            });
        }
        by_module.insert(name.to_string(), id);
        Ok(())
    }

    pub fn resolve_module(&self, name: &str) -> Option<NodeId> {
        self.by_module.lock().get(name).copied()
    }

    /// Record that `child` depends on `parent`.
    pub fn add_edge(&self, parent: NodeId, child: NodeId) {
        let (parent_record, child_record) = {
            let records = self.records.read();
            (records[parent].clone(), records[child].clone())
        };
        parent_record.children.lock().push(child);
        child_record.parents.lock().push(parent);
    }
}

impl Default for SourceDb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lx_cc::SourceKind;

    fn record(path: &str) -> SourceRecord {
        SourceRecord::new(
            SourceKind::Header,
            Utf8PathBuf::from(path),
            Utf8PathBuf::from(format!("build/{path}.timestamp")),
        )
    }

    #[test]
    fn intern_deduplicates_by_path() {
        let db = SourceDb::new();
        let (a, inserted_a) = db.intern(Utf8Path::new("a.hpp"), || record("a.hpp"));
        let (b, inserted_b) = db.intern(Utf8Path::new("a.hpp"), || record("a.hpp"));
        assert!(inserted_a);
        assert!(!inserted_b);
        assert_eq!(a, b);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn edges_are_symmetric() {
        let db = SourceDb::new();
        let (h, _) = db.intern(Utf8Path::new("h.hpp"), || record("h.hpp"));
        let (a, _) = db.intern(Utf8Path::new("a.cpp"), || record("a.cpp"));
        db.add_edge(h, a);
        assert_eq!(*db.get(h).children.lock(), vec![a]);
        assert_eq!(*db.get(a).parents.lock(), vec![h]);
    }

    #[test]
    fn duplicate_module_is_an_error() {
        let db = SourceDb::new();
        let (a, _) = db.intern(Utf8Path::new("a.cppm"), || record("a.cppm"));
        let (b, _) = db.intern(Utf8Path::new("b.cppm"), || record("b.cppm"));
        db.register_module("m", a).unwrap();
        let err = db.register_module("m", b).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateModule { .. }));
        assert_eq!(db.resolve_module("m"), Some(a));
    }
}
