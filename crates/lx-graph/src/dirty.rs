//! Dirty propagation.
//!
//! A record is directly dirty when its artifact is missing or older than
//! its source; dirtiness then flows down every child edge. The set of
//! marked records is the build plan.

use std::sync::atomic::Ordering;

use tracing::debug;

use crate::db::SourceDb;
use crate::record::NodeId;

/// Mark every record whose source, or any ancestor's source, is newer
/// than its artifact. With `force_all` (the persisted build command
/// changed) everything is marked. Returns the plan size.
pub fn mark_for_compilation(db: &SourceDb, force_all: bool) -> usize {
    let records = db.snapshot();

    if force_all {
        for record in &records {
            record.need_compile.store(true, Ordering::Relaxed);
        }
        debug!(marked = records.len(), "full rebuild forced");
        return records.len();
    }

    for record in &records {
        record.need_compile.store(false, Ordering::Relaxed);
    }

    // Flood from the directly-dirty set over child edges; `need_compile`
    // doubles as the visited flag.
    let mut stack: Vec<NodeId> = Vec::new();
    for (id, record) in records.iter().enumerate() {
        if record.directly_dirty() {
            record.need_compile.store(true, Ordering::Relaxed);
            stack.push(id);
        }
    }

    while let Some(id) = stack.pop() {
        let children = records[id].children.lock().clone();
        for child in children {
            if !records[child].need_compile.swap(true, Ordering::Relaxed) {
                stack.push(child);
            }
        }
    }

    let marked = records
        .iter()
        .filter(|record| record.need_compile.load(Ordering::Relaxed))
        .count();
    debug!(marked, total = records.len(), "dirty propagation done");
    marked
}
