//! Per-file state.

use std::sync::atomic::AtomicBool;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use lx_cc::SourceKind;
use parking_lot::Mutex;

/// Stable index of a record in the [`crate::SourceDb`] arena. Cross-record
/// references are always `NodeId`s, never pointers, so the arena may grow
/// freely.
pub type NodeId = usize;

/// One source path (or module identity) as an element of the dependency
/// DAG.
///
/// `kind`, `source_path`, and `artifact_path` are fixed at insertion.
/// Fields written during the parallel scan sit behind their own locks:
/// `children` is appended to by concurrent parent scans, everything else
/// is written by the scan that owns the record.
pub struct SourceRecord {
    pub kind: SourceKind,
    /// Normalised relative to the working directory where possible;
    /// system headers keep their bare include form.
    pub source_path: Utf8PathBuf,
    /// Derived from `(source_path, kind, output dir)` and never changed.
    pub artifact_path: Utf8PathBuf,

    /// `None` means the source is missing, which is tolerated for headers
    /// behind preprocessor gates and fatal for units.
    pub source_mtime: Mutex<Option<SystemTime>>,
    /// `None` means the artifact has never been built.
    pub artifact_mtime: Mutex<Option<SystemTime>>,

    /// Set iff the file is a module interface.
    pub module_name: Mutex<Option<String>>,
    /// Raw `import` names; resolved to edges once scanning reaches
    /// fix-point.
    pub imports: Mutex<Vec<String>>,

    /// Nodes this record depends on.
    pub parents: Mutex<Vec<NodeId>>,
    /// Inverse of `parents`; PCH records keep inbound child edges even
    /// though their own `parents` list is cleared.
    pub children: Mutex<Vec<NodeId>>,

    /// Precomputed per-parent compiler flags (`-include` for a PCH
    /// parent, `-fmodule-file=` for header-unit and module parents under
    /// Clang).
    pub build_include_args: Mutex<Vec<String>>,

    pub need_compile: AtomicBool,
}

impl SourceRecord {
    pub fn new(kind: SourceKind, source_path: Utf8PathBuf, artifact_path: Utf8PathBuf) -> Self {
        Self {
            kind,
            source_path,
            artifact_path,
            source_mtime: Mutex::new(None),
            artifact_mtime: Mutex::new(None),
            module_name: Mutex::new(None),
            imports: Mutex::new(Vec::new()),
            parents: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            build_include_args: Mutex::new(Vec::new()),
            need_compile: AtomicBool::new(false),
        }
    }

    /// The `.pcm` sibling of a `Module`'s object artifact.
    pub fn module_artifact_path(&self) -> Utf8PathBuf {
        self.artifact_path.with_extension("pcm")
    }

    /// The header path `-include` points at for a PCH: the artifact with
    /// its `.gch` stripped. The compile step places a copy of the header
    /// (GCC) or an `#error` tripwire (Clang) there so the compiler finds
    /// the precompiled image next to it.
    pub fn pch_include_path(&self) -> Utf8PathBuf {
        self.artifact_path.with_extension("")
    }

    /// Re-stat the source and remember the result.
    pub fn refresh_source_mtime(&self) -> Option<SystemTime> {
        let mtime = stat_mtime(&self.source_path);
        *self.source_mtime.lock() = mtime;
        mtime
    }

    /// Re-stat the artifact and remember the result.
    pub fn refresh_artifact_mtime(&self) -> Option<SystemTime> {
        let mtime = stat_mtime(&self.artifact_path);
        *self.artifact_mtime.lock() = mtime;
        mtime
    }

    /// Whether this record's own source is newer than its artifact. A
    /// record with a missing source is never directly dirty; one with a
    /// missing artifact always is.
    pub fn directly_dirty(&self) -> bool {
        let Some(source) = *self.source_mtime.lock() else {
            return false;
        };
        match *self.artifact_mtime.lock() {
            None => true,
            Some(artifact) => source > artifact,
        }
    }
}

/// Modification time of a path, if it exists.
pub fn stat_mtime(path: &Utf8Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
