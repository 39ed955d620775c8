//! Graph construction.
//!
//! Inputs are scanned in parallel on the worker pool; discovered headers
//! are inserted into the arena and enqueued for scanning until fix-point.
//! Include edges are wired concurrently (each scan owns its record's
//! `parents`; the per-record `children` mutex absorbs concurrent
//! appends). Module names can only be registered once their providers
//! have been scanned, so `import` edges are resolved in a sequential pass
//! afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use lx_cc::paths::{artifact_path, normalise};
use lx_cc::scan::{scan_file, Include, IncludeStyle, ScanError, ScanOutcome};
use lx_cc::{BuildSettings, CompilerFamily, SourceKind};
use lx_task::{PoolHandle, Progress, WorkerPool};
use parking_lot::Mutex;
use tracing::debug;

use crate::db::SourceDb;
use crate::error::GraphError;
use crate::record::{stat_mtime, NodeId, SourceRecord};

/// Non-fatal problems found while building the graph. Compilation still
/// proceeds so unrelated errors surface in one pass.
#[derive(Debug)]
pub struct GraphReport {
    pub errors: Vec<GraphError>,
}

struct ScanCtx {
    db: Arc<SourceDb>,
    settings: Arc<BuildSettings>,
    progress: Arc<Progress>,
    errors: Mutex<Vec<GraphError>>,
}

/// Close the graph over all inputs already inserted into `db`.
///
/// Returns `Err` only for errors that invalidate the whole graph
/// (duplicate module providers); everything else is collected into the
/// report.
pub fn build_graph(
    db: &Arc<SourceDb>,
    settings: &Arc<BuildSettings>,
    progress: &Arc<Progress>,
) -> Result<GraphReport, GraphError> {
    wire_pch_edges(db);

    let input_count = db.len();
    progress.start_task("LOADING DEPENDENCIES", input_count as u64);

    let ctx = Arc::new(ScanCtx {
        db: db.clone(),
        settings: settings.clone(),
        progress: progress.clone(),
        errors: Mutex::new(Vec::new()),
    });

    let pool = WorkerPool::new(settings.jobs);
    for id in 0..input_count {
        let ctx = ctx.clone();
        let handle = pool.handle();
        pool.enqueue(move || scan_record(ctx, handle, id));
    }
    pool.join();
    progress.finish_task();

    let ctx = Arc::try_unwrap(ctx).unwrap_or_else(|_| unreachable!("scan workers joined"));
    let mut errors = ctx.errors.into_inner();

    resolve_module_imports(db, settings, &mut errors)?;

    // PCHs compile first, unconditionally: drop their inbound edges but
    // keep the inverse links so dirty propagation still reaches them.
    for record in db.snapshot() {
        if record.kind.is_pch() {
            record.parents.lock().clear();
        }
    }

    debug!(records = db.len(), errors = errors.len(), "graph closed");
    Ok(GraphReport { errors })
}

/// Every translation unit implicitly depends on the PCH of its language.
fn wire_pch_edges(db: &Arc<SourceDb>) {
    let records = db.snapshot();
    for (pch_id, pch) in records.iter().enumerate() {
        if !pch.kind.is_pch() {
            continue;
        }
        let include_args = [
            "-include".to_string(),
            pch.pch_include_path().to_string(),
        ];
        for (child_id, child) in records.iter().enumerate() {
            let wants_this_pch = match child.kind {
                SourceKind::Unit | SourceKind::Module => pch.kind == SourceKind::Pch,
                SourceKind::CUnit => pch.kind == SourceKind::CPch,
                _ => false,
            };
            if wants_this_pch {
                db.add_edge(pch_id, child_id);
                child.build_include_args.lock().extend(include_args.iter().cloned());
            }
        }
    }
}

fn scan_record(ctx: Arc<ScanCtx>, pool: PoolHandle, id: NodeId) {
    let record = ctx.db.get(id);
    record.refresh_artifact_mtime();

    match record.kind {
        SourceKind::SystemHeader | SourceKind::SystemHeaderUnit => {
            probe_system_mtime(&ctx.settings, &record);
        }
        SourceKind::Object | SourceKind::StaticLibrary | SourceKind::SharedLibrary => {
            if record.refresh_source_mtime().is_none() {
                ctx.errors.lock().push(GraphError::MissingSource {
                    path: record.source_path.clone(),
                });
            }
        }
        _ => scan_source(&ctx, &pool, id, &record),
    }

    ctx.progress.step();
}

/// System headers are only stat'ed, never read; their location is
/// whichever search directory has them. Not finding one is fine, it may
/// be hidden behind a preprocessor gate.
fn probe_system_mtime(settings: &BuildSettings, record: &SourceRecord) {
    let user = settings.include_dirs.iter();
    let system = settings.system_include_dirs.iter();
    for dir in user.chain(system) {
        if let Some(mtime) = stat_mtime(&dir.join(&record.source_path)) {
            *record.source_mtime.lock() = Some(mtime);
            return;
        }
    }
}

fn scan_source(ctx: &Arc<ScanCtx>, pool: &PoolHandle, id: NodeId, record: &SourceRecord) {
    let source_mtime = stat_mtime(&record.source_path);

    let outcome = match scan_file(&record.source_path) {
        Ok(outcome) => outcome,
        Err(ScanError::OpenFailed(_))
            if matches!(
                record.kind,
                SourceKind::Header | SourceKind::HeaderUnit | SourceKind::BareInclude
            ) =>
        {
            // Headers discovered through gated includes may not exist.
            return;
        }
        Err(ScanError::OpenFailed(_)) => {
            ctx.errors.lock().push(GraphError::MissingSource {
                path: record.source_path.clone(),
            });
            return;
        }
        Err(source) => {
            ctx.errors.lock().push(GraphError::Scan {
                path: record.source_path.clone(),
                source,
            });
            return;
        }
    };

    *record.source_mtime.lock() = source_mtime;
    *record.module_name.lock() = outcome.module_name.clone();
    record.imports.lock().extend(outcome.imports.iter().cloned());

    wire_includes(ctx, pool, id, record, &outcome);
}

fn wire_includes(
    ctx: &Arc<ScanCtx>,
    pool: &PoolHandle,
    id: NodeId,
    record: &SourceRecord,
    outcome: &ScanOutcome,
) {
    let settings = &ctx.settings;
    let mut seen = HashSet::new();
    let mut parents = Vec::new();
    let mut include_args = Vec::new();

    for include in &outcome.includes {
        let Some((dep_path, dep_kind)) = classify_include(settings, record, include) else {
            continue;
        };
        if !seen.insert(dep_path.clone()) {
            continue;
        }

        let (dep_id, inserted) = ctx.db.intern(&dep_path, || {
            let artifact = artifact_path(settings, &dep_path, dep_kind);
            SourceRecord::new(dep_kind, dep_path.clone(), artifact)
        });
        if dep_id == id {
            continue;
        }
        if inserted {
            ctx.progress.add_total(1);
            let ctx = ctx.clone();
            let handle = pool.clone();
            pool.enqueue(move || scan_record(ctx, handle, dep_id));
        }

        let dep = ctx.db.get(dep_id);
        dep.children.lock().push(id);
        parents.push(dep_id);

        // The kind stored in the graph decides the flag, not the kind we
        // classified just now: the record may predate this scan.
        match dep.kind {
            kind if kind.is_pch() => {
                include_args.push("-include".to_string());
                include_args.push(dep.pch_include_path().to_string());
            }
            SourceKind::HeaderUnit | SourceKind::SystemHeaderUnit
                if settings.family == CompilerFamily::Clang =>
            {
                include_args.push(format!("-fmodule-file={}", dep.artifact_path));
            }
            _ => {}
        }
    }

    record.parents.lock().extend(parents);
    record.build_include_args.lock().extend(include_args);
}

/// Resolve one include directive to a path and the kind its record gets
/// if it is new. Unresolvable quoted includes are absorbed silently.
fn classify_include(
    settings: &BuildSettings,
    record: &SourceRecord,
    include: &Include,
) -> Option<(Utf8PathBuf, SourceKind)> {
    match include.style {
        IncludeStyle::Angled => {
            let kind = if settings.use_header_units {
                SourceKind::SystemHeaderUnit
            } else {
                SourceKind::SystemHeader
            };
            Some((Utf8PathBuf::from(&include.path), kind))
        }
        IncludeStyle::Quoted => {
            let resolved = resolve_local(settings, &record.source_path, &include.path)?;
            let kind = match SourceKind::from_path(resolved.as_str()) {
                Some(SourceKind::Header) if settings.use_header_units => SourceKind::HeaderUnit,
                Some(SourceKind::Header) => SourceKind::Header,
                _ => SourceKind::BareInclude,
            };
            Some((resolved, kind))
        }
    }
}

/// The lookup order for `#include "X"`: absolute as-is, next to the
/// includer, the user include directories in order, then the usual
/// system roots.
fn resolve_local(
    settings: &BuildSettings,
    includer: &Utf8Path,
    include: &str,
) -> Option<Utf8PathBuf> {
    let include = Utf8Path::new(include);
    if include.is_absolute() {
        return include
            .is_file()
            .then(|| normalise(&settings.working_dir, include));
    }

    let sibling = match includer.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.join(include),
        _ => include.to_owned(),
    };
    if sibling.is_file() {
        return Some(normalise(&settings.working_dir, &sibling));
    }

    for dir in &settings.include_dirs {
        let candidate = dir.join(include);
        if candidate.is_file() {
            return Some(normalise(&settings.working_dir, &candidate));
        }
    }

    for root in ["/usr/local/include", "/usr/include"] {
        let candidate = Utf8Path::new(root).join(include);
        if candidate.is_file() {
            return Some(normalise(&settings.working_dir, &candidate));
        }
    }

    None
}

/// After fix-point: claim module names, then turn `import`s into edges.
fn resolve_module_imports(
    db: &Arc<SourceDb>,
    settings: &BuildSettings,
    errors: &mut Vec<GraphError>,
) -> Result<(), GraphError> {
    let records = db.snapshot();

    for (id, record) in records.iter().enumerate() {
        if record.kind != SourceKind::Module {
            continue;
        }
        let name = record.module_name.lock().clone();
        if let Some(name) = name {
            db.register_module(&name, id)?;
        }
    }

    for (id, record) in records.iter().enumerate() {
        let imports = record.imports.lock().clone();
        for import in imports {
            match db.resolve_module(&import) {
                Some(provider) if provider != id => {
                    db.add_edge(provider, id);
                    if settings.family == CompilerFamily::Clang {
                        let provider_record = db.get(provider);
                        record.build_include_args.lock().push(format!(
                            "-fmodule-file={import}={}",
                            provider_record.module_artifact_path()
                        ));
                    }
                }
                Some(_) => {}
                None => errors.push(GraphError::UnresolvedImport {
                    name: import,
                    importer: record.source_path.clone(),
                }),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lx_cc::BuildKind;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: Utf8PathBuf,
        db: Arc<SourceDb>,
        settings: Arc<BuildSettings>,
    }

    impl Fixture {
        fn new(use_header_units: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = Utf8PathBuf::from_path_buf(dir.path().canonicalize().unwrap()).unwrap();
            // The tests never chdir, so pick a working directory nothing
            // resolves under: every normalised path stays absolute.
            let mut settings = BuildSettings::new(Utf8PathBuf::from("/lx-tests-nowhere"));
            settings.use_header_units = use_header_units;
            settings.jobs = 2;
            settings.set_output(root.join("build/a.out"), BuildKind::Live);
            Self {
                _dir: dir,
                root,
                db: Arc::new(SourceDb::new()),
                settings: Arc::new(settings),
            }
        }

        fn write(&self, path: &str, contents: &str) -> Utf8PathBuf {
            let full = self.root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(&full, contents).unwrap();
            full
        }

        fn add_input(&self, path: &str, kind: SourceKind) -> NodeId {
            let full = self.root.join(path);
            let (id, _) = self.db.intern(&full, || {
                let artifact = artifact_path(&self.settings, &full, kind);
                SourceRecord::new(kind, full.clone(), artifact)
            });
            id
        }

        fn build(&self) -> GraphReport {
            build_graph(&self.db, &self.settings, &Arc::new(Progress::disabled())).unwrap()
        }
    }

    #[test]
    fn discovers_headers_transitively() {
        let f = Fixture::new(false);
        f.write("a.cpp", "#include \"h.hpp\"\nint f() { return 1; }\n");
        f.write("h.hpp", "#include \"deep.hpp\"\nint f();\n");
        f.write("deep.hpp", "struct S;\n");
        let a = f.add_input("a.cpp", SourceKind::Unit);

        let report = f.build();
        assert!(report.errors.is_empty());
        assert_eq!(f.db.len(), 3);

        let h = f.db.lookup_path(&f.root.join("h.hpp")).unwrap();
        let deep = f.db.lookup_path(&f.root.join("deep.hpp")).unwrap();
        assert_eq!(*f.db.get(a).parents.lock(), vec![h]);
        assert_eq!(*f.db.get(h).parents.lock(), vec![deep]);
        assert_eq!(*f.db.get(h).children.lock(), vec![a]);
        assert_eq!(f.db.get(h).kind, SourceKind::Header);
    }

    #[test]
    fn shared_header_has_both_children() {
        let f = Fixture::new(false);
        f.write("a.cpp", "#include \"h.hpp\"\n");
        f.write("b.cpp", "#include \"h.hpp\"\n");
        f.write("h.hpp", "int f();\n");
        let a = f.add_input("a.cpp", SourceKind::Unit);
        let b = f.add_input("b.cpp", SourceKind::Unit);

        let report = f.build();
        assert!(report.errors.is_empty());

        let h = f.db.lookup_path(&f.root.join("h.hpp")).unwrap();
        let mut children = f.db.get(h).children.lock().clone();
        children.sort_unstable();
        assert_eq!(children, vec![a, b]);
    }

    #[test]
    fn header_units_policy_promotes_headers() {
        let f = Fixture::new(true);
        f.write("a.cpp", "#include \"h.hpp\"\n#include <vector>\n");
        f.write("h.hpp", "int f();\n");
        let a = f.add_input("a.cpp", SourceKind::Unit);

        f.build();

        let h = f.db.lookup_path(&f.root.join("h.hpp")).unwrap();
        assert_eq!(f.db.get(h).kind, SourceKind::HeaderUnit);
        let vector = f.db.lookup_path(Utf8Path::new("vector")).unwrap();
        assert_eq!(f.db.get(vector).kind, SourceKind::SystemHeaderUnit);

        // Clang consumers reference the header-unit artifact directly.
        let args = f.db.get(a).build_include_args.lock().clone();
        assert!(args.iter().any(|a| a.starts_with("-fmodule-file=")));
    }

    #[test]
    fn module_import_adds_provider_edge() {
        let f = Fixture::new(false);
        f.write("m.cppm", "export module m;\nexport int g();\n");
        f.write("impl.cpp", "import m;\nint g() { return 2; }\n");
        let m = f.add_input("m.cppm", SourceKind::Module);
        let impl_id = f.add_input("impl.cpp", SourceKind::Unit);

        let report = f.build();
        assert!(report.errors.is_empty());
        assert_eq!(*f.db.get(impl_id).parents.lock(), vec![m]);
        assert_eq!(*f.db.get(m).children.lock(), vec![impl_id]);
        assert_eq!(f.db.resolve_module("m"), Some(m));
    }

    #[test]
    fn duplicate_module_providers_fail_the_build() {
        let f = Fixture::new(false);
        f.write("x.cppm", "export module m;\n");
        f.write("y.cppm", "export module m;\n");
        f.add_input("x.cppm", SourceKind::Module);
        f.add_input("y.cppm", SourceKind::Module);

        let err = build_graph(&f.db, &f.settings, &Arc::new(Progress::disabled())).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateModule { .. }));
    }

    #[test]
    fn unresolved_import_is_reported_not_fatal() {
        let f = Fixture::new(false);
        f.write("a.cpp", "import ghost;\n");
        f.add_input("a.cpp", SourceKind::Unit);

        let report = f.build();
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors[0],
            GraphError::UnresolvedImport { .. }
        ));
    }

    #[test]
    fn missing_unit_source_is_reported() {
        let f = Fixture::new(false);
        f.add_input("gone.cpp", SourceKind::Unit);
        let report = f.build();
        assert!(matches!(
            report.errors[0],
            GraphError::MissingSource { .. }
        ));
    }

    #[test]
    fn missing_gated_header_is_absorbed() {
        let f = Fixture::new(false);
        // a.cpp includes a header that exists; that header includes one
        // that does not. The missing one never becomes a record.
        f.write("a.cpp", "#include \"h.hpp\"\n");
        f.write("h.hpp", "#ifdef PLATFORM_X\n#include \"missing.hpp\"\n#endif\n");
        f.add_input("a.cpp", SourceKind::Unit);

        let report = f.build();
        assert!(report.errors.is_empty());
        assert_eq!(f.db.len(), 2);
    }

    #[test]
    fn pch_edge_reaches_every_unit_and_clears_its_parents() {
        let f = Fixture::new(false);
        f.write("pch.hpp", "#include \"common.hpp\"\n");
        f.write("common.hpp", "int c();\n");
        f.write("a.cpp", "int f();\n");
        let pch = f.add_input("pch.hpp", SourceKind::Pch);
        let a = f.add_input("a.cpp", SourceKind::Unit);

        let report = f.build();
        assert!(report.errors.is_empty());

        assert_eq!(*f.db.get(a).parents.lock(), vec![pch]);
        let args = f.db.get(a).build_include_args.lock().clone();
        assert_eq!(args[0], "-include");
        assert!(args[1].ends_with("pch.hpp"));

        // The PCH saw its own include but compiles first regardless; the
        // inverse edge stays so a common.hpp edit still reaches it.
        assert!(f.db.get(pch).parents.lock().is_empty());
        let common = f.db.lookup_path(&f.root.join("common.hpp")).unwrap();
        assert_eq!(*f.db.get(common).children.lock(), vec![pch]);
    }

    #[test]
    fn include_dirs_are_searched_in_order() {
        let f = Fixture::new(false);
        f.write("first/h.hpp", "int a();\n");
        f.write("second/h.hpp", "int b();\n");
        f.write("a.cpp", "#include \"h.hpp\"\n");
        let mut settings = (*f.settings).clone();
        settings.include_dirs = vec![f.root.join("first"), f.root.join("second")];
        let settings = Arc::new(settings);
        f.add_input("a.cpp", SourceKind::Unit);

        build_graph(&f.db, &settings, &Arc::new(Progress::disabled())).unwrap();
        assert!(f.db.lookup_path(&f.root.join("first/h.hpp")).is_some());
        assert!(f.db.lookup_path(&f.root.join("second/h.hpp")).is_none());
    }
}
