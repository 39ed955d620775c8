//! Topologically-ordered parallel execution.
//!
//! The build plan is a petgraph `DiGraph` whose edges point from
//! dependent to dependency. Every node starts with a remaining-parents
//! counter; nodes at zero go straight onto the worker pool, and each
//! completed node decrements its dependents, enqueueing any that reach
//! zero. A failed node never releases its dependents; they surface in
//! the end-of-build report as missing dependencies, and where the
//! leftovers form a cycle, the exact cycle is extracted.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use lx_cc::BuildSettings;
use lx_graph::{NodeId, SourceDb};
use lx_task::{PoolHandle, Progress, WorkerPool};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction::Incoming;
use tracing::{debug, warn};

use crate::compile::compile_node;
use crate::error::ExecError;

/// What the scheduler did and what is left over.
pub struct BuildOutcome {
    /// Compile steps that ran (including timestamp stamps).
    pub compiled: usize,
    /// Nodes whose compile failed.
    pub failed: Vec<NodeId>,
    /// Nodes never scheduled because a parent failed or never finished.
    pub missing_deps: Vec<NodeId>,
    /// Dependency cycles among the leftovers, in path order.
    pub cycles: Vec<Vec<NodeId>>,
    /// A child died from SIGINT/SIGQUIT and the pool was drained.
    pub interrupted: bool,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        !self.interrupted && self.failed.is_empty() && self.missing_deps.is_empty()
    }
}

struct Scheduler {
    db: Arc<SourceDb>,
    settings: Arc<BuildSettings>,
    progress: Arc<Progress>,
    /// Edges dependent → dependency; node weights are arena ids.
    graph: DiGraph<NodeId, ()>,
    index_of: Vec<NodeIndex>,
    remaining: Vec<AtomicUsize>,
    failed: Vec<AtomicBool>,
    done: Vec<AtomicBool>,
    compiled: AtomicUsize,
    interrupted: AtomicBool,
}

/// Drain the build plan. Every record with `need_compile` either produces
/// its artifact or ends up in the outcome's failure lists.
pub fn execute(
    db: &Arc<SourceDb>,
    settings: &Arc<BuildSettings>,
    progress: &Arc<Progress>,
) -> BuildOutcome {
    let records = db.snapshot();
    let count = records.len();

    let mut graph = DiGraph::with_capacity(count, count);
    let index_of: Vec<NodeIndex> = (0..count).map(|id| graph.add_node(id)).collect();
    let mut remaining = Vec::with_capacity(count);
    for (id, record) in records.iter().enumerate() {
        let parents = record.parents.lock().clone();
        for parent in &parents {
            graph.add_edge(index_of[id], index_of[*parent], ());
        }
        remaining.push(AtomicUsize::new(parents.len()));
    }

    // The bar tracks real compiles: pass-throughs and timestamp stamps
    // are not progress anyone cares about.
    let visible = records
        .iter()
        .filter(|r| r.need_compile.load(Ordering::Relaxed) && !r.kind.compile_to_timestamp())
        .count();
    progress.start_task("COMPILING", visible as u64);

    let scheduler = Arc::new(Scheduler {
        db: db.clone(),
        settings: settings.clone(),
        progress: progress.clone(),
        graph,
        index_of,
        remaining,
        failed: (0..count).map(|_| AtomicBool::new(false)).collect(),
        done: (0..count).map(|_| AtomicBool::new(false)).collect(),
        compiled: AtomicUsize::new(0),
        interrupted: AtomicBool::new(false),
    });

    let pool = WorkerPool::new(settings.jobs);
    for id in 0..count {
        if scheduler.remaining[id].load(Ordering::Relaxed) == 0 {
            let scheduler = scheduler.clone();
            let handle = pool.handle();
            pool.enqueue(move || run_node(scheduler, handle, id));
        }
    }
    pool.join();
    progress.finish_task();

    collect_outcome(&scheduler)
}

fn run_node(scheduler: Arc<Scheduler>, pool: PoolHandle, id: NodeId) {
    if scheduler.interrupted.load(Ordering::Relaxed) {
        return;
    }

    let record = scheduler.db.get(id);
    if record.need_compile.load(Ordering::Relaxed) {
        match compile_node(
            &scheduler.db,
            &scheduler.settings,
            &record,
            &scheduler.progress,
        ) {
            Ok(()) => {
                scheduler.compiled.fetch_add(1, Ordering::Relaxed);
                if !record.kind.compile_to_timestamp() {
                    scheduler.progress.step();
                }
                mark_done(&scheduler, &pool, id);
            }
            Err(ExecError::Interrupted) => {
                warn!("compiler child interrupted, stopping the build");
                scheduler.interrupted.store(true, Ordering::Relaxed);
                pool.request_stop();
            }
            Err(error) => {
                scheduler.progress.println(&format!("{error}"));
                scheduler.failed[id].store(true, Ordering::Relaxed);
            }
        }
    } else {
        // Pass-through: the artifact is already fresh, but dependents
        // still wait for this node's position in the order.
        mark_done(&scheduler, &pool, id);
    }
}

fn mark_done(scheduler: &Arc<Scheduler>, pool: &PoolHandle, id: NodeId) {
    scheduler.done[id].store(true, Ordering::Relaxed);
    let index = scheduler.index_of[id];
    for dependent_index in scheduler.graph.neighbors_directed(index, Incoming) {
        let dependent = scheduler.graph[dependent_index];
        if scheduler.remaining[dependent].fetch_sub(1, Ordering::AcqRel) == 1 {
            let scheduler = scheduler.clone();
            let handle = pool.clone();
            pool.enqueue(move || run_node(scheduler, handle, dependent));
        }
    }
}

fn collect_outcome(scheduler: &Scheduler) -> BuildOutcome {
    let count = scheduler.done.len();
    let mut failed = Vec::new();
    let mut missing_deps = Vec::new();
    for id in 0..count {
        if scheduler.failed[id].load(Ordering::Relaxed) {
            failed.push(id);
        } else if !scheduler.done[id].load(Ordering::Relaxed) {
            missing_deps.push(id);
        }
    }

    let cycles = if missing_deps.is_empty() || scheduler.interrupted.load(Ordering::Relaxed) {
        Vec::new()
    } else {
        find_cycles(&scheduler.graph, &missing_deps)
    };

    debug!(
        compiled = scheduler.compiled.load(Ordering::Relaxed),
        failed = failed.len(),
        missing = missing_deps.len(),
        "execution drained"
    );

    BuildOutcome {
        compiled: scheduler.compiled.load(Ordering::Relaxed),
        failed,
        missing_deps,
        cycles,
        interrupted: scheduler.interrupted.load(Ordering::Relaxed),
    }
}

/// Extract the cycles hiding among the unscheduled leftovers, each as a
/// path in dependency order (`x` depends on the next entry, the last
/// depends on the first).
fn find_cycles(graph: &DiGraph<NodeId, ()>, leftovers: &[NodeId]) -> Vec<Vec<NodeId>> {
    let leftover_set: HashSet<NodeId> = leftovers.iter().copied().collect();
    let mut cycles = Vec::new();

    for component in petgraph::algo::tarjan_scc(graph) {
        let members: Vec<NodeId> = component.iter().map(|&index| graph[index]).collect();
        if !members.iter().all(|id| leftover_set.contains(id)) {
            continue;
        }
        let is_cycle = component.len() > 1
            || graph.contains_edge(component[0], component[0]);
        if !is_cycle {
            continue;
        }

        // Walk dependency edges inside the component until we loop.
        let in_component: HashSet<NodeIndex> = component.iter().copied().collect();
        let start = component[0];
        let mut path = vec![graph[start]];
        let mut seen = HashSet::from([start]);
        let mut current = start;
        loop {
            let Some(next) = graph
                .neighbors(current)
                .find(|index| in_component.contains(index))
            else {
                break;
            };
            if next == start || !seen.insert(next) {
                break;
            }
            path.push(graph[next]);
            current = next;
        }
        cycles.push(path);
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use lx_cc::{BuildKind, SourceKind};
    use lx_graph::SourceRecord;

    fn fixture() -> (tempfile::TempDir, Utf8PathBuf, Arc<SourceDb>, Arc<BuildSettings>) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut settings = BuildSettings::new(root.clone());
        settings.set_output(root.join("build/a.out"), BuildKind::Live);
        settings.jobs = 4;
        (dir, root, Arc::new(SourceDb::new()), Arc::new(settings))
    }

    fn add(
        db: &SourceDb,
        root: &Utf8PathBuf,
        name: &str,
        kind: SourceKind,
        need_compile: bool,
    ) -> NodeId {
        let (id, _) = db.intern(&root.join(name), || {
            let record = SourceRecord::new(
                kind,
                root.join(name),
                root.join(format!("build/live/{name}.{}", kind.artifact_extension())),
            );
            record.need_compile.store(need_compile, Ordering::Relaxed);
            record
        });
        id
    }

    fn run(db: &Arc<SourceDb>, settings: &Arc<BuildSettings>) -> BuildOutcome {
        execute(db, settings, &Arc::new(Progress::disabled()))
    }

    #[test]
    fn timestamp_plan_produces_artifacts_in_order() {
        let (_dir, root, db, settings) = fixture();
        // h -> a -> b, all timestamp-only so no compiler is needed.
        let h = add(&db, &root, "h.hpp", SourceKind::Header, true);
        let a = add(&db, &root, "a.inc", SourceKind::BareInclude, true);
        let b = add(&db, &root, "b.inc", SourceKind::BareInclude, true);
        db.add_edge(h, a);
        db.add_edge(a, b);

        let outcome = run(&db, &settings);
        assert!(outcome.success());
        assert_eq!(outcome.compiled, 3);
        for id in [h, a, b] {
            assert!(db.get(id).artifact_path.exists());
        }
    }

    #[test]
    fn pass_through_nodes_release_children() {
        let (_dir, root, db, settings) = fixture();
        let h = add(&db, &root, "h.hpp", SourceKind::Header, false);
        let a = add(&db, &root, "a.inc", SourceKind::BareInclude, true);
        db.add_edge(h, a);

        let outcome = run(&db, &settings);
        assert!(outcome.success());
        assert_eq!(outcome.compiled, 1);
        assert!(!db.get(h).artifact_path.exists());
        assert!(db.get(a).artifact_path.exists());
    }

    #[test]
    fn failed_parent_blocks_children() {
        let (_dir, root, db, mut settings) = fixture();
        Arc::get_mut(&mut settings).unwrap().compiler = "false".to_string();
        std::fs::write(root.join("bad.cpp"), "x\n").unwrap();
        let bad = add(&db, &root, "bad.cpp", SourceKind::Unit, true);
        let child = add(&db, &root, "child.inc", SourceKind::BareInclude, true);
        db.add_edge(bad, child);

        let outcome = run(&db, &settings);
        assert!(!outcome.success());
        assert_eq!(outcome.failed, vec![bad]);
        assert_eq!(outcome.missing_deps, vec![child]);
        assert!(outcome.cycles.is_empty());
        assert!(!db.get(child).artifact_path.exists());
    }

    #[test]
    fn cycle_is_detected_and_named_once() {
        let (_dir, root, db, settings) = fixture();
        let x = add(&db, &root, "x.cppm", SourceKind::Module, false);
        let y = add(&db, &root, "y.cppm", SourceKind::Module, false);
        db.add_edge(x, y);
        db.add_edge(y, x);

        let outcome = run(&db, &settings);
        assert!(!outcome.success());
        assert_eq!(outcome.cycles.len(), 1);
        let cycle = &outcome.cycles[0];
        assert_eq!(cycle.len(), 2);
        assert!(cycle.contains(&x) && cycle.contains(&y));
    }

    #[test]
    fn diamond_graph_runs_every_node_once() {
        let (_dir, root, db, settings) = fixture();
        //   top
        //  /   \
        // l     r
        //  \   /
        //  bottom
        let top = add(&db, &root, "top.hpp", SourceKind::Header, true);
        let l = add(&db, &root, "l.inc", SourceKind::BareInclude, true);
        let r = add(&db, &root, "r.inc", SourceKind::BareInclude, true);
        let bottom = add(&db, &root, "bottom.inc", SourceKind::BareInclude, true);
        db.add_edge(top, l);
        db.add_edge(top, r);
        db.add_edge(l, bottom);
        db.add_edge(r, bottom);

        let outcome = run(&db, &settings);
        assert!(outcome.success());
        assert_eq!(outcome.compiled, 4);
    }

    #[test]
    fn worker_counts_do_not_change_the_artifact_set() {
        for jobs in [1, 2, 8] {
            let (_dir, root, db, mut settings) = fixture();
            Arc::get_mut(&mut settings).unwrap().jobs = jobs;
            let h = add(&db, &root, "h.hpp", SourceKind::Header, true);
            let mut previous = h;
            for i in 0..12 {
                let node = add(
                    &db,
                    &root,
                    &format!("n{i}.inc"),
                    SourceKind::BareInclude,
                    true,
                );
                db.add_edge(previous, node);
                previous = node;
            }
            let outcome = run(&db, &settings);
            assert!(outcome.success());
            assert_eq!(outcome.compiled, 13);
        }
    }
}
