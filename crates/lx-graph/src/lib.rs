//! Dependency graph for lx
//!
//! Turns the input list into a fully-closed DAG: every translation unit,
//! every header it reaches (transitively), every module provider, with
//! edges encoding "must be compiled before". Also owns dirty propagation,
//! which turns mtime comparisons into the build plan.

mod builder;
mod db;
mod dirty;
mod error;
mod record;

pub use builder::{build_graph, GraphReport};
pub use db::SourceDb;
pub use dirty::mark_for_compilation;
pub use error::GraphError;
pub use record::{stat_mtime, NodeId, SourceRecord};
