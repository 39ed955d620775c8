//! Build execution for lx
//!
//! Drives the build plan produced by dirty propagation: topologically
//! ordered parallel compiles over the worker pool, the per-node compile
//! step, the GCC module mapper server, and the final link.

mod compile;
mod error;
mod link;
mod mapper;
mod schedule;

pub use compile::{compile_live, compile_node};
pub use error::ExecError;
pub use link::link;
pub use mapper::{respond_block, MapperContext, MapperPipe};
pub use schedule::{execute, BuildOutcome};
