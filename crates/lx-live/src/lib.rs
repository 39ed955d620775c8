//! Live reload for lx
//!
//! After a successful link in live mode, the final shared artifact is
//! loaded into this process, its `main` is invoked, and a callback driven
//! by the hosted program recompiles changed units into temporary shared
//! objects and redirects the host's PLT entries at their symbols.

mod harness;
mod session;

pub use harness::run_exported_tests;
pub use session::{run, LiveError};
