//! Worker pool and progress reporting for lx
//!
//! Every phase (scanning, compiling, the `--test` harness) runs on the
//! same fixed-width pool of OS threads. Workers block only on the pool's
//! condition variable and on child-process waits; there is no async I/O.

mod pool;
mod progress;

pub use pool::{default_parallelism, PoolHandle, WorkerPool};
pub use progress::Progress;
