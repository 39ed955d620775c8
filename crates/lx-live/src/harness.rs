//! `--test` mode: run the hosted program's exported tests.

use libc::c_void;
use lx_cc::BuildSettings;
use lx_dl::Image;
use lx_task::WorkerPool;
use tracing::{info, warn};

use crate::session::LiveError;

/// Every exported symbol may be a test entry point.
const TEST_PREFIX: &str = "__test_";

struct SendAddress(*mut c_void);
// Test entry points are plain functions; the pointer itself is inert.
unsafe impl Send for SendAddress {}

/// Open the linked artifact, enumerate symbols beginning with `__test_`,
/// and invoke each with no arguments on the worker pool. Returns how many
/// tests ran.
pub fn run_exported_tests(settings: &BuildSettings) -> Result<usize, LiveError> {
    let image = Image::open_global(&settings.output_file)?;

    let names: Vec<String> = image
        .exported_names()
        .into_iter()
        .filter(|name| name.starts_with(TEST_PREFIX))
        .collect();

    info!("running {} tests", names.len());
    let pool = WorkerPool::new(settings.jobs);
    let mut invoked = 0usize;
    for name in &names {
        match image.symbol(name) {
            Some(address) => {
                invoked += 1;
                let address = SendAddress(address);
                pool.enqueue(move || {
                    let address = address;
                    let test: extern "C" fn() = unsafe { std::mem::transmute(address.0) };
                    test();
                });
            }
            None => warn!(symbol = %name, "test symbol has no address"),
        }
    }
    pool.join();
    Ok(invoked)
}
