//! GCC module mapper server.
//!
//! When the compiler is GCC and the node participates in modules, the
//! compile step passes `-fmodule-mapper=<fd>fd` and serves the
//! p1184-style protocol over a pipe pair for the lifetime of the child.
//! Requests may be batched, separated by ` ;\n`; responses mirror the
//! batching and terminate with a newline.

use std::sync::Arc;
use std::thread::JoinHandle;

use camino::{Utf8Path, Utf8PathBuf};
use libc::c_int;
use lx_graph::{SourceDb, SourceRecord};
use tracing::{debug, warn};

/// Everything one compile's mapper needs to answer with.
pub struct MapperContext<'a> {
    /// The compiling file's own module name, checked against
    /// `MODULE-EXPORT`.
    pub module_name: Option<&'a str>,
    /// Where this node's module artifact goes.
    pub artifact: &'a Utf8Path,
    /// The shared CMI directory.
    pub module_repo: &'a Utf8Path,
    /// Module name → provider artifact, through the graph.
    pub resolve: &'a dyn Fn(&str) -> Option<Utf8PathBuf>,
}

/// Answer one batch of requests. The input is everything one `read`
/// returned; the output is ready to hand to `write`.
pub fn respond_block(block: &str, ctx: &MapperContext<'_>) -> String {
    let block = block.strip_suffix('\n').unwrap_or(block);
    let mut response = String::new();
    for (index, line) in block.split(" ;\n").enumerate() {
        if index > 0 {
            response.push_str(" ;\n");
        }
        response.push_str(&respond_line(line, ctx));
    }
    response.push('\n');
    response
}

fn respond_line(line: &str, ctx: &MapperContext<'_>) -> String {
    let mut words = line.split(' ');
    let request = words.next().unwrap_or("");
    let argument = words.next();
    debug!(request = line, "module mapper request");

    match (request, argument) {
        ("HELLO", _) => "HELLO 1 lx".to_string(),
        ("MODULE-REPO", _) => format!("PATHNAME \"{}\"", ctx.module_repo),
        ("MODULE-EXPORT", Some(name)) => {
            match ctx.module_name {
                Some(own) if own == name => {}
                Some(own) => {
                    warn!(got = name, expected = own, "module names don't match");
                }
                None => warn!(got = name, "MODULE-EXPORT from a file without a module name"),
            }
            format!("PATHNAME \"{}\"", ctx.artifact)
        }
        ("MODULE-IMPORT", Some(name)) => match (ctx.resolve)(name) {
            Some(path) => format!("PATHNAME \"{path}\""),
            None => "ERROR unknown-module".to_string(),
        },
        ("MODULE-COMPILED", Some(_)) => "OK".to_string(),
        ("INCLUDE-TRANSLATE", Some(_)) => "BOOL TRUE".to_string(),
        ("INVOKE", _) => "ERROR NOT_SUPPORTED".to_string(),
        _ => "ERROR INVALID_REQUEST".to_string(),
    }
}

/// A live mapper endpoint: two pipes and the server thread. Dropped once
/// the child exits, which closes the pipes and joins the thread.
pub struct MapperPipe {
    /// Server → child; the child reads `to_child[0]`.
    to_child: [c_int; 2],
    /// Child → server; the child writes `from_child[1]`.
    from_child: [c_int; 2],
    thread: Option<JoinHandle<()>>,
}

impl MapperPipe {
    pub fn spawn(
        db: Arc<SourceDb>,
        record: Arc<SourceRecord>,
        module_repo: Utf8PathBuf,
    ) -> std::io::Result<Self> {
        let mut to_child = [0; 2];
        let mut from_child = [0; 2];
        unsafe {
            if libc::pipe(to_child.as_mut_ptr()) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            if libc::pipe(from_child.as_mut_ptr()) != 0 {
                let err = std::io::Error::last_os_error();
                libc::close(to_child[0]);
                libc::close(to_child[1]);
                return Err(err);
            }
        }

        let read_fd = from_child[0];
        let write_fd = to_child[1];
        let thread = std::thread::spawn(move || {
            serve(db, record, module_repo, read_fd, write_fd);
        });

        Ok(Self {
            to_child,
            from_child,
            thread: Some(thread),
        })
    }

    /// The `<from>to` file-descriptor form GCC understands.
    pub fn mapper_arg(&self) -> String {
        format!("-fmodule-mapper=<{}>{}", self.to_child[0], self.from_child[1])
    }
}

impl Drop for MapperPipe {
    fn drop(&mut self) {
        // Closing our copy of the child's write end unblocks the server's
        // read once the child is gone.
        unsafe {
            libc::close(self.from_child[1]);
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        unsafe {
            libc::close(self.to_child[0]);
            libc::close(self.to_child[1]);
            libc::close(self.from_child[0]);
        }
    }
}

fn serve(
    db: Arc<SourceDb>,
    record: Arc<SourceRecord>,
    module_repo: Utf8PathBuf,
    read_fd: c_int,
    write_fd: c_int,
) {
    let module_name = record.module_name.lock().clone();
    let resolve = |name: &str| {
        db.resolve_module(name)
            .map(|provider| db.get(provider).artifact_path.clone())
    };
    let ctx = MapperContext {
        module_name: module_name.as_deref(),
        artifact: &record.artifact_path,
        module_repo: &module_repo,
        resolve: &resolve,
    };

    let mut buffer = [0u8; 8192];
    loop {
        let count = unsafe { libc::read(read_fd, buffer.as_mut_ptr().cast(), buffer.len()) };
        if count <= 0 {
            return;
        }
        let block = String::from_utf8_lossy(&buffer[..count as usize]);
        let response = respond_block(&block, &ctx);
        let written = unsafe {
            libc::write(write_fd, response.as_ptr().cast(), response.len())
        };
        if written < 0 {
            return;
        }
    }
}
