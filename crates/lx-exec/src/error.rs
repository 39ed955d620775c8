//! Execution errors.

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {path} failed: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compilation failed for {path}")]
    CompileFailed { path: Utf8PathBuf },

    #[error("a compiler child was interrupted")]
    Interrupted,

    #[error("error linking to {path}: exit code {code}")]
    LinkFailed { path: Utf8PathBuf, code: i32 },
}
