//! Graph-build errors.

use camino::Utf8PathBuf;
use lx_cc::scan::ScanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read {path}: {source}")]
    Scan {
        path: Utf8PathBuf,
        #[source]
        source: ScanError,
    },

    #[error("source file {path} does not exist")]
    MissingSource { path: Utf8PathBuf },

    #[error("there are multiple implementations for module {name} (in {first} and {second})")]
    DuplicateModule {
        name: String,
        first: Utf8PathBuf,
        second: Utf8PathBuf,
    },

    #[error("module [{name}] imported in {importer} does not exist")]
    UnresolvedImport {
        name: String,
        importer: Utf8PathBuf,
    },
}
