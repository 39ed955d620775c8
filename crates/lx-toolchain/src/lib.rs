//! Compiler discovery for lx
//!
//! Finds the C/C++ compiler to drive, classifies its flag dialect, and
//! probes it for the system include search directories that angled
//! includes resolve through. Also checks whether `mold` is available to
//! take over linking.

use std::process::{Command, Stdio};

use camino::Utf8PathBuf;
use lx_cc::CompilerFamily;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("couldn't run {compiler}: {source}. is it in the path?")]
    CompilerNotFound {
        compiler: String,
        #[source]
        source: std::io::Error,
    },
}

/// The probed toolchain.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub compiler: String,
    pub family: CompilerFamily,
    pub system_include_dirs: Vec<Utf8PathBuf>,
    /// `mold` is installed and no custom linker was requested.
    pub prefer_mold: bool,
}

/// Pick the compiler: `$CXX`, then `$CC`, then `clang`.
pub fn compiler_from_env() -> String {
    std::env::var("CXX")
        .or_else(|_| std::env::var("CC"))
        .unwrap_or_else(|_| "clang".to_string())
}

/// Classify the flag dialect from the compiler's name.
pub fn family_of(compiler: &str) -> CompilerFamily {
    if compiler.contains("gcc") || compiler.contains("g++") {
        CompilerFamily::Gcc
    } else {
        CompilerFamily::Clang
    }
}

/// Probe the compiler for its system include directories and check for
/// `mold`. Fails only if the compiler itself cannot be spawned.
pub fn probe(compiler: &str, custom_linker_set: bool) -> Result<Toolchain, ToolchainError> {
    let output = Command::new(compiler)
        .args(["-xc++", "-E", "-v", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| ToolchainError::CompilerNotFound {
            compiler: compiler.to_string(),
            source,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let system_include_dirs = parse_search_dirs(&stderr);
    debug!(
        compiler,
        dirs = system_include_dirs.len(),
        "probed system include directories"
    );

    let prefer_mold = !custom_linker_set && mold_available();

    Ok(Toolchain {
        compiler: compiler.to_string(),
        family: family_of(compiler),
        system_include_dirs,
        prefer_mold,
    })
}

/// Extract the search directories from `cc -E -v` diagnostics: the lines
/// between the "search starts here" markers, each a single space-indented
/// absolute path.
pub fn parse_search_dirs(stderr: &str) -> Vec<Utf8PathBuf> {
    stderr
        .lines()
        .filter(|line| line.starts_with(" /"))
        .map(|line| {
            // Clang suffixes framework directories with " (framework directory)".
            let path = line[1..].split(" (").next().unwrap_or(&line[1..]);
            Utf8PathBuf::from(path)
        })
        .collect()
}

fn mold_available() -> bool {
    Command::new("mold")
        .arg("-v")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
