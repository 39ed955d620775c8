//! Command-line parsing.
//!
//! Positional arguments are source inputs; directories expand recursively
//! through the classifier. Unrecognised `-X` flags pass straight through
//! to the compiler, link-shaped flags go to the link, and a handful steer
//! the build itself.

use camino::{Utf8Path, Utf8PathBuf};
use lx_cc::paths::normalise;
use lx_cc::{BuildKind, BuildSettings, SourceKind};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid job count value: {value}")]
    InvalidJobs { value: String },

    #[error("flag {flag} expects a value")]
    MissingValue { flag: String },

    #[error("tests can't be run in standalone mode!")]
    TestInStandalone,
}

/// Everything main needs to drive a build.
pub struct Invocation {
    pub settings: BuildSettings,
    /// Normalised inputs with their declared kinds, in argument order.
    pub inputs: Vec<(Utf8PathBuf, SourceKind)>,
    pub clean: bool,
    pub start_clean: bool,
    pub custom_linker: bool,
}

pub fn parse(
    args: &[String],
    working_dir: Utf8PathBuf,
    compiler: String,
) -> Result<Invocation, CliError> {
    let mut settings = BuildSettings::new(working_dir);
    settings.compiler = compiler;

    let mut inputs: Vec<(Utf8PathBuf, SourceKind)> = Vec::new();
    let mut output = Utf8PathBuf::from("build/a.out");
    let mut build_kind = BuildKind::Live;
    let mut clean = false;
    let mut start_clean = false;
    let mut custom_linker = false;

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(rest) = arg.strip_prefix('-') {
            match arg.as_str() {
                "-o" => output = Utf8PathBuf::from(take_value(&mut iter, arg)?),
                "-j" => settings.jobs = parse_jobs(take_value(&mut iter, arg)?)?,
                "-I" => {
                    let dir = strip_quotes(take_value(&mut iter, arg)?);
                    add_include_dir(&mut settings, dir);
                }
                "--pch" => {
                    let path = take_value(&mut iter, arg)?;
                    inputs.push(pch_input(&settings, path, None));
                }
                "--c++pch" => {
                    let path = take_value(&mut iter, arg)?;
                    inputs.push(pch_input(&settings, path, Some(SourceKind::Pch)));
                }
                "--standalone" => build_kind = BuildKind::Standalone,
                "--shared" => build_kind = BuildKind::Shared,
                "--header-units" => settings.use_header_units = true,
                "--no-header-units" => settings.use_header_units = false,
                "--no-rebuild-with-O0" => settings.rebuild_with_o0 = false,
                "--verbose" => settings.verbose = true,
                "--test" => settings.test = true,
                "--clean" => clean = true,
                "--start-clean" => {
                    clean = true;
                    start_clean = true;
                }
                _ => {
                    if let Some(value) = rest.strip_prefix('o') {
                        output = Utf8PathBuf::from(value);
                    } else if let Some(value) = rest.strip_prefix('j') {
                        settings.jobs = parse_jobs(value)?;
                    } else if arg.starts_with("-fuse-ld=") {
                        custom_linker = true;
                        settings.link_args.push(arg.clone());
                    } else if arg.starts_with("-l")
                        || arg.starts_with("-L")
                        || arg.starts_with("-Wl,")
                    {
                        settings.link_args.push(arg.clone());
                    } else if let Some(value) = rest.strip_prefix('I') {
                        add_include_dir(&mut settings, strip_quotes(value));
                    } else if let Some(value) = arg.strip_prefix("--pch=") {
                        inputs.push(pch_input(&settings, value, None));
                    } else if let Some(value) = arg.strip_prefix("--c++pch=") {
                        inputs.push(pch_input(&settings, value, Some(SourceKind::Pch)));
                    } else if arg.starts_with("-std=c++") {
                        settings.cxx_std = arg.clone();
                    } else if arg.starts_with("-std=c") {
                        settings.c_std = arg.clone();
                    } else {
                        // Pass-through compiler flag. A bare two-character
                        // flag (or -include) takes the next argument with
                        // it, so that argument is not mistaken for a file.
                        settings.base_args.push(arg.clone());
                        if arg.len() == 2 || arg == "-include" {
                            if let Some(value) = iter.next() {
                                settings.base_args.push(value.clone());
                            }
                        }
                    }
                }
            }
        } else {
            let path = Utf8Path::new(arg);
            match SourceKind::from_path(arg) {
                Some(kind) => inputs.push((normalise(&settings.working_dir, path), kind)),
                None if path.is_dir() => expand_directory(&settings, path, &mut inputs),
                None => warn!(input = %arg, "unknown input supplied"),
            }
        }
    }

    // No translation unit among the inputs: fall back to src/.
    let has_unit = inputs.iter().any(|(_, kind)| {
        matches!(
            kind,
            SourceKind::Unit | SourceKind::CUnit | SourceKind::Module
        )
    });
    if !has_unit {
        expand_directory(&settings, Utf8Path::new("src"), &mut inputs);
    }

    settings.set_output(output, build_kind);

    if matches!(build_kind, BuildKind::Live | BuildKind::Shared) {
        settings.base_args.push("-fPIC".to_string());
        settings.link_args.push("-shared".to_string());
    }
    settings.base_args.push("-Winvalid-pch".to_string());

    if settings.test {
        if build_kind == BuildKind::Standalone {
            return Err(CliError::TestInStandalone);
        }
        settings.base_args.push("-DLX_TEST".to_string());
    }

    Ok(Invocation {
        settings,
        inputs,
        clean,
        start_clean,
        custom_linker,
    })
}

fn take_value<'a>(
    iter: &mut std::iter::Peekable<std::slice::Iter<'a, String>>,
    flag: &str,
) -> Result<&'a str, CliError> {
    iter.next()
        .map(String::as_str)
        .ok_or_else(|| CliError::MissingValue {
            flag: flag.to_string(),
        })
}

fn parse_jobs(value: &str) -> Result<usize, CliError> {
    value.parse().map_err(|_| CliError::InvalidJobs {
        value: value.to_string(),
    })
}

/// Include directories steer both our resolution and the compiler's.
fn add_include_dir(settings: &mut BuildSettings, dir: &str) {
    settings.include_dirs.push(Utf8PathBuf::from(dir));
    settings.base_args.push(format!("-I{dir}"));
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn pch_input(
    settings: &BuildSettings,
    path: &str,
    forced: Option<SourceKind>,
) -> (Utf8PathBuf, SourceKind) {
    let kind = forced.unwrap_or_else(|| SourceKind::pch_from_path(path));
    (normalise(&settings.working_dir, Utf8Path::new(path)), kind)
}

/// Recursively add every classifiable file under a directory, in sorted
/// order so builds are reproducible.
fn expand_directory(
    settings: &BuildSettings,
    dir: &Utf8Path,
    inputs: &mut Vec<(Utf8PathBuf, SourceKind)>,
) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<Utf8PathBuf> = entries
        .flatten()
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            expand_directory(settings, &path, inputs);
        } else if let Some(kind) = SourceKind::from_path(path.as_str()) {
            inputs.push((normalise(&settings.working_dir, &path), kind));
        }
    }
}
