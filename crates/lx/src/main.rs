//! lx - incremental C/C++ build driver with live reload
//!
//! Scans the inputs for includes and imports, closes the dependency
//! graph, compiles what changed in topological order, links, and (in
//! live mode) loads the result and patches it in place as sources
//! change.

mod argsfile;
mod cli;
mod commands_db;

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{bail, eyre, Result};
use lx_cc::paths::artifact_path;
use lx_cc::{BuildKind, SourceKind};
use lx_exec::{execute, link, BuildOutcome};
use lx_graph::{build_graph, mark_for_compilation, SourceDb, SourceRecord};
use lx_task::Progress;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::Invocation;

fn init_tracing() {
    // Default to info for lx crates, warn for everything else.
    // Can be overridden with RUST_LOG.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,lx=info,lx_graph=info,lx_exec=info,lx_live=info,lx_toolchain=info")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let args = argsfile::with_args_file(std::env::args().skip(1).collect());
    let working_dir = Utf8PathBuf::from_path_buf(std::env::current_dir()?)
        .map_err(|path| eyre!("working directory {} is not valid UTF-8", path.display()))?;
    let compiler = lx_toolchain::compiler_from_env();

    let Invocation {
        mut settings,
        inputs,
        clean,
        start_clean,
        custom_linker,
    } = cli::parse(&args, working_dir, compiler)?;

    if clean {
        if !settings.build_root.as_str().is_empty() {
            let _ = fs::remove_dir_all(&settings.build_root);
            info!("removed {}", settings.build_root);
        }
        if !start_clean {
            return Ok(());
        }
    }

    if inputs.is_empty() {
        bail!("no input files");
    }

    let toolchain = lx_toolchain::probe(&settings.compiler, custom_linker)?;
    settings.family = toolchain.family;
    settings.system_include_dirs = toolchain.system_include_dirs;
    if toolchain.prefer_mold {
        settings.link_args.push("-fuse-ld=mold".to_string());
    }

    for dir in [
        settings.output_dir.clone(),
        settings.tmp_dir(),
        settings.system_artifact_dir(),
        settings.module_repo_dir(),
    ] {
        fs::create_dir_all(&dir)?;
    }

    let settings = Arc::new(settings);
    let db = Arc::new(SourceDb::new());
    for (path, kind) in &inputs {
        db.intern(path, || {
            let artifact = if *kind == SourceKind::SharedLibrary {
                settings.output_dir.join(shared_library_artifact_name(path))
            } else {
                artifact_path(&settings, path, *kind)
            };
            SourceRecord::new(*kind, path.clone(), artifact)
        });
    }

    let command_changed = commands_db::refresh_command_file(&settings)?;
    let progress = Arc::new(if settings.verbose {
        Progress::disabled()
    } else {
        Progress::new()
    });

    let report = build_graph(&db, &settings, &progress)?;
    for graph_error in &report.errors {
        error!("{graph_error}");
    }

    commands_db::update_compile_commands(&db, &settings, command_changed)?;

    let plan = mark_for_compilation(&db, command_changed);
    info!("{plan} of {} files need compiling", db.len());

    if plan > 0 {
        let outcome = execute(&db, &settings, &progress);
        if !outcome.success() {
            report_failures(&db, &outcome);
            bail!("build failed");
        }
    }

    if !report.errors.is_empty() {
        bail!("errors while reading dependencies");
    }

    if plan > 0 || !settings.output_file.exists() {
        link(&db, &settings, &progress)?;
    }

    if settings.test {
        let count = lx_live::run_exported_tests(&settings)?;
        info!("{count} tests finished");
    } else if settings.build_kind == BuildKind::Live {
        lx_live::run(db, settings)?;
    }

    Ok(())
}

/// Shared library inputs are copied under their SONAME so the runtime
/// loader finds them next to the final artifact; libraries without one
/// keep their file name.
fn shared_library_artifact_name(path: &Utf8Path) -> String {
    lx_dl::Image::open_local(path)
        .ok()
        .and_then(|image| image.soname())
        .unwrap_or_else(|| path.file_name().unwrap_or("lib.so").to_string())
}

fn report_failures(db: &Arc<SourceDb>, outcome: &BuildOutcome) {
    if outcome.interrupted {
        eprintln!("build interrupted");
        return;
    }
    if !outcome.failed.is_empty() {
        eprintln!("compilation failed for:");
        for id in &outcome.failed {
            eprintln!("        {}", db.get(*id).source_path);
        }
        return;
    }
    if !outcome.missing_deps.is_empty() {
        eprintln!("files are missing one or more dependencies:");
        for id in &outcome.missing_deps {
            eprintln!("        {}", db.get(*id).source_path);
        }
        if !outcome.cycles.is_empty() {
            eprintln!("circular dependencies found:");
            for cycle in &outcome.cycles {
                let mut names: Vec<String> = cycle
                    .iter()
                    .map(|id| db.get(*id).source_path.to_string())
                    .collect();
                names.push(names[0].clone());
                eprintln!("        {}", names.join(" -> "));
            }
        }
    }
}
