//! The per-node compile step.
//!
//! Forms the compiler command for one record, spawns it with both output
//! streams captured, prints the diagnostics post-hoc (so parallel workers
//! never interleave), and refreshes the record's artifact mtime on
//! success. Timestamp-only kinds never spawn anything.

use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Stdio};
use std::sync::Arc;

use camino::Utf8Path;
use lx_cc::command::{compile_command, CompilePhase};
use lx_cc::{BuildSettings, CompilerFamily, SourceKind};
use lx_graph::{SourceDb, SourceRecord};
use lx_task::Progress;
use tracing::debug;

use crate::error::ExecError;
use crate::mapper::MapperPipe;

/// Compile a record to its artifact path (the batch build).
pub fn compile_node(
    db: &Arc<SourceDb>,
    settings: &Arc<BuildSettings>,
    record: &Arc<SourceRecord>,
    progress: &Progress,
) -> Result<(), ExecError> {
    let artifact = record.artifact_path.clone();
    ensure_parent_dir(&artifact)?;

    if record.kind.compile_to_timestamp() {
        touch(&artifact)?;
        record.refresh_artifact_mtime();
        return Ok(());
    }

    if record.kind == SourceKind::SharedLibrary {
        // The copy keeps the SONAME as its file name so the runtime
        // loader finds it next to the final artifact.
        fs::copy(&record.source_path, &artifact).map_err(|source| ExecError::Io {
            path: artifact.clone(),
            source,
        })?;
        record.refresh_artifact_mtime();
        return Ok(());
    }

    if record.kind.is_pch() {
        write_pch_shim(settings, record)?;
    }

    if !settings.verbose {
        progress.println(&format!("Compiling {}", record.source_path));
    }

    if record.kind == SourceKind::Module && settings.family == CompilerFamily::Clang {
        // Clang compiles a module twice: interface first, then the
        // object off the precompiled interface.
        let pcm = record.module_artifact_path();
        run_compiler(
            db,
            settings,
            record,
            &record.source_path,
            &pcm,
            CompilePhase::Precompile,
            progress,
        )?;
        run_compiler(db, settings, record, &pcm, &artifact, CompilePhase::Batch, progress)?;
    } else {
        run_compiler(
            db,
            settings,
            record,
            &record.source_path,
            &artifact,
            CompilePhase::Batch,
            progress,
        )?;
    }

    record.refresh_artifact_mtime();
    Ok(())
}

/// Compile a single unit as a position-independent shared object for the
/// live engine.
pub fn compile_live(
    db: &Arc<SourceDb>,
    settings: &Arc<BuildSettings>,
    record: &Arc<SourceRecord>,
    output: &Utf8Path,
    progress: &Progress,
) -> Result<(), ExecError> {
    ensure_parent_dir(output)?;
    run_compiler(
        db,
        settings,
        record,
        &record.source_path,
        output,
        CompilePhase::Live,
        progress,
    )
}

fn run_compiler(
    db: &Arc<SourceDb>,
    settings: &Arc<BuildSettings>,
    record: &Arc<SourceRecord>,
    source: &Utf8Path,
    output: &Utf8Path,
    phase: CompilePhase,
    progress: &Progress,
) -> Result<(), ExecError> {
    let fragment = record.build_include_args.lock().clone();
    let mut invocation = compile_command(settings, record.kind, source, output, &fragment, phase);

    // GCC learns module artifact locations over the mapper pipe, not
    // through flags; the server lives exactly as long as the child.
    let wants_mapper = settings.family == CompilerFamily::Gcc
        && (record.kind.imports_modules() || record.kind == SourceKind::SystemHeaderUnit);
    let mapper = if wants_mapper {
        let pipe = MapperPipe::spawn(db.clone(), record.clone(), settings.module_repo_dir())
            .map_err(|source| ExecError::Io {
                path: record.source_path.clone(),
                source,
            })?;
        invocation.args.push(pipe.mapper_arg());
        Some(pipe)
    } else {
        None
    };

    if settings.verbose {
        progress.println(&invocation.shell_join());
    }
    debug!(source = %source, output = %output, "spawning compiler");

    let child_output = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| ExecError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
    drop(mapper);

    if let Some(signal) = child_output.status.signal() {
        if signal == libc::SIGINT || signal == libc::SIGQUIT {
            return Err(ExecError::Interrupted);
        }
    }

    let success = child_output.status.success();
    let mut diagnostics = String::from_utf8_lossy(&child_output.stdout).into_owned();
    diagnostics.push_str(&String::from_utf8_lossy(&child_output.stderr));

    // System header units spray warnings we did not write; only show
    // them when the compile actually failed.
    let suppress = success && record.kind == SourceKind::SystemHeaderUnit;
    if !diagnostics.trim().is_empty() && !suppress {
        progress.println(diagnostics.trim_end());
    }

    if !success {
        let _ = fs::remove_file(output);
        return Err(ExecError::CompileFailed {
            path: record.source_path.clone(),
        });
    }
    Ok(())
}

/// GCC wants the real header next to the `.gch` so `-include` resolves;
/// Clang gets a tripwire that explodes if the shim is included textually.
fn write_pch_shim(settings: &BuildSettings, record: &SourceRecord) -> Result<(), ExecError> {
    let shim = record.pch_include_path();
    let result = match settings.family {
        CompilerFamily::Gcc => fs::copy(&record.source_path, &shim).map(|_| ()),
        CompilerFamily::Clang => fs::write(&shim, "#error PCH not included\n"),
    };
    result.map_err(|source| ExecError::Io { path: shim, source })
}

fn ensure_parent_dir(path: &Utf8Path) -> Result<(), ExecError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ExecError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }
    Ok(())
}

/// Create or refresh an empty timestamp artifact.
fn touch(path: &Utf8Path) -> Result<(), ExecError> {
    fs::write(path, b"").map_err(|source| ExecError::Io {
        path: path.to_owned(),
        source,
    })
}
