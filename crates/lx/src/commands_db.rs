//! Persisted build state: `command.txt` and `compile_commands.json`.

use std::fs;
use std::io;
use std::sync::Arc;

use lx_cc::command::{compile_command, CompilePhase};
use lx_cc::BuildSettings;
use lx_graph::SourceDb;
use serde::Serialize;
use tracing::debug;

/// The exact text persisted to `command.txt`: base command plus both
/// language standards. A mismatch with the previous run forces a full
/// rebuild.
fn command_text(settings: &BuildSettings) -> String {
    let mut text = settings.compiler.clone();
    for arg in &settings.base_args {
        text.push(' ');
        text.push_str(arg);
    }
    text.push(' ');
    text.push_str(&settings.cxx_std);
    text.push(' ');
    text.push_str(&settings.c_std);
    text
}

/// Compare the build command against the last successful run and persist
/// the current one. Returns whether it changed (missing counts as
/// changed).
pub fn refresh_command_file(settings: &BuildSettings) -> io::Result<bool> {
    let text = command_text(settings);
    let path = settings.command_file();
    let changed = match fs::read_to_string(&path) {
        Ok(previous) => previous != text,
        Err(_) => true,
    };
    if changed {
        fs::write(&path, &text)?;
        debug!(%path, "build command changed, persisted");
    }
    Ok(changed)
}

#[derive(Serialize)]
struct CompileCommandEntry<'a> {
    directory: &'a str,
    command: String,
    file: &'a str,
}

/// Emit `compile_commands.json` at the working directory when a new
/// source joined the build or the build command changed. One entry per
/// non-include record.
pub fn update_compile_commands(
    db: &Arc<SourceDb>,
    settings: &BuildSettings,
    mut need_update: bool,
) -> io::Result<()> {
    let records = db.snapshot();
    need_update = need_update
        || records
            .iter()
            .any(|r| !r.kind.is_include() && r.artifact_mtime.lock().is_none());
    if !need_update {
        return Ok(());
    }

    let entries: Vec<CompileCommandEntry<'_>> = records
        .iter()
        .filter(|record| !record.kind.is_include())
        .map(|record| {
            let fragment = record.build_include_args.lock().clone();
            let invocation = compile_command(
                settings,
                record.kind,
                &record.source_path,
                &record.artifact_path,
                &fragment,
                CompilePhase::Batch,
            );
            CompileCommandEntry {
                directory: settings.working_dir.as_str(),
                command: invocation.shell_join(),
                file: record.source_path.as_str(),
            }
        })
        .collect();

    let file = fs::File::create("compile_commands.json")?;
    serde_json::to_writer_pretty(file, &entries)?;
    debug!(entries = entries.len(), "compile_commands.json refreshed");
    Ok(())
}
