//! The final link.

use std::process::{Command, Stdio};
use std::sync::Arc;

use lx_cc::command::{link_command, LinkEntry};
use lx_cc::BuildSettings;
use lx_graph::SourceDb;
use lx_task::Progress;
use tracing::debug;

use crate::error::ExecError;

/// Link every non-include artifact into the final output. Invoked once;
/// a non-zero exit is fatal for the build.
pub fn link(
    db: &Arc<SourceDb>,
    settings: &Arc<BuildSettings>,
    progress: &Progress,
) -> Result<(), ExecError> {
    let entries: Vec<LinkEntry> = db
        .snapshot()
        .iter()
        .map(|record| LinkEntry {
            kind: record.kind,
            source_path: record.source_path.to_string(),
            artifact_path: record.artifact_path.to_string(),
        })
        .collect();

    let invocation = link_command(settings, &entries);

    progress.println("Linking sources together...");
    if settings.verbose {
        progress.println(&invocation.shell_join());
    }
    debug!(output = %settings.output_file, "linking");

    let output = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| ExecError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

    let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
    diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
    if !diagnostics.trim().is_empty() {
        progress.println(diagnostics.trim_end());
    }

    if !output.status.success() {
        return Err(ExecError::LinkFailed {
            path: settings.output_file.clone(),
            code: output.status.code().unwrap_or(-1),
        });
    }
    Ok(())
}
