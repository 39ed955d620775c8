//! Compiler command formation.
//!
//! Commands are argv vectors, never shell strings; capture and redirection
//! are the executor's business. The flag order mirrors what the compilers
//! are known to accept: base flags, language standard, module plumbing,
//! include fragments, phase flags, source, output.

use camino::Utf8Path;

use crate::kind::SourceKind;
use crate::settings::{BuildKind, BuildSettings, CompilerFamily};

/// A ready-to-spawn compiler invocation.
#[derive(Clone, Debug)]
pub struct CompileInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl CompileInvocation {
    /// Render as a single shell-quoted line, for `--verbose` output and
    /// `compile_commands.json`.
    pub fn shell_join(&self) -> String {
        let mut line = shell_quote(&self.program);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        line
    }
}

/// Which compile of a record this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompilePhase {
    /// The ordinary batch compile (`-c`, or the header-unit/PCH flags).
    Batch,
    /// The `--precompile` pass of a `Module` producing the `.pcm`.
    Precompile,
    /// A live rebuild of a single unit into a shared object.
    Live,
}

/// Build the compile command for one record.
///
/// `include_fragment` is the record's precomputed per-parent flags
/// (`-include` for a PCH parent, `-fmodule-file=` for header-unit and
/// module parents under Clang).
pub fn compile_command(
    settings: &BuildSettings,
    kind: SourceKind,
    source_path: &Utf8Path,
    output_path: &Utf8Path,
    include_fragment: &[String],
    phase: CompilePhase,
) -> CompileInvocation {
    let mut args = settings.base_args.clone();

    let c_family = matches!(kind, SourceKind::CUnit | SourceKind::CPch);
    args.push(settings.std_flag(c_family).to_string());

    if settings.family == CompilerFamily::Gcc
        && (kind.imports_modules() || kind == SourceKind::SystemHeaderUnit)
    {
        args.push("-fmodules".to_string());
    }

    if settings.include_source_parent_dir {
        match source_path.parent() {
            Some(parent) if !parent.as_str().is_empty() => {
                args.push(format!("-I{parent}"));
            }
            _ => args.push("-I.".to_string()),
        }
    }

    args.extend(include_fragment.iter().cloned());

    match phase {
        CompilePhase::Live => {
            args.push("-shared".to_string());
            if settings.rebuild_with_o0 {
                args.push("-O0".to_string());
            }
        }
        CompilePhase::Precompile => {
            args.push("--precompile".to_string());
        }
        CompilePhase::Batch => match kind {
            SourceKind::Pch => {
                args.push("-xc++-header".to_string());
                args.push("-c".to_string());
            }
            SourceKind::CPch => {
                args.push("-xc-header".to_string());
                args.push("-c".to_string());
            }
            SourceKind::HeaderUnit => {
                args.push("-fmodule-header=user".to_string());
                args.push("-xc++-header".to_string());
            }
            SourceKind::SystemHeaderUnit => {
                args.push("-fmodule-header=system".to_string());
                args.push("-xc++-header".to_string());
            }
            _ => args.push("-c".to_string()),
        },
    }

    args.push(source_path.to_string());

    // For GCC header units and modules the module mapper protocol dictates
    // where the artifact lands; `-o` is omitted.
    let mapper_owns_output = settings.family == CompilerFamily::Gcc
        && matches!(
            kind,
            SourceKind::Module | SourceKind::HeaderUnit | SourceKind::SystemHeaderUnit
        );
    if !mapper_owns_output {
        args.push("-o".to_string());
        args.push(output_path.to_string());
    }

    CompileInvocation {
        program: settings.compiler.clone(),
        args,
    }
}

/// One link input, in graph order.
#[derive(Clone, Debug)]
pub struct LinkEntry {
    pub kind: SourceKind,
    pub source_path: String,
    pub artifact_path: String,
}

/// Compose the final link command over all non-header artifacts.
pub fn link_command(settings: &BuildSettings, entries: &[LinkEntry]) -> CompileInvocation {
    let mut args = settings.base_args.clone();
    args.extend(settings.link_args.iter().cloned());

    if settings.build_kind != BuildKind::Standalone {
        args.push("-Wl,-z,defs".to_string());
    }

    args.push("-o".to_string());
    args.push(settings.output_file.to_string());

    let mut seen_shared_library = false;
    for entry in entries {
        match entry.kind {
            SourceKind::Unit | SourceKind::CUnit | SourceKind::Module => {
                args.push(entry.artifact_path.clone());
            }
            SourceKind::Object | SourceKind::StaticLibrary => {
                args.push(entry.source_path.clone());
            }
            SourceKind::SharedLibrary => {
                if !seen_shared_library {
                    seen_shared_library = true;
                    args.push("-Wl,-rpath,$ORIGIN".to_string());
                    args.push(format!("-L{}", settings.output_dir));
                }
                let file_name = Utf8Path::new(&entry.artifact_path)
                    .file_name()
                    .unwrap_or(entry.artifact_path.as_str());
                args.push(format!("-l:{file_name}"));
            }
            _ => {}
        }
    }

    CompileInvocation {
        program: settings.compiler.clone(),
        args,
    }
}

fn shell_quote(arg: &str) -> String {
    let clean = !arg.is_empty()
        && arg.bytes().all(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'+' | b'.' | b'/' | b'=' | b',' | b':' | b'@')
        });
    if clean {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}
