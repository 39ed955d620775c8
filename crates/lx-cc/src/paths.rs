//! Path normalisation and artifact path derivation.

use camino::{Utf8Path, Utf8PathBuf};

use crate::kind::SourceKind;
use crate::settings::BuildSettings;

/// Canonicalise a path and, where possible, make it relative to the
/// working directory. Paths outside the working directory stay absolute;
/// paths that do not resolve are returned as given.
pub fn normalise(working_dir: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    let Ok(absolute) = path.canonicalize_utf8() else {
        return path.to_owned();
    };
    match absolute.strip_prefix(working_dir) {
        Ok(relative) => relative.to_owned(),
        Err(_) => absolute,
    }
}

/// Derive the artifact path for a record: the source path mirrored under
/// the output subtree with the kind's artifact extension appended.
///
/// System headers keep their bare include form and land under `system/`.
/// `SharedLibrary` artifacts are named by SONAME next to the final
/// artifact and are derived by the caller instead.
pub fn artifact_path(
    settings: &BuildSettings,
    source_path: &Utf8Path,
    kind: SourceKind,
) -> Utf8PathBuf {
    let mut artifact = if kind.is_system() {
        settings.system_artifact_dir().join(source_path)
    } else {
        let relative = if source_path.is_absolute() {
            let root = source_path
                .components()
                .next()
                .map(|c| c.as_str().len())
                .unwrap_or(0);
            Utf8Path::new(&source_path.as_str()[root..])
        } else {
            source_path
        };
        settings.output_dir.join(relative)
    };

    let file_name = match artifact.file_name() {
        Some(name) => format!("{name}.{}", kind.artifact_extension()),
        None => format!(".{}", kind.artifact_extension()),
    };
    artifact.set_file_name(file_name);
    artifact
}
