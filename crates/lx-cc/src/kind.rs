//! Source classification
//!
//! Maps file extensions to a [`SourceKind`] and carries the predicates the
//! rest of the build uses to decide how a record is compiled and linked.

/// What a source path is, and therefore how it is "compiled".
///
/// The kind of a record is decided once, when the record is inserted into
/// the graph, and never changes afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// A C++ translation unit.
    Unit,
    /// A C translation unit.
    CUnit,
    /// A C++ module interface unit; compiled to a module artifact and an
    /// object.
    Module,
    /// A header included textually; "compiling" it stamps a timestamp.
    Header,
    /// An angled include; timestamp only, location resolved through the
    /// compiler's search directories.
    SystemHeader,
    /// A header compiled as a standalone module artifact.
    HeaderUnit,
    /// An angled include compiled as a standalone module artifact.
    SystemHeaderUnit,
    /// The C++ precompiled header. At most one per graph.
    Pch,
    /// The C precompiled header. At most one per graph.
    CPch,
    /// A referenced include with an unrecognised extension; timestamp only.
    BareInclude,
    /// A pre-built object contributed at link time.
    Object,
    /// A pre-built static library contributed at link time.
    StaticLibrary,
    /// A pre-built shared library; copied next to the final artifact under
    /// its SONAME and linked with `-l:`.
    SharedLibrary,
}

impl SourceKind {
    /// Classify a path by its extension. Returns `None` for extensions the
    /// build does not understand.
    ///
    /// `.c` and `.C` are distinguished (C vs. classic-unix C++); everything
    /// else is case-insensitive within its family. `.so.1.2` style
    /// versioned shared libraries are recognised.
    pub fn from_path(path: &str) -> Option<SourceKind> {
        let file_name = path.rsplit('/').next().unwrap_or(path);

        if is_versioned_shared_library(file_name) {
            return Some(SourceKind::SharedLibrary);
        }

        let (_, ext) = file_name.rsplit_once('.')?;
        match ext {
            "c" => Some(SourceKind::CUnit),
            "C" => Some(SourceKind::Unit),
            "h" | "H" => Some(SourceKind::Header),
            "so" => Some(SourceKind::SharedLibrary),
            "a" => Some(SourceKind::StaticLibrary),
            _ => match ext.to_ascii_lowercase().as_str() {
                "cc" | "cpp" | "cxx" | "c++" => Some(SourceKind::Unit),
                "hh" | "hpp" | "hxx" | "h++" => Some(SourceKind::Header),
                "cppm" => Some(SourceKind::Module),
                "o" | "obj" => Some(SourceKind::Object),
                _ => None,
            },
        }
    }

    /// Classify a path that was registered as a PCH input. `.h` becomes the
    /// C PCH; everything else is the C++ PCH.
    pub fn pch_from_path(path: &str) -> SourceKind {
        match SourceKind::from_path(path) {
            Some(SourceKind::Header) if path.ends_with(".h") => SourceKind::CPch,
            _ => SourceKind::Pch,
        }
    }

    /// True for kinds that are never translated to a linkable object.
    pub fn is_include(self) -> bool {
        matches!(
            self,
            SourceKind::Header
                | SourceKind::SystemHeader
                | SourceKind::HeaderUnit
                | SourceKind::SystemHeaderUnit
                | SourceKind::Pch
                | SourceKind::CPch
                | SourceKind::BareInclude
        )
    }

    /// True for kinds whose "compile" only stamps a `.timestamp` marker.
    pub fn compile_to_timestamp(self) -> bool {
        matches!(
            self,
            SourceKind::Header
                | SourceKind::SystemHeader
                | SourceKind::BareInclude
                | SourceKind::Object
                | SourceKind::StaticLibrary
        )
    }

    /// True for kinds that may contain `import` declarations.
    pub fn imports_modules(self) -> bool {
        matches!(
            self,
            SourceKind::Unit | SourceKind::Module | SourceKind::HeaderUnit
        )
    }

    /// True for the precompiled header kinds.
    pub fn is_pch(self) -> bool {
        matches!(self, SourceKind::Pch | SourceKind::CPch)
    }

    /// True for kinds resolved through the compiler's include search path
    /// rather than the filesystem directly.
    pub fn is_system(self) -> bool {
        matches!(self, SourceKind::SystemHeader | SourceKind::SystemHeaderUnit)
    }

    /// Extension appended to the mirrored source path to form the artifact
    /// path. `SharedLibrary` artifacts are named by SONAME instead.
    pub fn artifact_extension(self) -> &'static str {
        match self {
            SourceKind::Unit | SourceKind::CUnit | SourceKind::Module => "o",
            SourceKind::HeaderUnit | SourceKind::SystemHeaderUnit => "pcm",
            SourceKind::Pch | SourceKind::CPch => "gch",
            SourceKind::Header
            | SourceKind::SystemHeader
            | SourceKind::BareInclude
            | SourceKind::Object
            | SourceKind::StaticLibrary
            | SourceKind::SharedLibrary => "timestamp",
        }
    }
}

/// `libfoo.so.1.2.3` and friends: a `.so` segment followed only by numeric
/// segments.
fn is_versioned_shared_library(file_name: &str) -> bool {
    let Some(pos) = file_name.find(".so.") else {
        return false;
    };
    let suffix = &file_name[pos + ".so.".len()..];
    !suffix.is_empty()
        && suffix
            .split('.')
            .all(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_translation_units() {
        assert_eq!(SourceKind::from_path("main.c"), Some(SourceKind::CUnit));
        assert_eq!(SourceKind::from_path("main.C"), Some(SourceKind::Unit));
        assert_eq!(SourceKind::from_path("main.cc"), Some(SourceKind::Unit));
        assert_eq!(SourceKind::from_path("main.cpp"), Some(SourceKind::Unit));
        assert_eq!(SourceKind::from_path("main.CPP"), Some(SourceKind::Unit));
        assert_eq!(SourceKind::from_path("main.cxx"), Some(SourceKind::Unit));
        assert_eq!(SourceKind::from_path("main.c++"), Some(SourceKind::Unit));
        assert_eq!(SourceKind::from_path("iface.cppm"), Some(SourceKind::Module));
    }

    #[test]
    fn classify_headers() {
        assert_eq!(SourceKind::from_path("a.h"), Some(SourceKind::Header));
        assert_eq!(SourceKind::from_path("a.H"), Some(SourceKind::Header));
        assert_eq!(SourceKind::from_path("a.hpp"), Some(SourceKind::Header));
        assert_eq!(SourceKind::from_path("a.hh"), Some(SourceKind::Header));
        assert_eq!(SourceKind::from_path("a.hxx"), Some(SourceKind::Header));
        assert_eq!(SourceKind::from_path("a.h++"), Some(SourceKind::Header));
    }

    #[test]
    fn classify_link_inputs() {
        assert_eq!(SourceKind::from_path("x.o"), Some(SourceKind::Object));
        assert_eq!(SourceKind::from_path("x.obj"), Some(SourceKind::Object));
        assert_eq!(SourceKind::from_path("libx.a"), Some(SourceKind::StaticLibrary));
        assert_eq!(
            SourceKind::from_path("libx.so"),
            Some(SourceKind::SharedLibrary)
        );
        assert_eq!(
            SourceKind::from_path("libx.so.1.2.3"),
            Some(SourceKind::SharedLibrary)
        );
        assert_eq!(SourceKind::from_path("libx.so.bak"), None);
    }

    #[test]
    fn reject_unknown_extensions() {
        assert_eq!(SourceKind::from_path("notes.txt"), None);
        assert_eq!(SourceKind::from_path("Makefile"), None);
        assert_eq!(SourceKind::from_path("dir/file"), None);
    }

    #[test]
    fn pch_flavor_by_extension() {
        assert_eq!(SourceKind::pch_from_path("pch.h"), SourceKind::CPch);
        assert_eq!(SourceKind::pch_from_path("pch.hpp"), SourceKind::Pch);
        assert_eq!(SourceKind::pch_from_path("pch.hh"), SourceKind::Pch);
    }

    #[test]
    fn predicates() {
        assert!(SourceKind::Header.is_include());
        assert!(SourceKind::Pch.is_include());
        assert!(!SourceKind::Unit.is_include());
        assert!(!SourceKind::Object.is_include());

        assert!(SourceKind::Object.compile_to_timestamp());
        assert!(SourceKind::SystemHeader.compile_to_timestamp());
        assert!(!SourceKind::HeaderUnit.compile_to_timestamp());

        assert!(SourceKind::Unit.imports_modules());
        assert!(!SourceKind::CUnit.imports_modules());

        assert!(SourceKind::CPch.is_pch());
        assert!(!SourceKind::Header.is_pch());
    }
}
