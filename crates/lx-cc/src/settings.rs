//! Build settings shared by every phase.

use camino::{Utf8Path, Utf8PathBuf};

/// What the final artifact is and whether the live engine runs afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildKind {
    /// Build a shared object, load it, and patch it in place on changes.
    Live,
    /// Build a shared library and exit.
    Shared,
    /// Build a plain executable and exit.
    Standalone,
}

impl BuildKind {
    /// Name of this build type's subdirectory under the build root.
    pub fn subdir(self) -> &'static str {
        match self {
            BuildKind::Live => "live",
            BuildKind::Shared => "shared",
            BuildKind::Standalone => "standalone",
        }
    }
}

/// Which compiler dialect of flags to emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompilerFamily {
    Clang,
    Gcc,
}

/// Everything the graph builder, the executor and the live engine need to
/// know about this invocation. Settings are frozen before scanning starts.
#[derive(Clone, Debug)]
pub struct BuildSettings {
    pub working_dir: Utf8PathBuf,
    /// Directory the build-type subdirectories live under (`build/`).
    pub build_root: Utf8PathBuf,
    /// `build_root` joined with the build-type subdirectory.
    pub output_dir: Utf8PathBuf,
    /// The final linked artifact, inside `output_dir`.
    pub output_file: Utf8PathBuf,

    pub compiler: String,
    pub family: CompilerFamily,
    pub build_kind: BuildKind,

    /// Add `-I<dir of source>` to every compile.
    pub include_source_parent_dir: bool,
    /// Compile headers as header units instead of stamping timestamps.
    /// Off by default; `--header-units` opts in.
    pub use_header_units: bool,
    /// Downshift optimisation on live rebuilds.
    pub rebuild_with_o0: bool,
    pub verbose: bool,
    pub test: bool,

    /// Flags shared by every compile and the link, in command order.
    pub base_args: Vec<String>,
    /// User `-I` directories, in the order given.
    pub include_dirs: Vec<Utf8PathBuf>,
    /// Compiler-reported system include directories.
    pub system_include_dirs: Vec<Utf8PathBuf>,

    pub c_std: String,
    pub cxx_std: String,

    /// Flags only the link sees (`-l`, `-L`, `-Wl,…`, `-shared`, …).
    pub link_args: Vec<String>,

    /// Worker count; 0 means hardware parallelism minus one.
    pub jobs: usize,
}

impl BuildSettings {
    pub fn new(working_dir: Utf8PathBuf) -> Self {
        Self {
            working_dir,
            build_root: Utf8PathBuf::from("build"),
            output_dir: Utf8PathBuf::new(),
            output_file: Utf8PathBuf::new(),
            compiler: "clang".to_string(),
            family: CompilerFamily::Clang,
            build_kind: BuildKind::Live,
            include_source_parent_dir: true,
            use_header_units: false,
            rebuild_with_o0: true,
            verbose: false,
            test: false,
            base_args: Vec::new(),
            include_dirs: Vec::new(),
            system_include_dirs: Vec::new(),
            c_std: "-std=c17".to_string(),
            cxx_std: "-std=c++23".to_string(),
            link_args: Vec::new(),
            jobs: 0,
        }
    }

    /// Fix the output layout from the requested output path and build kind.
    ///
    /// `-o NAME` without an extension (and the default `a.out`) is renamed
    /// `lib<NAME>_live.a` / `lib<NAME>.a` for the non-standalone kinds; an
    /// explicit extension is kept verbatim.
    pub fn set_output(&mut self, requested: Utf8PathBuf, kind: BuildKind) {
        self.build_kind = kind;
        self.build_root = requested
            .parent()
            .map(Utf8Path::to_owned)
            .unwrap_or_default();
        self.output_dir = self.build_root.join(kind.subdir());

        let name = requested.file_name().unwrap_or("a.out");
        let keep_verbatim = Utf8Path::new(name).extension().is_some() && name != "a.out";
        let file_name = if keep_verbatim {
            name.to_string()
        } else {
            match kind {
                BuildKind::Live => format!("lib{name}_live.a"),
                BuildKind::Shared => format!("lib{name}.a"),
                BuildKind::Standalone => name.to_string(),
            }
        };
        self.output_file = self.output_dir.join(file_name);
    }

    /// Mirror of system headers compiled as header-unit artifacts.
    pub fn system_artifact_dir(&self) -> Utf8PathBuf {
        self.output_dir.join("system")
    }

    /// Live-rebuild shared objects, numbered within a run.
    pub fn tmp_dir(&self) -> Utf8PathBuf {
        self.output_dir.join("tmp")
    }

    /// Shared CMI store handed to GCC through the module mapper.
    pub fn module_repo_dir(&self) -> Utf8PathBuf {
        self.output_dir.join("module_repo")
    }

    /// Persisted build command, compared across runs to force full rebuilds.
    pub fn command_file(&self) -> Utf8PathBuf {
        self.output_dir.join("command.txt")
    }

    /// Standard flag for a record of the given language.
    pub fn std_flag(&self, c_family: bool) -> &str {
        if c_family {
            &self.c_std
        } else {
            &self.cxx_std
        }
    }
}
