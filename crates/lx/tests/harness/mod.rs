//! Test harness for lx integration tests.
//!
//! Each test gets an isolated project tree in a temp directory and a fake
//! compiler: a shell shim that appends its argv to a log and touches
//! whatever `-o` names. That is enough to exercise scanning, graph
//! building, dirty propagation, scheduling order, and link composition
//! without a real toolchain.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

const FAKE_CC: &str = r#"#!/bin/sh
# Fake compiler: log the invocation, optionally fail, touch the -o target.
echo "$@" >> "${FAKE_CC_LOG:?}"
if [ -n "$FAKE_CC_FAIL" ]; then
    case "$*" in
        *"$FAKE_CC_FAIL"*) exit 1 ;;
    esac
fi
out=""
prev=""
for a in "$@"; do
    if [ "$prev" = "-o" ]; then out="$a"; fi
    prev="$a"
done
if [ -n "$out" ]; then : > "$out"; fi
exit 0
"#;

pub struct TestEnv {
    _dir: TempDir,
    pub root: PathBuf,
    fake_cc: PathBuf,
    log: PathBuf,
    /// When set, the fake compiler fails for any argv containing this.
    pub fail_match: Option<String>,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create project temp dir");
        let root = dir.path().canonicalize().expect("canonical temp dir");
        let fake_cc = root.join("cc-shim.sh");
        let log = root.join("cc.log");
        fs::write(&fake_cc, FAKE_CC).expect("failed to write fake compiler");
        let mut perms = fs::metadata(&fake_cc).unwrap().permissions();
        {
            use std::os::unix::fs::PermissionsExt;
            perms.set_mode(0o755);
        }
        fs::set_permissions(&fake_cc, perms).unwrap();
        fs::write(&log, "").unwrap();
        Self {
            _dir: dir,
            root,
            fake_cc,
            log,
            fail_match: None,
        }
    }

    pub fn write_file(&self, relative: &str, contents: &str) {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root.join(relative).exists()
    }

    pub fn read_file(&self, relative: &str) -> String {
        fs::read_to_string(self.root.join(relative)).unwrap()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Shift a file's mtime by `offset_secs` relative to now (negative
    /// values backdate it).
    pub fn set_mtime(&self, relative: &str, offset_secs: i64) {
        let when = if offset_secs >= 0 {
            SystemTime::now() + Duration::from_secs(offset_secs as u64)
        } else {
            SystemTime::now() - Duration::from_secs((-offset_secs) as u64)
        };
        let file = fs::File::options()
            .write(true)
            .open(self.root.join(relative))
            .unwrap();
        file.set_modified(when).unwrap();
    }

    pub fn mtime(&self, relative: &str) -> SystemTime {
        fs::metadata(self.root.join(relative))
            .unwrap()
            .modified()
            .unwrap()
    }

    /// Run the lx binary in this project.
    pub fn lx(&self, args: &[&str]) -> LxOutput {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_lx"));
        cmd.current_dir(&self.root)
            .args(args)
            .env("CXX", &self.fake_cc)
            .env("FAKE_CC_LOG", &self.log)
            .env_remove("CC")
            .env_remove("FAKE_CC_FAIL");
        if let Some(pattern) = &self.fail_match {
            cmd.env("FAKE_CC_FAIL", pattern);
        }
        let output = cmd.output().expect("failed to run lx");
        LxOutput::from(output)
    }

    pub fn clear_log(&self) {
        fs::write(&self.log, "").unwrap();
    }

    pub fn log_lines(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Sources handed to `-c`, in compile order.
    pub fn compiled_units(&self) -> Vec<String> {
        self.log_lines()
            .iter()
            .filter_map(|line| {
                let mut words = line.split(' ');
                while let Some(word) = words.next() {
                    if word == "-c" {
                        return words.next().map(str::to_owned);
                    }
                }
                None
            })
            .collect()
    }

    /// How many link invocations targeted the given output.
    pub fn link_count(&self, output: &str) -> usize {
        let marker = format!("-o {output}");
        self.log_lines()
            .iter()
            .filter(|line| line.contains(&marker) && !line.contains(" -c "))
            .count()
    }
}

#[derive(Debug)]
pub struct LxOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl LxOutput {
    pub fn contains(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}

impl From<Output> for LxOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// The two-unit project from the cold-build scenario.
pub fn create_two_unit_project(env: &TestEnv) {
    env.write_file("a.cpp", "#include \"h.hpp\"\nint f() { return 1; }\n");
    env.write_file("b.cpp", "#include \"h.hpp\"\nint main() { return f(); }\n");
    env.write_file("h.hpp", "int f();\n");
}
