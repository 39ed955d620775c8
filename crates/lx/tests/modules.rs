//! Module discovery, ordering, and cycle scenarios.

mod harness;

use harness::TestEnv;

#[test]
fn module_provider_compiles_before_its_importer() {
    let env = TestEnv::new();
    env.write_file("m.cppm", "export module m;\nexport int g();\n");
    env.write_file("impl.cpp", "import m;\nint g() { return 2; }\nint main() { return g(); }\n");

    let out = env.lx(&["--shared", "m.cppm", "impl.cpp"]);
    assert!(out.success, "stderr: {}", out.stderr);

    let lines = env.log_lines();
    let precompile = lines
        .iter()
        .position(|l| l.contains("--precompile") && l.contains("m.cppm"))
        .expect("module interface precompiled");
    let importer = lines
        .iter()
        .position(|l| l.contains("-c impl.cpp"))
        .expect("importer compiled");
    assert!(precompile < importer, "log: {lines:?}");

    // Clang importers reference the provider's precompiled interface.
    assert!(
        lines[importer].contains("-fmodule-file=m="),
        "line: {}",
        lines[importer]
    );

    assert!(env.exists("build/shared/m.cppm.pcm"));
    assert!(env.exists("build/shared/m.cppm.o"));
}

#[test]
fn import_cycle_is_reported_with_the_exact_path() {
    let env = TestEnv::new();
    env.write_file("x.cppm", "export module x;\nimport y;\n");
    env.write_file("y.cppm", "export module y;\nimport x;\n");

    let out = env.lx(&["--shared", "x.cppm", "y.cppm"]);
    assert!(!out.success);
    assert!(out.contains("circular dependencies found:"), "stderr: {}", out.stderr);

    // The printed path names each member exactly once, plus the closing
    // repetition of whichever member starts the walk.
    let cycle_line = out
        .stderr
        .lines()
        .find(|line| line.contains(" -> "))
        .expect("cycle path printed");
    let x_count = cycle_line.matches("x.cppm").count();
    let y_count = cycle_line.matches("y.cppm").count();
    assert_eq!(x_count + y_count, 3, "line: {cycle_line}");
    assert!(x_count >= 1 && y_count >= 1, "line: {cycle_line}");
    assert_eq!(cycle_line.matches(" -> ").count(), 2, "line: {cycle_line}");
}

#[test]
fn duplicate_module_providers_are_fatal() {
    let env = TestEnv::new();
    env.write_file("one.cppm", "export module m;\n");
    env.write_file("two.cppm", "export module m;\n");
    env.write_file("main.cpp", "int main() { return 0; }\n");

    let out = env.lx(&["--shared", "one.cppm", "two.cppm", "main.cpp"]);
    assert!(!out.success);
    assert!(
        out.contains("multiple implementations for module m"),
        "stderr: {}",
        out.stderr
    );
}

#[test]
fn unresolved_import_fails_but_compiles_the_rest() {
    let env = TestEnv::new();
    env.write_file("a.cpp", "import ghost;\nint main() { return 0; }\n");
    env.write_file("b.cpp", "int helper() { return 1; }\n");

    let out = env.lx(&["--shared", "a.cpp", "b.cpp"]);
    assert!(!out.success);
    assert!(out.contains("ghost"), "stderr: {}", out.stderr);

    // Unrelated work still happened, so every error surfaces in one pass.
    let mut compiled = env.compiled_units();
    compiled.sort();
    assert_eq!(compiled, ["a.cpp", "b.cpp"]);
}
