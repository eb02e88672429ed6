use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn run_generate(config: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mpybindgen"))
        .arg("generate")
        .arg("--source")
        .arg(config)
        .args(extra)
        .output()
        .expect("failed to run mpybindgen")
}

fn write_project(dir: &Path, header: &str) -> std::path::PathBuf {
    fs::create_dir_all(dir.join("src")).expect("failed to create source dir");
    fs::write(dir.join("src/demo.h"), header).expect("failed to write source");
    let config = dir.join("bindings.json");
    fs::write(
        &config,
        r#"{"target_path": "out/bindings", "base_directory": "src"}"#,
    )
    .expect("failed to write config");
    config
}

const CLEAN_HEADER: &str = "MPyModule(demo)\n\
MPyClass(TypeOwned)\n\
class Vec2 {\n\
public:\n\
    Vec2(float x, float y);\n\
    MPyProperty()\n\
    float x;\n\
    MPyFunction()\n\
    float Length() const;\n\
};\n";

#[test]
fn generate_writes_both_artifacts() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = write_project(dir.path(), CLEAN_HEADER);

    let output = run_generate(&config, &[]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let header = fs::read_to_string(dir.path().join("out/bindings.h"))
        .expect("header artifact should exist");
    let source = fs::read_to_string(dir.path().join("out/bindings.cpp"))
        .expect("source artifact should exist");
    assert!(header.contains("extern const mp_obj_module_t PyDemoUserModule;"));
    assert!(source.contains("MP_REGISTER_MODULE(MP_QSTR_demo, PyDemoUserModule)"));
    assert!(source.contains("#include \"bindings.h\""));
    assert!(source.contains("new (&self->Value) Vec2(x, y);"));
}

#[test]
fn validation_failure_exits_nonzero_and_writes_nothing() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = write_project(
        dir.path(),
        "MPyClass()\n\
         class Broken {\n\
             MPyFunction()\n\
             Mystery Get() const;\n\
         };\n",
    );

    let output = run_generate(&config, &[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Mystery"), "stderr: {stderr}");
    assert!(!dir.path().join("out/bindings.h").exists());
    assert!(!dir.path().join("out/bindings.cpp").exists());
}

#[test]
fn stdout_sentinel_prints_instead_of_writing() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = write_project(dir.path(), CLEAN_HEADER);

    let output = run_generate(&config, &["--output", "-"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout
            .matches("// Auto-generated file, do not edit")
            .count(),
        2,
        "stdout: {stdout}"
    );
    assert!(!dir.path().join("out").exists());
}

#[test]
fn command_line_variables_expand_config_paths() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::create_dir_all(dir.path().join("src")).expect("failed to create source dir");
    fs::write(dir.path().join("src/demo.h"), CLEAN_HEADER).expect("failed to write source");
    let config = dir.path().join("bindings.json");
    fs::write(
        &config,
        r#"{"target_path": "${STAGE}/bindings", "base_directory": "src"}"#,
    )
    .expect("failed to write config");

    let output = run_generate(&config, &["STAGE=generated"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(dir.path().join("generated/bindings.cpp").exists());
}

#[test]
fn dependency_header_is_included_and_its_types_resolve() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::create_dir_all(dir.path().join("core/src")).expect("failed to create core dir");
    fs::write(
        dir.path().join("core/src/handle.h"),
        "MPyModule(core)\n\
         namespace sys {\n\
         MPyClass(TypeNonTransient)\n\
         class Handle {\n\
         };\n\
         }\n",
    )
    .expect("failed to write dependency source");
    fs::write(
        dir.path().join("core/core.json"),
        r#"{"target_path": "out/core", "base_directory": "src"}"#,
    )
    .expect("failed to write dependency config");

    fs::create_dir_all(dir.path().join("app/src")).expect("failed to create app dir");
    fs::write(
        dir.path().join("app/src/user.h"),
        "MPyModule(app)\n\
         MPyClass(TypeNonTransient)\n\
         class User {\n\
             MPyFunction()\n\
             Handle Get() const;\n\
         };\n",
    )
    .expect("failed to write app source");
    let config = dir.path().join("app/app.json");
    fs::write(
        &config,
        r#"{"target_path": "out/app", "base_directory": "src", "dependencies": ["../../core/core.json"]}"#,
    )
    .expect("failed to write app config");

    let output = run_generate(&config, &[]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let header =
        fs::read_to_string(dir.path().join("app/out/app.h")).expect("header artifact");
    let source =
        fs::read_to_string(dir.path().join("app/out/app.cpp")).expect("source artifact");
    assert!(
        header.contains("../../core/out/core.h"),
        "header: {header}"
    );
    // The dependency type resolves to its declaring namespace.
    assert!(source.contains("sys::Handle"), "source: {source}");
    // The dependency's types are not re-emitted here.
    assert!(!source.contains("PyHandle::PyType,"), "source: {source}");
}
