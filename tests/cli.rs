use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONFIG: &str = r#"
[kill_zone]
enabled = false

[[devices]]
name = "wand"
buttons = 2
button_names = ["Trigger", "Grip"]
"#;

const BINDINGS: &str = r#"
version = 1

[[section]]
kind = "tool"
name = "Tool0"
tool_class = "Forwarder"
bindings = [["wand", "Trigger"]]

[[section]]
kind = "tool"
name = "Tool1"
tool_class = "Navigation"
bindings = [["Tool0", "Button0"]]

[[section]]
kind = "tool"
name = "Tool2"
tool_class = "Menu"
bindings = [["glove", "Button0"]]
"#;

fn toolgraph_cmd() -> Command {
    Command::cargo_bin("toolgraph").expect("binary exists")
}

fn workspace() -> (TempDir, PathBuf, PathBuf) {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");
    let bindings = temp.path().join("bindings.toml");
    fs::write(&config, CONFIG).unwrap();
    fs::write(&bindings, BINDINGS).unwrap();
    (temp, config, bindings)
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn toolgraph_help_prints_usage() {
    toolgraph_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Input device and tool binding graph",
        ));
}

#[test]
fn init_config_writes_example_once() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("toolgraph").join("config.toml");

    toolgraph_cmd()
        .args(["--config", path_arg(&config), "--init-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default configuration"));
    assert!(config.exists());

    toolgraph_cmd()
        .args(["--config", path_arg(&config), "--init-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn bindings_load_and_levels_are_reported() {
    let (_temp, config, bindings) = workspace();

    toolgraph_cmd()
        .args([
            "--config",
            path_arg(&config),
            "--bindings",
            path_arg(&bindings),
            "--levels",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 virtual devices, 2 tools"))
        .stdout(predicate::str::contains("unknown device 'glove'"))
        .stdout(predicate::str::contains("Level 1"))
        .stdout(predicate::str::contains("Navigation (tool#"));
}

#[test]
fn save_writes_a_reloadable_graph() {
    let (temp, config, bindings) = workspace();
    let saved = temp.path().join("saved.toml");

    toolgraph_cmd()
        .args([
            "--config",
            path_arg(&config),
            "--bindings",
            path_arg(&bindings),
            "--save",
            path_arg(&saved),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved input graph"));

    let text = fs::read_to_string(&saved).unwrap();
    assert!(text.contains("tool_class = \"Navigation\""));
    assert!(!text.contains("glove"));

    toolgraph_cmd()
        .args(["--config", path_arg(&config), "--bindings", path_arg(&saved)])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 virtual devices, 2 tools"));
}

#[test]
fn newer_binding_file_is_rejected() {
    let (temp, config, _bindings) = workspace();
    let future = temp.path().join("future.toml");
    fs::write(&future, "version = 99\n").unwrap();

    toolgraph_cmd()
        .args(["--config", path_arg(&config), "--bindings", path_arg(&future)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not supported"));
}

#[test]
fn schema_dump_lists_config_sections() {
    let temp = TempDir::new().unwrap();
    let schema = temp.path().join("schema.json");

    Command::cargo_bin("dump_config_schema")
        .expect("binary exists")
        .arg(path_arg(&schema))
        .assert()
        .success();

    let text = fs::read_to_string(&schema).unwrap();
    for section in ["\"input\"", "\"kill_zone\"", "\"bindings\"", "\"devices\""] {
        assert!(text.contains(section), "schema is missing {section}");
    }
}
