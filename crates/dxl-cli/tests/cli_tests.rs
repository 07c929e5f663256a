//! Integration tests for the `dxl` binary's subcommands, invoked as a real
//! process per the lineage's own `docling-cli/tests/cli_tests.rs` approach.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dxl"))
}

#[test]
fn top_level_help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("normalize"))
        .stdout(predicate::str::contains("run-manifest"));
}

#[test]
fn normalize_help_lists_its_flags() {
    cli()
        .args(["normalize", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dxl-dir"))
        .stdout(predicate::str::contains("--db-title"));
}

#[test]
fn unknown_icon_path_mode_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let dxl_dir = dir.path().join("dxl");
    let json_dir = dir.path().join("json");
    std::fs::create_dir_all(&dxl_dir).unwrap();

    cli()
        .args(["--icon-path-mode", "bogus", "normalize"])
        .arg("--dxl-dir")
        .arg(&dxl_dir)
        .arg("--json-dir")
        .arg(&json_dir)
        .arg("--db-title")
        .arg("TestDb")
        .assert()
        .failure();
}

#[test]
fn normalize_then_extract_then_render_round_trip() {
    let dir = TempDir::new().unwrap();
    let dxl_dir = dir.path().join("dxl");
    let json_dir = dir.path().join("json");
    let attach_dir = json_dir.join("attachments");
    std::fs::create_dir_all(&dxl_dir).unwrap();
    std::fs::write(
        dxl_dir.join("doc1.xml"),
        r#"<document unid="ABC123" form="Memo"><noteinfo unid="ABC123"></noteinfo></document>"#,
    )
    .unwrap();

    cli()
        .arg("normalize")
        .arg("--dxl-dir")
        .arg(&dxl_dir)
        .arg("--json-dir")
        .arg(&json_dir)
        .arg("--db-title")
        .arg("TestDb")
        .assert()
        .success();

    let json_path = json_dir.join("doc1.normalized.json");
    assert!(json_path.exists());

    cli()
        .arg("extract")
        .arg("--dxl-dir")
        .arg(&dxl_dir)
        .arg("--json-dir")
        .arg(&json_dir)
        .arg("--attach-dir")
        .arg(&attach_dir)
        .assert()
        .success();

    let out_dir = dir.path().join("out");
    cli()
        .arg("render")
        .arg("--json-dir")
        .arg(&json_dir)
        .arg("--out")
        .arg(&out_dir)
        .arg("--formats")
        .arg("html,md")
        .assert()
        .success();

    assert!(out_dir.join("doc1.html").exists());
    assert!(out_dir.join("doc1.md").exists());
}
