//! Integration tests for the pdfkernel CLI
//!
//! Runs the built binary against documents written with the library and
//! checks its output and the files it produces.

use anyhow::Result;
use pdf_kernel::{Document, ExtGState, ParseOptions, Rectangle};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};

/// Test helper to get the CLI binary path
fn get_cli_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdfkernel"))
}

fn setup_temp_dir() -> TempDir {
    tempdir().expect("Failed to create temp directory")
}

fn run_cli_command(args: &[&str]) -> Result<Output> {
    let output = Command::new(get_cli_path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()?;
    Ok(output)
}

/// Writes a document with `pages` pages, each using two graphics states.
fn write_sample(path: &Path, title: &str, pages: usize) {
    let mut document = Document::new();
    document.set_title(title);
    let shared = document
        .register(ExtGState::new().with_alpha(0.5))
        .unwrap();
    for _ in 0..pages {
        let page = document.add_new_page(Rectangle::a4()).unwrap();
        document.add_ext_gstate(&page, shared).unwrap();
        document
            .add_ext_gstate(&page, ExtGState::new().with_line_width(3.0))
            .unwrap();
    }
    document.save(path).unwrap();
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_cli_info_command() {
    let temp_dir = setup_temp_dir();
    let input = temp_dir.path().join("info.pdf");
    write_sample(&input, "CLI Info", 2);

    let output = run_cli_command(&["info", input.to_str().unwrap()]).unwrap();
    assert!(output.status.success(), "Command should succeed");

    let stdout = stdout_of(&output);
    assert!(stdout.contains("PDF Version: 1.7"));
    assert!(stdout.contains("Pages: 2"));
    assert!(stdout.contains("Title: CLI Info"));
}

#[test]
fn test_cli_objects_command() {
    let temp_dir = setup_temp_dir();
    let input = temp_dir.path().join("objects.pdf");
    write_sample(&input, "Objects", 1);

    let output = run_cli_command(&["objects", input.to_str().unwrap()]).unwrap();
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "1 0 dictionary /Pages");
    assert_eq!(lines[1], "2 0 dictionary /Catalog");
    assert!(lines.iter().any(|line| line.ends_with("dictionary /Page")));
    assert!(lines.iter().any(|line| line.ends_with("dictionary /ExtGState")));
}

#[test]
fn test_cli_resources_command() {
    let temp_dir = setup_temp_dir();
    let input = temp_dir.path().join("resources.pdf");
    write_sample(&input, "Resources", 2);

    let output =
        run_cli_command(&["resources", input.to_str().unwrap(), "--page", "2"]).unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "Gs1\nGs2\n");
}

#[test]
fn test_cli_resources_rejects_missing_page() {
    let temp_dir = setup_temp_dir();
    let input = temp_dir.path().join("short.pdf");
    write_sample(&input, "Short", 1);

    let output =
        run_cli_command(&["resources", input.to_str().unwrap(), "--page", "5"]).unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Page 5 not found"));
}

#[test]
fn test_cli_merge_command() {
    let temp_dir = setup_temp_dir();
    let first = temp_dir.path().join("first.pdf");
    let second = temp_dir.path().join("second.pdf");
    let merged = temp_dir.path().join("merged.pdf");
    write_sample(&first, "First", 2);
    write_sample(&second, "Second", 3);

    let output = run_cli_command(&[
        "merge",
        first.to_str().unwrap(),
        second.to_str().unwrap(),
        "-o",
        merged.to_str().unwrap(),
    ])
    .unwrap();
    assert!(output.status.success(), "Command should succeed");
    assert!(stdout_of(&output).contains("Merged 5 pages from 2 files"));

    let content = fs::read(&merged).unwrap();
    assert!(content.starts_with(b"%PDF-"));
    let document = Document::from_bytes(content, ParseOptions::strict()).unwrap();
    assert_eq!(document.page_count().unwrap(), 5);

    // Each copied page keeps its own resource names
    let last = document.page(4).unwrap();
    let names: Vec<String> = document
        .page_resources(&last)
        .unwrap()
        .resource_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(names, vec!["Gs1", "Gs2"]);
}

#[test]
fn test_cli_merge_missing_file_fails() {
    let temp_dir = setup_temp_dir();
    let missing = temp_dir.path().join("missing.pdf");
    let merged = temp_dir.path().join("merged.pdf");

    let output = run_cli_command(&[
        "merge",
        missing.to_str().unwrap(),
        "-o",
        merged.to_str().unwrap(),
    ])
    .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to open PDF"));
    assert!(!merged.exists());
}

#[test]
fn test_cli_rejects_non_pdf() {
    let temp_dir = setup_temp_dir();
    let input = temp_dir.path().join("notes.txt");
    fs::write(&input, "just some text").unwrap();

    let output = run_cli_command(&["info", input.to_str().unwrap()]).unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_cli_help() {
    let output = run_cli_command(&["--help"]).unwrap();
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    for command in ["info", "objects", "resources", "merge"] {
        assert!(stdout.contains(command), "help should list {command}");
    }
}
