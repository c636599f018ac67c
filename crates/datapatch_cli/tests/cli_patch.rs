use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

const COUNTRIES: &str = r#"{"USA": {"life_expectancy": 78.5}, "CAN": {"life_expectancy": 82.1}}"#;

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_datapatch"))
        .args(args)
        .env_remove("DATAPATCH_DATASET")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run datapatch CLI")
}

fn write_file(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).expect("failed to write fixture");
    path
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn backup_of(path: &Path) -> PathBuf {
    let mut name = path.file_name().expect("file name").to_os_string();
    name.push(".backup");
    path.with_file_name(name)
}

#[test]
fn scoped_update_rewrites_only_the_target_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = write_file(dir.path(), "data.js", COUNTRIES);
    let edits = write_file(
        dir.path(),
        "edits.json",
        r#"{"USA": {"life_expectancy": 79.1}}"#,
    );

    let output = run_cli(&["--dataset", &arg(&data), &arg(&edits)]);
    assert!(output.status.success(), "{output:?}");

    assert_eq!(
        fs::read_to_string(&data).expect("dataset readable"),
        r#"{"USA": {"life_expectancy": 79.1}, "CAN": {"life_expectancy": 82.1}}"#
    );
    assert_eq!(
        fs::read_to_string(backup_of(&data)).expect("backup readable"),
        COUNTRIES
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("USA.life_expectancy: 78.5 -> 79.1"));
    assert!(stdout.contains("Requests processed: 1"));
}

#[test]
fn missing_edits_argument_exits_with_one() {
    let output = run_cli(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty());
}

#[test]
fn malformed_batch_exits_with_one_and_leaves_dataset_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = write_file(dir.path(), "data.js", COUNTRIES);
    let edits = write_file(dir.path(), "edits.json", r#"{"USA": {"life_expectancy": "#);

    let output = run_cli(&["--dataset", &arg(&data), &arg(&edits)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error parsing edit batch"));
    assert_eq!(fs::read_to_string(&data).expect("dataset readable"), COUNTRIES);
    assert!(!backup_of(&data).exists());
}

#[test]
fn missing_dataset_exits_with_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let edits = write_file(dir.path(), "edits.json", r#"{"USA": {"gdp": 1}}"#);
    let missing = dir.path().join("absent.js");

    let output = run_cli(&["--dataset", &arg(&missing), &arg(&edits)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.js"));
}

#[test]
fn unmatched_edit_is_reported_but_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = write_file(dir.path(), "data.js", COUNTRIES);
    let edits = write_file(
        dir.path(),
        "edits.json",
        r#"{"MEX": {"life_expectancy": 75.0}}"#,
    );

    let output = run_cli(&["--dataset", &arg(&data), &arg(&edits)]);
    assert!(output.status.success(), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stdout).contains("[miss] MEX.life_expectancy"));
    assert_eq!(fs::read_to_string(&data).expect("dataset readable"), COUNTRIES);
}

#[test]
fn mass_mode_updates_every_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = write_file(
        dir.path(),
        "data.js",
        "{\n  '001': { unit: 'km' },\n  '002': { unit: 'km' }\n}\n",
    );
    let edits = write_file(dir.path(), "edits.json", r#"{"unit": "mi"}"#);

    let output = run_cli(&["--dataset", &arg(&data), "--mode", "mass", &arg(&edits)]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        fs::read_to_string(&data).expect("dataset readable"),
        "{\n  '001': { unit: 'mi' },\n  '002': { unit: 'mi' }\n}\n"
    );
}

#[test]
fn grouped_batch_only_touches_its_category() {
    let dir = tempfile::tempdir().expect("tempdir");
    let original = "{\n  countries: { '001': { name: 'Aland' } },\n  movies: { '001': { name: 'Alien' } }\n}\n";
    let data = write_file(dir.path(), "data.js", original);
    let edits = write_file(
        dir.path(),
        "edits.json",
        r#"{"movies": {"001": {"name": "Aliens"}}}"#,
    );

    let output = run_cli(&["--dataset", &arg(&data), "--mode", "grouped", &arg(&edits)]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        fs::read_to_string(&data).expect("dataset readable"),
        original.replace("'Alien'", "'Aliens'")
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("movies.001.name: 'Alien' -> 'Aliens'"));
}

#[test]
fn json_output_reports_counts_and_delta() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = write_file(dir.path(), "data.js", COUNTRIES);
    let edits = write_file(
        dir.path(),
        "edits.json",
        r#"{"CAN": {"life_expectancy": 82.3}}"#,
    );

    let output = run_cli(&[
        "--dataset",
        &arg(&data),
        "--json",
        "--show-delta",
        &arg(&edits),
    ]);
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: Value = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["state"], "written");
    assert_eq!(json["requested"], 1);
    assert_eq!(json["sites_changed"], 1);
    assert_eq!(json["edits"][0]["previous"], "82.1");
    assert_eq!(json["delta"][0]["kind"], "Removed");
    assert_eq!(json["delta"][1]["kind"], "Added");
}

#[test]
fn dry_run_leaves_files_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = write_file(dir.path(), "data.js", COUNTRIES);
    let edits = write_file(
        dir.path(),
        "edits.json",
        r#"{"USA": {"life_expectancy": 79.1}}"#,
    );

    let output = run_cli(&[
        "--dataset",
        &arg(&data),
        "--dry-run",
        "--show-delta",
        &arg(&edits),
    ]);
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Dry run on"));
    assert!(stdout.contains("+ USA.life_expectancy: 79.1"));
    assert_eq!(fs::read_to_string(&data).expect("dataset readable"), COUNTRIES);
    assert!(!backup_of(&data).exists());
}

#[test]
fn dataset_can_come_from_the_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = write_file(dir.path(), "countries.js", COUNTRIES);
    let edits = write_file(
        dir.path(),
        "edits.json",
        r#"{"CAN": {"life_expectancy": 83}}"#,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_datapatch"))
        .arg(arg(&edits))
        .env("DATAPATCH_DATASET", arg(&data))
        .output()
        .expect("failed to run datapatch CLI");
    assert!(output.status.success(), "{output:?}");
    assert!(
        fs::read_to_string(&data)
            .expect("dataset readable")
            .contains(r#""CAN": {"life_expectancy": 83}"#)
    );
}
