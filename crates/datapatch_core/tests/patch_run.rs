use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use datapatch_core::backup::backup_path_for;
use datapatch_core::batch::{BatchMode, parse_batch};
use datapatch_core::patch_api::{
    EditIssue, EditRequest, PatchErrorCode, PatchRun, Patcher, RunOptions, RunState,
};
use datapatch_core::store::{DatasetStore, FsStore};

const COUNTRIES: &str = r#"{"USA": {"life_expectancy": 78.5}, "CAN": {"life_expectancy": 82.1}}"#;

fn write_dataset(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("data.js");
    fs::write(&path, text).expect("failed to write dataset fixture");
    path
}

/// Corrupts the first write to the dataset path; everything else hits disk.
struct CorruptingStore {
    target: PathBuf,
    corrupted: Cell<bool>,
}

impl DatasetStore for CorruptingStore {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        FsStore.read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if path == self.target && !self.corrupted.get() {
            self.corrupted.set(true);
            let mut mangled = bytes.to_vec();
            mangled.truncate(bytes.len() / 2);
            return FsStore.write(path, &mangled);
        }
        FsStore.write(path, bytes)
    }

    fn exists(&self, path: &Path) -> bool {
        FsStore.exists(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        FsStore.remove(path)
    }
}

/// Refuses every write.
struct ReadOnlyStore;

impl DatasetStore for ReadOnlyStore {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        FsStore.read(path)
    }

    fn write(&self, _path: &Path, _bytes: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }

    fn exists(&self, path: &Path) -> bool {
        FsStore.exists(path)
    }

    fn remove(&self, _path: &Path) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }
}

/// Accepts the backup but fails to write the dataset itself.
struct DatasetWriteFails {
    target: PathBuf,
}

impl DatasetStore for DatasetWriteFails {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        FsStore.read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if path == self.target {
            return Err(io::Error::other("disk full"));
        }
        FsStore.write(path, bytes)
    }

    fn exists(&self, path: &Path) -> bool {
        FsStore.exists(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        FsStore.remove(path)
    }
}

#[test]
fn end_to_end_scoped_update() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_dataset(dir.path(), COUNTRIES);
    let batch = parse_batch(r#"{"USA": {"life_expectancy": 79.1}}"#, BatchMode::Auto)
        .expect("batch should parse");

    let outcome = Patcher::new()
        .run(&path, &batch.edits, RunOptions::default())
        .expect("run should succeed");

    assert_eq!(outcome.state, RunState::Written);
    assert_eq!(
        fs::read_to_string(&path).expect("dataset readable"),
        r#"{"USA": {"life_expectancy": 79.1}, "CAN": {"life_expectancy": 82.1}}"#
    );
    assert_eq!(outcome.report.requested, 1);
    assert_eq!(outcome.report.matched, 1);
    assert_eq!(outcome.backup_path, Some(backup_path_for(&path)));
    assert_eq!(
        fs::read_to_string(backup_path_for(&path)).expect("backup readable"),
        COUNTRIES
    );
    outcome.ensure_written().expect("written run is not an error");
}

#[test]
fn reapplying_an_edit_finds_the_updated_value() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_dataset(dir.path(), COUNTRIES);
    let edits = [EditRequest::scoped("USA", "life_expectancy", 79.1)];
    let patcher = Patcher::new();

    patcher
        .run(&path, &edits, RunOptions::default())
        .expect("first run");
    let after_first = fs::read(&path).expect("dataset readable");
    let second = patcher
        .run(&path, &edits, RunOptions::default())
        .expect("second run");

    assert_eq!(second.report.results[0].occurrences, 1);
    assert_eq!(second.report.results[0].previous.as_deref(), Some("79.1"));
    assert_eq!(fs::read(&path).expect("dataset readable"), after_first);
}

#[test]
fn no_op_edit_leaves_file_byte_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let original = "window.DATA = {\n    '001': { name: 'USA', gdp: 21427700 }, // big\n};\n";
    let path = write_dataset(dir.path(), original);

    let outcome = Patcher::new()
        .run(
            &path,
            &[EditRequest::scoped("001", "gdp", 21427700i64)],
            RunOptions::default(),
        )
        .expect("run should succeed");

    assert_eq!(outcome.report.results[0].occurrences, 1);
    assert_eq!(fs::read_to_string(&path).expect("dataset readable"), original);
}

#[test]
fn batch_numbers_are_written_as_spelled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let original = "{\n  '001': { life_expectancy: 78.50, area: 1e2, big: 12345678901234567890123 }\n}\n";
    let path = write_dataset(dir.path(), original);
    let batch = parse_batch(
        r#"{"001": {"life_expectancy": 78.50, "area": 1e2, "big": 12345678901234567890123}}"#,
        BatchMode::Auto,
    )
    .expect("batch should parse");

    let outcome = Patcher::new()
        .run(&path, &batch.edits, RunOptions::default())
        .expect("run should succeed");

    assert!(outcome.succeeded());
    assert_eq!(outcome.report.sites_changed, 3);
    assert_eq!(fs::read_to_string(&path).expect("dataset readable"), original);
}

#[test]
fn batch_order_is_preserved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_dataset(dir.path(), r#"{"A": {"x": 1}}"#);

    let outcome = Patcher::new()
        .run(
            &path,
            &[
                EditRequest::scoped("A", "x", 2i64),
                EditRequest::scoped("A", "x", 3i64),
            ],
            RunOptions::default(),
        )
        .expect("run should succeed");

    assert_eq!(
        fs::read_to_string(&path).expect("dataset readable"),
        r#"{"A": {"x": 3}}"#
    );
    assert_eq!(outcome.report.requested, 2);
    assert_eq!(outcome.report.results[1].occurrences, 1);
    assert_eq!(outcome.report.results[1].previous.as_deref(), Some("2"));
}

#[test]
fn unmatched_edit_is_reported_and_dataset_unchanged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_dataset(dir.path(), COUNTRIES);

    let outcome = Patcher::new()
        .run(
            &path,
            &[EditRequest::scoped("MEX", "life_expectancy", 75.0)],
            RunOptions::default(),
        )
        .expect("unmatched edits are not fatal");

    assert_eq!(outcome.state, RunState::Written);
    assert!(!outcome.report.results[0].matched);
    assert_eq!(outcome.report.results[0].occurrences, 0);
    assert_eq!(
        outcome.report.results[0].issues,
        vec![EditIssue::UnmatchedEdit]
    );
    assert_eq!(outcome.report.unmatched, 1);
    assert_eq!(fs::read_to_string(&path).expect("dataset readable"), COUNTRIES);
}

#[test]
fn corrupted_write_is_rolled_back_to_backup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_dataset(dir.path(), COUNTRIES);
    let store = CorruptingStore {
        target: path.clone(),
        corrupted: Cell::new(false),
    };

    let outcome = Patcher::with_store(&store)
        .run(
            &path,
            &[EditRequest::scoped("USA", "life_expectancy", 79.1)],
            RunOptions::default(),
        )
        .expect("rollback is reported through the outcome");

    assert_eq!(outcome.state, RunState::RolledBack);
    assert!(!outcome.succeeded());
    let err = outcome.ensure_written().expect_err("rolled back run");
    assert_eq!(err.code, PatchErrorCode::VerifyFailed);
    assert_eq!(
        fs::read(&path).expect("dataset readable"),
        fs::read(backup_path_for(&path)).expect("backup readable")
    );
}

#[test]
fn backup_failure_stops_before_any_edit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_dataset(dir.path(), COUNTRIES);

    let err = Patcher::with_store(ReadOnlyStore)
        .run(
            &path,
            &[EditRequest::scoped("USA", "life_expectancy", 79.1)],
            RunOptions::default(),
        )
        .expect_err("backup must be written first");

    assert_eq!(err.code, PatchErrorCode::BackupFailed);
    assert_eq!(fs::read_to_string(&path).expect("dataset readable"), COUNTRIES);
}

#[test]
fn write_failure_keeps_backup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_dataset(dir.path(), COUNTRIES);
    let store = DatasetWriteFails {
        target: path.clone(),
    };

    let err = Patcher::with_store(&store)
        .run(
            &path,
            &[EditRequest::scoped("USA", "life_expectancy", 79.1)],
            RunOptions {
                clear_backup: true,
                ..RunOptions::default()
            },
        )
        .expect_err("write must fail");

    assert_eq!(err.code, PatchErrorCode::Io);
    assert_eq!(
        fs::read_to_string(backup_path_for(&path)).expect("backup kept"),
        COUNTRIES
    );
}

#[test]
fn missing_dataset_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Patcher::new()
        .run(&dir.path().join("absent.js"), &[], RunOptions::default())
        .expect_err("dataset is missing");
    assert_eq!(err.code, PatchErrorCode::Io);
    assert!(err.message.contains("absent.js"));
}

#[test]
fn dry_run_touches_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_dataset(dir.path(), COUNTRIES);

    let outcome = Patcher::new()
        .run(
            &path,
            &[EditRequest::scoped("USA", "life_expectancy", 79.1)],
            RunOptions {
                dry_run: true,
                ..RunOptions::default()
            },
        )
        .expect("dry run should succeed");

    assert_eq!(outcome.state, RunState::Verified);
    assert_eq!(outcome.report.sites_changed, 1);
    assert!(outcome.backup_path.is_none());
    assert!(!backup_path_for(&path).exists());
    assert_eq!(fs::read_to_string(&path).expect("dataset readable"), COUNTRIES);
}

#[test]
fn clear_backup_removes_it_after_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_dataset(dir.path(), COUNTRIES);

    let outcome = Patcher::new()
        .run(
            &path,
            &[EditRequest::scoped("CAN", "life_expectancy", 82.3)],
            RunOptions {
                clear_backup: true,
                ..RunOptions::default()
            },
        )
        .expect("run should succeed");

    assert_eq!(outcome.state, RunState::Written);
    assert!(outcome.backup_path.is_none());
    assert!(!backup_path_for(&path).exists());
}

#[test]
fn mass_mode_rewrites_every_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_dataset(
        dir.path(),
        "{\n  A: { unit: 'km', x: 1 },\n  B: { unit: 'km', x: 2 }\n}\n",
    );
    let batch = parse_batch(r#"{"unit": "mi"}"#, BatchMode::Auto).expect("batch should parse");

    let outcome = Patcher::new()
        .run(&path, &batch.edits, RunOptions::default())
        .expect("run should succeed");

    assert_eq!(outcome.report.sites_changed, 2);
    assert_eq!(
        fs::read_to_string(&path).expect("dataset readable"),
        "{\n  A: { unit: 'mi', x: 1 },\n  B: { unit: 'mi', x: 2 }\n}\n"
    );
}

#[test]
fn run_state_rejects_skipping_the_backup() {
    let mut run = PatchRun::new();
    let err = run
        .advance(RunState::Edited)
        .expect_err("edits need a backup first");
    assert_eq!(err.code, PatchErrorCode::InvalidTransition);
    run.advance(RunState::BackedUp).expect("idle -> backed up");
    assert_eq!(run.state(), RunState::BackedUp);
}
