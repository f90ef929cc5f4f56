use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use assert_matches::assert_matches;

use ecmwf_retrieve::assemble::{Concatenator, assemble, select_chunks};
use ecmwf_retrieve::domain::Session;
use ecmwf_retrieve::error::RetrieveError;

/// Byte-wise concatenation standing in for the NetCDF tool.
#[derive(Default)]
struct CatConcatenator {
    calls: Mutex<Vec<Vec<PathBuf>>>,
}

impl Concatenator for CatConcatenator {
    fn run(&self, inputs: &[PathBuf], output: &Path) -> Result<(), RetrieveError> {
        self.calls.lock().unwrap().push(inputs.to_vec());
        let mut content = Vec::new();
        for input in inputs {
            content.extend(fs::read(input).map_err(|err| RetrieveError::Filesystem(err.to_string()))?);
        }
        fs::write(output, content).map_err(|err| RetrieveError::Filesystem(err.to_string()))
    }
}

struct FailingConcatenator;

impl Concatenator for FailingConcatenator {
    fn run(&self, _inputs: &[PathBuf], _output: &Path) -> Result<(), RetrieveError> {
        Err(RetrieveError::Concatenation("schema mismatch".to_string()))
    }
}

fn session(value: &str) -> Session {
    value.parse().unwrap()
}

fn write_chunks(dir: &Path, session: &str, count: usize) {
    // Written in reverse so directory order is unlikely to match chunk order.
    for index in (0..count).rev() {
        let name = format!("era_{index:03}__{session}_.nc");
        fs::write(dir.join(name), format!("[{index}]")).unwrap();
    }
}

#[test]
fn selects_only_the_session_chunks_in_order() {
    let temp = tempfile::tempdir().unwrap();
    write_chunks(temp.path(), "run-a", 3);
    write_chunks(temp.path(), "run-b", 2);
    fs::write(temp.path().join("notes.txt"), "x").unwrap();

    let chunks = select_chunks(temp.path(), "era.nc", Some(&session("run-a"))).unwrap();
    let names = chunks
        .iter()
        .map(|path| path.file_name().unwrap().to_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        [
            "era_000__run-a_.nc",
            "era_001__run-a_.nc",
            "era_002__run-a_.nc",
        ]
    );
}

#[test]
fn session_tag_does_not_match_prefixes() {
    let temp = tempfile::tempdir().unwrap();
    write_chunks(temp.path(), "run-1", 1);
    write_chunks(temp.path(), "run-10", 1);

    let chunks = select_chunks(temp.path(), "era.nc", Some(&session("run-1"))).unwrap();
    assert_eq!(chunks.len(), 1);
}

#[test]
fn assembles_and_removes_chunks() {
    let temp = tempfile::tempdir().unwrap();
    write_chunks(temp.path(), "run-a", 4);
    write_chunks(temp.path(), "run-b", 1);
    let concatenator = CatConcatenator::default();

    let report = assemble(
        &concatenator,
        temp.path(),
        "era.nc",
        Some(&session("run-a")),
        true,
    )
    .unwrap();

    assert_eq!(report.output, temp.path().join("era.nc"));
    assert_eq!(report.deleted, 4);
    assert_eq!(
        fs::read_to_string(temp.path().join("era.nc")).unwrap(),
        "[0][1][2][3]"
    );
    assert!(!temp.path().join("era_000__run-a_.nc").exists());
    assert!(temp.path().join("era_000__run-b_.nc").exists());
}

#[test]
fn failed_concatenation_keeps_chunks() {
    let temp = tempfile::tempdir().unwrap();
    write_chunks(temp.path(), "run-a", 2);

    let err = assemble(
        &FailingConcatenator,
        temp.path(),
        "era.nc",
        Some(&session("run-a")),
        true,
    )
    .unwrap_err();

    assert_matches!(err, RetrieveError::Concatenation(_));
    assert!(!temp.path().join("era.nc").exists());
    assert!(temp.path().join("era_000__run-a_.nc").exists());
    assert!(temp.path().join("era_001__run-a_.nc").exists());
    let leftovers = fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(leftovers, 2);
}

#[test]
fn reassembly_without_deletion_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    write_chunks(temp.path(), "run-a", 3);
    let concatenator = CatConcatenator::default();
    let run = session("run-a");

    assemble(&concatenator, temp.path(), "era.nc", Some(&run), false).unwrap();
    let first = fs::read(temp.path().join("era.nc")).unwrap();
    assemble(&concatenator, temp.path(), "era.nc", Some(&run), false).unwrap();
    let second = fs::read(temp.path().join("era.nc")).unwrap();

    assert_eq!(first, second);
    let calls = concatenator.calls.lock().unwrap();
    assert_eq!(calls[0], calls[1]);
}

#[test]
fn without_session_the_output_is_not_an_input() {
    let temp = tempfile::tempdir().unwrap();
    write_chunks(temp.path(), "run-a", 2);
    fs::write(temp.path().join("era.nc"), "old").unwrap();
    let concatenator = CatConcatenator::default();

    let report = assemble(&concatenator, temp.path(), "era.nc", None, false).unwrap();

    assert_eq!(report.inputs.len(), 2);
    assert_eq!(
        fs::read_to_string(temp.path().join("era.nc")).unwrap(),
        "[0][1]"
    );
}

#[test]
fn empty_selection_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let concatenator = CatConcatenator::default();

    let err = assemble(
        &concatenator,
        temp.path(),
        "era.nc",
        Some(&session("run-a")),
        true,
    )
    .unwrap_err();

    assert_matches!(err, RetrieveError::NoChunks(_));
    assert!(concatenator.calls.lock().unwrap().is_empty());
}
