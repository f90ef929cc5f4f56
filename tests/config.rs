use std::fs;
use std::path::PathBuf;

use assert_matches::assert_matches;

use ecmwf_retrieve::assemble::ConcatTool;
use ecmwf_retrieve::config::{ApiCredentials, ConfigLoader, DEFAULT_API_URL};
use ecmwf_retrieve::domain::DatasetTemplate;
use ecmwf_retrieve::error::RetrieveError;

#[test]
fn job_file_is_loaded() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("job.json");
    fs::write(
        &path,
        r#"{
            "template": "cera-20c",
            "request": { "param": "tp", "target": "precip.nc" },
            "delete_parts": false,
            "output_dir": "/data/reanalysis",
            "concatenator": "cdo"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();

    assert_eq!(resolved.template, DatasetTemplate::Cera20c);
    assert_eq!(resolved.overrides.get("param"), Some("tp"));
    assert_eq!(resolved.overrides.get("target"), Some("precip.nc"));
    assert!(!resolved.delete_parts);
    assert_eq!(resolved.output_dir, PathBuf::from("/data/reanalysis"));
    assert_eq!(resolved.concatenator, ConcatTool::Cdo);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, RetrieveError::ConfigRead(p) if p == path);
}

#[test]
fn malformed_job_file_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("job.json");
    fs::write(&path, "{ \"template\": ").unwrap();
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, RetrieveError::ConfigParse(_));
}

#[test]
fn non_string_request_value_is_a_type_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("job.json");
    fs::write(&path, r#"{ "request": { "date": 1979 } }"#).unwrap();
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, RetrieveError::Type(_));
}

#[test]
fn rc_file_without_url_uses_public_endpoint() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join(".ecmwfapirc");
    fs::write(
        &path,
        r#"{ "key": "0123456789abcdef", "email": "someone@example.org" }"#,
    )
    .unwrap();

    let credentials = ApiCredentials::from_rc_file(&path).unwrap();

    assert_eq!(credentials.url, DEFAULT_API_URL);
    assert_eq!(credentials.key, "0123456789abcdef");
    assert_eq!(credentials.email, "someone@example.org");
}

#[test]
fn rc_file_without_key_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join(".ecmwfapirc");
    fs::write(&path, r#"{ "email": "someone@example.org" }"#).unwrap();
    let err = ApiCredentials::from_rc_file(&path).unwrap_err();
    assert_matches!(err, RetrieveError::MissingCredentials(_));
}
