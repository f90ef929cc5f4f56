use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RetrieveError {
    #[error("wrong type: {0}")]
    Type(String),

    #[error("unexpected date format: {0}")]
    Format(String),

    #[error("date out of range: {0}")]
    Range(String),

    #[error("request is missing the `{0}` field")]
    MissingField(String),

    #[error("target must be a plain file name: {0}")]
    InvalidTarget(String),

    #[error("invalid session identifier: {0}")]
    InvalidSession(String),

    #[error("invalid request override (expected key=value): {0}")]
    InvalidOverride(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing ECMWF API credentials: {0}")]
    #[diagnostic(help(
        "set ECMWF_API_URL, ECMWF_API_KEY and ECMWF_API_EMAIL or create ~/.ecmwfapirc"
    ))]
    MissingCredentials(String),

    #[error("ECMWF request failed: {0}")]
    ArchiveHttp(String),

    #[error("ECMWF returned status {status}: {message}")]
    ArchiveStatus { status: u16, message: String },

    #[error("ECMWF request aborted: {0}")]
    Archive(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("concatenation failed: {0}")]
    Concatenation(String),

    #[error("no chunk files to assemble in {0}")]
    NoChunks(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
