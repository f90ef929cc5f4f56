use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::Session;
use crate::error::RetrieveError;

const CHUNK_MARKER: &str = ".nc";

static CHUNK_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d{3,})_").expect("static regex"));

/// Merges NetCDF files along their record dimension.
pub trait Concatenator {
    fn run(&self, inputs: &[PathBuf], output: &Path) -> Result<(), RetrieveError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConcatTool {
    /// NCO record concatenator.
    #[default]
    Ncrcat,
    /// Climate Data Operators, `mergetime`.
    Cdo,
}

impl ConcatTool {
    pub fn program(self) -> &'static str {
        match self {
            ConcatTool::Ncrcat => "ncrcat",
            ConcatTool::Cdo => "cdo",
        }
    }

    fn leading_args(self) -> Vec<String> {
        match self {
            ConcatTool::Ncrcat => vec!["-O".to_string()],
            ConcatTool::Cdo => vec!["-O".to_string(), "mergetime".to_string()],
        }
    }
}

/// Runs an external NetCDF tool: `<program> <args...> <inputs...> <output>`.
#[derive(Debug, Clone)]
pub struct CommandConcatenator {
    program: Option<PathBuf>,
    name: String,
    leading_args: Vec<String>,
}

impl CommandConcatenator {
    pub fn new(tool: ConcatTool) -> Self {
        Self {
            program: find_in_path(tool.program()),
            name: tool.program().to_string(),
            leading_args: tool.leading_args(),
        }
    }

    pub fn with_program(program: PathBuf, leading_args: Vec<String>) -> Self {
        let name = program.display().to_string();
        Self {
            program: Some(program),
            name,
            leading_args,
        }
    }

    pub fn is_available(&self) -> bool {
        self.program.is_some()
    }
}

impl Concatenator for CommandConcatenator {
    fn run(&self, inputs: &[PathBuf], output: &Path) -> Result<(), RetrieveError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| RetrieveError::MissingTool(self.name.clone()))?;
        let output = Command::new(program)
            .args(&self.leading_args)
            .args(inputs)
            .arg(output)
            .output()
            .map_err(|err| RetrieveError::Concatenation(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("{} exited with {}", self.name, output.status)
        } else {
            stderr
        };
        Err(RetrieveError::Concatenation(message))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssembleReport {
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub deleted: usize,
}

/// Chunk files of `dir` that belong to `session`, in chunk order.
///
/// Without a session every `.nc` file except `output_name` qualifies.
pub fn select_chunks(
    dir: &Path,
    output_name: &str,
    session: Option<&Session>,
) -> Result<Vec<PathBuf>, RetrieveError> {
    let tag = session.map(Session::file_tag);
    let entries = fs::read_dir(dir)
        .map_err(|err| RetrieveError::Filesystem(format!("read {}: {err}", dir.display())))?;

    let mut chunks = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let selected = name.contains(CHUNK_MARKER)
            && name != output_name
            && tag.as_deref().map(|tag| name.contains(tag)).unwrap_or(true);
        if selected {
            chunks.push((chunk_index(name), name.to_string(), path));
        }
    }

    chunks.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    Ok(chunks.into_iter().map(|(_, _, path)| path).collect())
}

/// Concatenates the chunks of one run into `dir/output_name`.
///
/// The tool writes to a temporary file first; the output appears and the
/// chunks are removed only once it has succeeded.
pub fn assemble<K: Concatenator + ?Sized>(
    concatenator: &K,
    dir: &Path,
    output_name: &str,
    session: Option<&Session>,
    delete_parts: bool,
) -> Result<AssembleReport, RetrieveError> {
    if session.is_none() {
        warn!(dir = %dir.display(), "assembling without a session; every .nc file is a candidate");
    }
    let inputs = select_chunks(dir, output_name, session)?;
    if inputs.is_empty() {
        return Err(RetrieveError::NoChunks(dir.to_path_buf()));
    }

    let output = dir.join(output_name);
    info!(chunks = inputs.len(), output = %output.display(), "concatenating chunks");

    let temp = tempfile::Builder::new()
        .prefix(".assemble-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|err| RetrieveError::Filesystem(err.to_string()))?
        .into_temp_path();
    concatenator.run(&inputs, &temp)?;
    temp.persist(&output)
        .map_err(|err| RetrieveError::Filesystem(err.to_string()))?;

    let mut deleted = 0;
    if delete_parts {
        for input in &inputs {
            fs::remove_file(input).map_err(|err| {
                RetrieveError::Filesystem(format!("remove {}: {err}", input.display()))
            })?;
            deleted += 1;
        }
    }

    Ok(AssembleReport {
        output,
        inputs,
        deleted,
    })
}

fn chunk_index(name: &str) -> Option<u64> {
    CHUNK_INDEX
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|index| index.as_str().parse().ok())
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
