use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assemble::ConcatTool;
use crate::domain::{DatasetTemplate, RequestSpec};
use crate::error::RetrieveError;

pub const DEFAULT_CONFIG_FILE: &str = "ecmwf-retrieve.json";
pub const DEFAULT_API_URL: &str = "https://api.ecmwf.int/v1";
pub const RC_FILE: &str = ".ecmwfapirc";

/// On-disk job description; every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub template: Option<DatasetTemplate>,
    #[serde(default)]
    pub request: Option<Value>,
    #[serde(default)]
    pub delete_parts: Option<bool>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub concatenator: Option<ConcatTool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub template: DatasetTemplate,
    pub overrides: RequestSpec,
    pub delete_parts: bool,
    pub output_dir: PathBuf,
    pub concatenator: ConcatTool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the job file. Without an explicit path a missing
    /// `ecmwf-retrieve.json` simply yields the built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RetrieveError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RetrieveError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RetrieveError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, RetrieveError> {
        let overrides = match &config.request {
            Some(value) => RequestSpec::from_json(value)?,
            None => RequestSpec::new(),
        };

        Ok(ResolvedConfig {
            template: config.template.unwrap_or_default(),
            overrides,
            delete_parts: config.delete_parts.unwrap_or(true),
            output_dir: config.output_dir.unwrap_or_else(|| PathBuf::from(".")),
            concatenator: config.concatenator.unwrap_or_default(),
        })
    }
}

/// Web API access key, as issued on the ECMWF account page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiCredentials {
    #[serde(default = "default_api_url")]
    pub url: String,
    pub key: String,
    pub email: String,
}

impl ApiCredentials {
    /// Environment first, then `~/.ecmwfapirc`.
    pub fn load() -> Result<Self, RetrieveError> {
        if let Some(credentials) = Self::from_env() {
            return Ok(credentials);
        }
        let path = Self::rc_path().ok_or_else(|| {
            RetrieveError::MissingCredentials("unable to resolve home directory".to_string())
        })?;
        if !path.exists() {
            return Err(RetrieveError::MissingCredentials(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Self::from_rc_file(&path)
    }

    pub fn from_env() -> Option<Self> {
        let key = std::env::var("ECMWF_API_KEY").ok()?;
        let email = std::env::var("ECMWF_API_EMAIL").ok()?;
        let url = std::env::var("ECMWF_API_URL").unwrap_or_else(|_| default_api_url());
        Some(Self { url, key, email })
    }

    pub fn from_rc_file(path: &Path) -> Result<Self, RetrieveError> {
        let content = fs::read_to_string(path)
            .map_err(|_| RetrieveError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| {
            RetrieveError::MissingCredentials(format!("{}: {err}", path.display()))
        })
    }

    pub fn rc_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(RC_FILE))
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
