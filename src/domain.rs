use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::ValueEnum;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::RetrieveError;

pub const DATE_KEY: &str = "date";
pub const TARGET_KEY: &str = "target";
pub const DATASET_KEY: &str = "dataset";

/// One bounded MARS query: keyword/value pairs in insertion order.
///
/// Only `date` and `target` carry meaning here; every other keyword is
/// passed through to the archive untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSpec {
    entries: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Replaces the value of an existing key in place, or appends a new one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn merge(&mut self, overrides: &RequestSpec) {
        for (key, value) in overrides.iter() {
            self.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn date(&self) -> Result<&str, RetrieveError> {
        self.get(DATE_KEY)
            .ok_or_else(|| RetrieveError::MissingField(DATE_KEY.to_string()))
    }

    pub fn target(&self) -> Result<&str, RetrieveError> {
        self.get(TARGET_KEY)
            .ok_or_else(|| RetrieveError::MissingField(TARGET_KEY.to_string()))
    }

    pub fn dataset(&self) -> Result<&str, RetrieveError> {
        self.get(DATASET_KEY)
            .ok_or_else(|| RetrieveError::MissingField(DATASET_KEY.to_string()))
    }

    /// Builds a request from a JSON object whose values are all strings.
    pub fn from_json(value: &Value) -> Result<Self, RetrieveError> {
        let object = value.as_object().ok_or_else(|| {
            RetrieveError::Type(format!("request options must be a mapping, got {value}"))
        })?;
        let mut spec = Self::new();
        for (key, value) in object {
            let text = value.as_str().ok_or_else(|| {
                RetrieveError::Type(format!("value of `{key}` must be a string, got {value}"))
            })?;
            spec.insert(key.as_str(), text);
        }
        Ok(spec)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestSpec {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut spec = Self::new();
        for (key, value) in iter {
            spec.insert(key, value);
        }
        spec
    }
}

impl Serialize for RequestSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Tag shared by every chunk file of one retrieval run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Session(String);

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

impl Session {
    /// Millisecond clock, process id and a process-wide sequence number, so
    /// back-to-back runs never share a tag.
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("{millis}-{}-{seq}", std::process::id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The delimited form embedded in chunk file names.
    pub fn file_tag(&self) -> String {
        format!("_{}_", self.0)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Session {
    type Err = RetrieveError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
        if !is_valid {
            return Err(RetrieveError::InvalidSession(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum DatasetTemplate {
    #[default]
    #[serde(rename = "era-interim")]
    #[value(name = "era-interim")]
    EraInterim,
    #[serde(rename = "cera-20c")]
    #[value(name = "cera-20c")]
    Cera20c,
}

impl DatasetTemplate {
    pub fn defaults(self) -> RequestSpec {
        match self {
            DatasetTemplate::EraInterim => crate::templates::era_interim(),
            DatasetTemplate::Cera20c => crate::templates::cera20c(),
        }
    }
}

impl fmt::Display for DatasetTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetTemplate::EraInterim => write!(f, "era-interim"),
            DatasetTemplate::Cera20c => write!(f, "cera-20c"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut spec: RequestSpec = [("stream", "oper"), ("date", "1979-01-01")]
            .into_iter()
            .collect();
        let previous = spec.insert("stream", "enda");
        spec.insert("expver", "1");

        assert_eq!(previous.as_deref(), Some("oper"));
        assert_eq!(spec.keys().collect::<Vec<_>>(), ["stream", "date", "expver"]);
        assert_eq!(spec.get("stream"), Some("enda"));
    }

    #[test]
    fn from_json_rejects_non_mapping() {
        let err = RequestSpec::from_json(&json!(1979)).unwrap_err();
        assert_matches!(err, RetrieveError::Type(_));
    }

    #[test]
    fn from_json_rejects_non_string_values() {
        let err = RequestSpec::from_json(&json!({ "date": 1979 })).unwrap_err();
        assert_matches!(err, RetrieveError::Type(_));
    }

    #[test]
    fn serializes_in_insertion_order() {
        let spec: RequestSpec = [("target", "x.nc"), ("date", "1979-01-01")]
            .into_iter()
            .collect();
        let text = serde_json::to_string(&spec).unwrap();
        assert_eq!(text, r#"{"target":"x.nc","date":"1979-01-01"}"#);
    }

    #[test]
    fn from_json_keeps_source_order() {
        let value: Value =
            serde_json::from_str(r#"{"target": "x.nc", "step": "0", "area": "60/-10/35/30"}"#)
                .unwrap();
        let spec = RequestSpec::from_json(&value).unwrap();
        assert_eq!(spec.keys().collect::<Vec<_>>(), ["target", "step", "area"]);
    }

    #[test]
    fn generated_sessions_are_distinct() {
        let first = Session::generate();
        let second = Session::generate();
        assert_ne!(first, second);
        assert!(first.as_str().parse::<Session>().is_ok());
    }

    #[test]
    fn session_rejects_separators() {
        let err = "abc_def".parse::<Session>().unwrap_err();
        assert_matches!(err, RetrieveError::InvalidSession(_));
    }
}
