//! External prompt source manifest.
//!
//! A manifest is either a JSON array of source specs or an object with a
//! `sources` array. Each entry is checked on its own; a malformed entry is
//! rejected without affecting its siblings.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taintbox_common::error::{ErrorKind, Result, TaintboxError};

/// Body format of a remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// A JSON array of objects.
    Json,
    /// A CSV document with a header row.
    Csv,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Csv => f.write_str("csv"),
        }
    }
}

/// One remote dataset to pull payloads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSourceSpec {
    /// Stable identifier of the source.
    pub id: String,
    /// How to parse the fetched body.
    pub format: SourceFormat,
    /// Where to fetch the body from.
    pub url: String,
    /// Record attribute holding the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// `{{name}}` template composed from record attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Maximum number of payloads taken from this source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Shuffle this source's payloads before applying `limit`.
    #[serde(default)]
    pub shuffle: bool,
}

/// How a payload string is pulled out of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule<'a> {
    /// Read a single named attribute.
    Field(&'a str),
    /// Render a `{{name}}` template against the record.
    Template(&'a str),
}

impl ExternalSourceSpec {
    /// Returns the extraction rule of this source.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Schema` unless exactly one of `field` or
    /// `template` is set to a non-empty value.
    pub fn rule(&self) -> Result<ExtractionRule<'_>> {
        let field = self.field.as_deref().filter(|f| !f.trim().is_empty());
        let template = self.template.as_deref().filter(|t| !t.trim().is_empty());
        match (field, template) {
            (Some(f), None) => Ok(ExtractionRule::Field(f)),
            (None, Some(t)) => Ok(ExtractionRule::Template(t)),
            (None, None) => Err(TaintboxError::schema(
                format!("source {}", self.id),
                "set either 'field' or 'template'",
            )),
            (Some(_), Some(_)) => Err(TaintboxError::schema(
                format!("source {}", self.id),
                "'field' and 'template' are mutually exclusive",
            )),
        }
    }
}

/// A source that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    /// Identifier of the skipped source.
    pub source_id: String,
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Human-readable failure description.
    pub message: String,
}

impl SourceFailure {
    /// Records `err` against `source_id`.
    #[must_use]
    pub fn new(source_id: impl Into<String>, err: &TaintboxError) -> Self {
        Self {
            source_id: source_id.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Parsed manifest: the usable sources plus the rejected entries.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Entries that deserialized cleanly, in manifest order.
    pub sources: Vec<ExternalSourceSpec>,
    /// Entries that did not.
    pub rejected: Vec<SourceFailure>,
}

impl Manifest {
    /// Keeps only the source with the given id.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Config` if no source has that id.
    pub fn select(mut self, source_id: &str) -> Result<Self> {
        self.sources.retain(|s| s.id == source_id);
        if self.sources.is_empty() {
            return Err(TaintboxError::config(format!(
                "source id not found in manifest: {source_id}"
            )));
        }
        Ok(self)
    }
}

/// Loads and parses a manifest file.
///
/// # Errors
///
/// Returns `TaintboxError::Config` if the file cannot be read, is not JSON,
/// or has neither a top-level array nor a `sources` array.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TaintboxError::config(format!("cannot read manifest {}: {e}", path.display()))
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        TaintboxError::config(format!("malformed manifest {}: {e}", path.display()))
    })?;
    let manifest = parse_manifest(value)?;
    tracing::info!(
        path = %path.display(),
        sources = manifest.sources.len(),
        rejected = manifest.rejected.len(),
        "loaded prompt manifest"
    );
    Ok(manifest)
}

/// Parses an already-decoded manifest document.
///
/// # Errors
///
/// Returns `TaintboxError::Config` if the document shape is wrong.
pub fn parse_manifest(value: Value) -> Result<Manifest> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("sources") {
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(TaintboxError::config("manifest: 'sources' must be an array"));
            }
            None => {
                return Err(TaintboxError::config("manifest object has no 'sources' array"));
            }
        },
        _ => return Err(TaintboxError::config("manifest must be an array or an object")),
    };

    let mut manifest = Manifest::default();
    for (idx, entry) in entries.into_iter().enumerate() {
        let label = entry
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| format!("#{idx}"), str::to_string);
        match serde_json::from_value::<ExternalSourceSpec>(entry) {
            Ok(spec) => manifest.sources.push(spec),
            Err(e) => {
                let err = TaintboxError::schema(format!("source {label}"), e.to_string());
                tracing::warn!(source_id = %label, error = %err, "rejecting manifest entry");
                manifest.rejected.push(SourceFailure::new(label, &err));
            }
        }
    }
    Ok(manifest)
}
