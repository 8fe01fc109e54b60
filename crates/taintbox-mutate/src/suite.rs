//! Suite loading and merging.
//!
//! A suite file that cannot be read or is not a JSON array aborts the run.
//! Individual records are checked one by one: an invalid record or a
//! duplicate id is rejected and the rest of the suite still loads.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use taintbox_common::error::{ErrorKind, Result, TaintboxError};
use taintbox_common::types::{Case, sanitize_component};

/// A record that did not make it into a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    /// Name of the suite the record came from.
    pub suite: String,
    /// Position of the record in its file, or its id when known.
    pub record: String,
    /// Classification of the rejection.
    pub kind: ErrorKind,
    /// Why it was rejected.
    pub message: String,
}

impl RejectedRecord {
    /// Records `err` against `record` of `suite`.
    pub fn new(suite: &str, record: impl Into<String>, err: &TaintboxError) -> Self {
        Self {
            suite: suite.to_string(),
            record: record.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Cases read from one suite file.
#[derive(Debug, Clone)]
pub struct LoadedSuite {
    /// Tag-safe suite name derived from the file stem.
    pub name: String,
    /// File the suite was read from.
    pub path: PathBuf,
    /// Valid cases in file order.
    pub cases: Vec<Case>,
    /// Records that failed validation.
    pub rejected: Vec<RejectedRecord>,
}

/// Derives the tag-safe suite name from a suite path.
#[must_use]
pub fn suite_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem.is_empty() {
        "suite".into()
    } else {
        sanitize_component(&stem)
    }
}

/// Reads a suite file.
///
/// # Errors
///
/// Returns `TaintboxError::Config` if the file cannot be read, is not
/// JSON, or is not an array.
pub fn load_suite(path: &Path) -> Result<LoadedSuite> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TaintboxError::config(format!("cannot read suite {}: {e}", path.display()))
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        TaintboxError::config(format!("malformed suite {}: {e}", path.display()))
    })?;
    let Value::Array(records) = value else {
        return Err(TaintboxError::config(format!(
            "suite file {} must contain a JSON array of case objects",
            path.display()
        )));
    };

    let name = suite_name(path);
    let suite = parse_records(&name, path, records);
    tracing::info!(
        suite = %suite.name,
        cases = suite.cases.len(),
        rejected = suite.rejected.len(),
        "loaded suite"
    );
    Ok(suite)
}

fn parse_records(name: &str, path: &Path, records: Vec<Value>) -> LoadedSuite {
    let mut suite = LoadedSuite {
        name: name.to_string(),
        path: path.to_path_buf(),
        cases: Vec::with_capacity(records.len()),
        rejected: Vec::new(),
    };
    let mut ids = HashSet::new();

    for (idx, record) in records.into_iter().enumerate() {
        let label = record
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| format!("#{idx}"), str::to_string);
        let parsed = serde_json::from_value::<Case>(record)
            .map_err(|e| TaintboxError::schema(format!("case {label}"), e.to_string()))
            .and_then(Case::validate)
            .and_then(|case| {
                if ids.contains(&case.id) {
                    Err(TaintboxError::schema(
                        format!("case {}", case.id),
                        format!("duplicate id in suite {name}"),
                    ))
                } else {
                    Ok(case)
                }
            });
        match parsed {
            Ok(case) => {
                let _ = ids.insert(case.id.clone());
                suite.cases.push(case);
            }
            Err(err) => {
                tracing::warn!(suite = %name, record = %label, error = %err, "rejecting case");
                suite.rejected.push(RejectedRecord::new(name, label, &err));
            }
        }
    }
    suite
}

/// The concatenation of several suites with ids made unique.
#[derive(Debug, Clone, Default)]
pub struct MergedSuite {
    /// Cases in suite order, then file order.
    pub cases: Vec<Case>,
    /// `(original id, qualified id)` for every renamed case.
    pub renamed: Vec<(String, String)>,
    /// Records rejected while loading or merging.
    pub rejected: Vec<RejectedRecord>,
}

/// Concatenates suites in order.
///
/// A case whose id is already taken by an earlier suite is renamed to
/// `<suite name>.<id>`; if that is taken too the case is rejected.
#[must_use]
pub fn merge_suites(suites: Vec<LoadedSuite>) -> MergedSuite {
    let mut merged = MergedSuite::default();
    let mut ids: HashSet<String> = HashSet::new();

    for suite in suites {
        merged.rejected.extend(suite.rejected);
        for mut case in suite.cases {
            if ids.contains(&case.id) {
                let qualified = format!("{}.{}", suite.name, case.id);
                if ids.contains(&qualified) {
                    let err = TaintboxError::schema(
                        format!("case {}", case.id),
                        format!("id collides across suites even when qualified as {qualified}"),
                    );
                    tracing::warn!(suite = %suite.name, error = %err, "rejecting case");
                    merged.rejected.push(RejectedRecord::new(&suite.name, case.id, &err));
                    continue;
                }
                tracing::warn!(
                    suite = %suite.name,
                    case_id = %case.id,
                    qualified = %qualified,
                    "case id already used by an earlier suite, qualifying"
                );
                merged.renamed.push((case.id.clone(), qualified.clone()));
                case.id = qualified;
            }
            let _ = ids.insert(case.id.clone());
            merged.cases.push(case);
        }
    }
    merged
}
