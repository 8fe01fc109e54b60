//! The run manifest.
//!
//! One document per run, named `runlist_<suite>_<timestamp>.json`, written
//! once after every case has been processed or abandoned. An existing
//! runlist is never overwritten.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use taintbox_common::config::ContainerCli;
use taintbox_common::constants::PAYLOAD_PREVIEW_CHARS;
use taintbox_common::error::{ErrorKind, Result, TaintboxError};
use taintbox_common::types::{Carrier, sanitize_component};
use taintbox_ingest::SourceFailure;
use taintbox_mutate::suite::RejectedRecord;
use uuid::Uuid;

/// Outcome of a build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Built; push not requested.
    Built,
    /// Built and pushed.
    Pushed,
    /// The build failed.
    BuildFailed,
    /// Built, but the push failed.
    PushFailed,
}

/// Error attached to a failed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryError {
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Tool output or error text.
    pub message: String,
}

impl From<&TaintboxError> for EntryError {
    fn from(err: &TaintboxError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One attempted build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunEntry {
    /// Case id after merging and expansion.
    pub case_id: String,
    /// Carrier the payload was embedded with.
    pub carrier: Carrier,
    /// Full image reference.
    pub image: String,
    /// Tag part of the reference.
    pub image_tag: String,
    /// Whether the tag had to be rewritten to fit the tag grammar.
    pub tag_sanitized: bool,
    /// Canary marker of the case.
    pub canary: String,
    /// File path for file-carrier cases.
    pub path: Option<String>,
    /// Truncated payload.
    pub payload_preview: String,
    /// Container CLI used.
    pub tool: String,
    /// Number of inline-ingested cases appended to this run.
    pub external_appended_count: usize,
    /// What happened.
    pub status: EntryStatus,
    /// Set when `status` is a failure.
    pub error: Option<EntryError>,
}

impl RunEntry {
    /// Whether the attempt failed.
    #[must_use]
    pub const fn failed(&self) -> bool {
        matches!(self.status, EntryStatus::BuildFailed | EntryStatus::PushFailed)
    }
}

/// A case that was never handed to the container tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCase {
    /// Case id.
    pub case_id: String,
    /// Carrier of the case.
    pub carrier: Carrier,
    /// Why it was skipped.
    pub kind: ErrorKind,
    /// Error text.
    pub message: String,
}

/// Aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Build attempts.
    pub attempted: usize,
    /// Images built (pushed or not).
    pub built: usize,
    /// Images pushed.
    pub pushed: usize,
    /// Failed builds.
    pub build_failed: usize,
    /// Failed pushes.
    pub push_failed: usize,
    /// Cases never attempted.
    pub skipped: usize,
    /// Records rejected before expansion finished.
    pub rejected: usize,
}

impl RunSummary {
    /// Tallies the counters.
    #[must_use]
    pub fn tally(entries: &[RunEntry], skipped: usize, rejected: usize) -> Self {
        let count = |status| entries.iter().filter(|e| e.status == status).count();
        let push_failed = count(EntryStatus::PushFailed);
        Self {
            attempted: entries.len(),
            built: count(EntryStatus::Built) + count(EntryStatus::Pushed) + push_failed,
            pushed: count(EntryStatus::Pushed),
            build_failed: count(EntryStatus::BuildFailed),
            push_failed,
            skipped,
            rejected,
        }
    }

    /// Whether anything failed, was skipped, or was rejected.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.build_failed + self.push_failed + self.skipped + self.rejected > 0
    }
}

/// The whole run manifest.
#[derive(Debug, Clone, Serialize)]
pub struct RunlistDocument {
    /// Random identifier of this run.
    pub run_id: Uuid,
    /// Run timestamp, formatted with the configured pattern.
    pub generated_at_utc: String,
    /// Image every mutation started from.
    pub base_image: String,
    /// Registry host.
    pub registry: String,
    /// Repository namespace.
    pub repo: String,
    /// Image name.
    pub image_name: String,
    /// Path of the basic suite.
    pub suite: String,
    /// Name of the basic suite.
    pub suite_name: String,
    /// Path of the merged external suite, if included.
    pub external_suite: Option<String>,
    /// Cases taken from the external suite file.
    pub external_suite_cases_count: usize,
    /// Cases ingested inline from the prompt manifest.
    pub external_cases_count: usize,
    /// Container CLI used.
    pub container_cli: ContainerCli,
    /// Arguments placed before every subcommand.
    pub container_cli_args: Vec<String>,
    /// Whether the registry was treated as insecure.
    pub insecure_registry: bool,
    /// Whether pushing was requested.
    pub push: bool,
    /// One entry per build attempt, in processing order.
    pub images: Vec<RunEntry>,
    /// Cases never attempted.
    pub skipped: Vec<SkippedCase>,
    /// Records rejected while loading, merging, or expanding.
    pub rejected: Vec<RejectedRecord>,
    /// Prompt sources that failed during inline ingestion.
    pub ingest_failures: Vec<SourceFailure>,
    /// Aggregate counters.
    pub summary: RunSummary,
    /// Whether the run was interrupted.
    pub cancelled: bool,
}

/// Truncates a payload to the preview length, counting characters.
#[must_use]
pub fn payload_preview(payload: &str) -> String {
    let mut chars = payload.char_indices();
    match chars.nth(PAYLOAD_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &payload[..cut]),
        None => payload.to_string(),
    }
}

/// Location of the runlist for a suite and run timestamp.
#[must_use]
pub fn runlist_path(outdir: &Path, suite_name: &str, timestamp: &str) -> PathBuf {
    outdir.join(format!(
        "runlist_{}_{}.json",
        sanitize_component(suite_name),
        sanitize_component(timestamp)
    ))
}

/// Writes the runlist to `path`.
///
/// # Errors
///
/// Returns `TaintboxError::Io` if the file already exists or cannot be written.
pub fn write_runlist(path: &Path, document: &RunlistDocument) -> Result<()> {
    let json = serde_json::to_string_pretty(document)?;
    let io_err = |e| TaintboxError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(json.as_bytes()).map_err(io_err)?;
    file.write_all(b"\n").map_err(io_err)?;
    tracing::info!(path = %path.display(), images = document.images.len(), "wrote runlist");
    Ok(())
}
