//! Formatted output helpers for CLI commands.
//!
//! Human-readable run and ingestion summaries printed to stderr after the
//! machine-readable result has been written.

use std::fmt::Write as _;

use taintbox_build::runlist::{EntryStatus, RunlistDocument};
use taintbox_ingest::IngestReport;

const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

const fn status_marker(status: EntryStatus) -> (&'static str, &'static str) {
    match status {
        EntryStatus::Built => (GREEN, "built"),
        EntryStatus::Pushed => (GREEN, "pushed"),
        EntryStatus::BuildFailed => (RED, "build failed"),
        EntryStatus::PushFailed => (RED, "push failed"),
    }
}

/// One line per image, then the totals.
#[must_use]
pub fn format_run_summary(doc: &RunlistDocument) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{BOLD}{} run {}{RESET}", doc.suite_name, doc.run_id);
    for entry in &doc.images {
        let (color, label) = status_marker(entry.status);
        let _ = writeln!(out, "  {color}{label:<12}{RESET} {}  {}", entry.case_id, entry.image);
    }
    for skipped in &doc.skipped {
        let _ = writeln!(
            out,
            "  {YELLOW}{:<12}{RESET} {}  {}",
            "skipped", skipped.case_id, skipped.message
        );
    }

    let s = &doc.summary;
    let _ = writeln!(
        out,
        "{} attempted, {} built, {} pushed, {} build failed, {} push failed, {} skipped, {} rejected",
        s.attempted, s.built, s.pushed, s.build_failed, s.push_failed, s.skipped, s.rejected
    );
    if doc.cancelled {
        let _ = writeln!(out, "{YELLOW}run cancelled{RESET}");
    }
    out
}

/// Per-source counts and failures of an ingestion run.
#[must_use]
pub fn format_ingest_report(report: &IngestReport) -> String {
    let mut out = String::new();
    for source in &report.sources {
        let _ = writeln!(
            out,
            "  {GREEN}{:<24}{RESET} {} extracted, {} kept",
            source.source_id, source.extracted, source.kept
        );
    }
    for failure in &report.failures {
        let _ = writeln!(
            out,
            "  {RED}{:<24}{RESET} {}: {}",
            failure.source_id, failure.kind, failure.message
        );
    }
    if report.duplicates > 0 || report.skipped_records > 0 {
        let _ = writeln!(
            out,
            "{} duplicates dropped, {} records without payload",
            report.duplicates, report.skipped_records
        );
    }
    out
}
