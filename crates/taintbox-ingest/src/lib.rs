//! # taintbox-ingest
//!
//! Refreshes the external payload corpus from structured remote sources.
//!
//! Handles:
//! - **Source**: The manifest of `ExternalSourceSpec` entries and their extraction rules.
//! - **Fetch**: Bounded-timeout retrieval of raw bytes (`http(s)://`, `file://`).
//! - **Extract**: JSON array and CSV parsing, field selection, `{{name}}` templates.
//! - **Pipeline**: Per-source shuffle/limit, global dedup, global cap, id and carrier assignment.
//! - **Suite**: Persisting the generated cases as a suite file.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod source;
pub mod suite;

pub use pipeline::{IngestOptions, IngestReport, SourceFailure, ingest};
