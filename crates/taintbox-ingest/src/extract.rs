//! Payload extraction from fetched source bodies.
//!
//! Bodies are decoded into flat string records (JSON objects or CSV rows
//! keyed by header), then each record yields at most one payload through
//! the source's [`ExtractionRule`].

use std::collections::HashMap;

use serde_json::Value;
use taintbox_common::error::{Result, TaintboxError};

use crate::source::{ExternalSourceSpec, ExtractionRule, SourceFormat};

/// A record flattened to attribute name → text.
pub type Record = HashMap<String, String>;

/// Payloads pulled from one source body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Trimmed, non-empty payloads in record order.
    pub payloads: Vec<String>,
    /// Records that produced no payload.
    pub skipped_records: usize,
}

/// Extracts one payload per usable record of `body`.
///
/// # Errors
///
/// Returns `TaintboxError::Schema` if the source has no valid extraction
/// rule, and `TaintboxError::Parse` if the body is not UTF-8, not valid
/// for its format, or (for JSON) not an array.
pub fn extract_payloads(spec: &ExternalSourceSpec, body: &[u8]) -> Result<Extraction> {
    let rule = spec.rule()?;
    let text = std::str::from_utf8(body).map_err(|e| parse_error(spec, format!("body is not UTF-8: {e}")))?;
    let records = match spec.format {
        SourceFormat::Json => json_records(spec, text)?,
        SourceFormat::Csv => csv_records(spec, text)?,
    };

    let mut extraction = Extraction::default();
    let mut skipped = records.skipped;
    for record in &records.rows {
        match payload_from_record(rule, record) {
            Some(payload) => extraction.payloads.push(payload),
            None => skipped += 1,
        }
    }
    extraction.skipped_records = skipped;
    tracing::debug!(
        source_id = %spec.id,
        payloads = extraction.payloads.len(),
        skipped = extraction.skipped_records,
        "extracted payloads"
    );
    Ok(extraction)
}

/// Applies `rule` to a single record.
///
/// Returns `None` when the field is missing, a placeholder is unresolved,
/// or the result is blank.
#[must_use]
pub fn payload_from_record(rule: ExtractionRule<'_>, record: &Record) -> Option<String> {
    let raw = match rule {
        ExtractionRule::Field(field) => record.get(field)?.clone(),
        ExtractionRule::Template(template) => render_template(template, record)?,
    };
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Renders `{{name}}` placeholders against `record`.
///
/// Returns `None` if any placeholder names a missing attribute. An opening
/// `{{` with no closing `}}` is kept literally.
#[must_use]
pub fn render_template(template: &str, record: &Record) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return Some(out);
        };
        out.push_str(record.get(after[..end].trim())?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Some(out)
}

struct Rows {
    rows: Vec<Record>,
    skipped: usize,
}

fn json_records(spec: &ExternalSourceSpec, text: &str) -> Result<Rows> {
    let value: Value = serde_json::from_str(text).map_err(|e| parse_error(spec, e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(parse_error(spec, "expected JSON array"));
    };

    let mut rows = Rows {
        rows: Vec::with_capacity(items.len()),
        skipped: 0,
    };
    for item in items {
        match item {
            Value::Object(map) => rows.rows.push(
                map.into_iter()
                    .map(|(k, v)| (k, json_text(v)))
                    .collect(),
            ),
            _ => rows.skipped += 1,
        }
    }
    Ok(rows)
}

fn json_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn csv_records(spec: &ExternalSourceSpec, text: &str) -> Result<Rows> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| parse_error(spec, format!("invalid CSV header: {e}")))?
        .clone();

    let mut rows = Rows {
        rows: Vec::new(),
        skipped: 0,
    };
    for result in reader.records() {
        match result {
            Ok(record) => rows.rows.push(
                headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.to_string(), v.to_string()))
                    .collect(),
            ),
            Err(e) => {
                tracing::debug!(source_id = %spec.id, error = %e, "skipping malformed CSV row");
                rows.skipped += 1;
            }
        }
    }
    Ok(rows)
}

fn parse_error(spec: &ExternalSourceSpec, message: impl Into<String>) -> TaintboxError {
    TaintboxError::Parse {
        source_id: spec.id.clone(),
        message: message.into(),
    }
}
