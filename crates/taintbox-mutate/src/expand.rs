//! Carrier expansion.
//!
//! Output order is input order, then `policy.carriers` order within a case.

use std::collections::HashSet;

use taintbox_common::config::Settings;
use taintbox_common::error::TaintboxError;
use taintbox_common::types::{Carrier, Case, fill_path_template, sanitize_component};

use crate::suite::RejectedRecord;

/// How cases are paired with carriers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionPolicy {
    /// Duplicate every case across `carriers`.
    pub enabled: bool,
    /// Carriers used when `enabled`.
    pub carriers: Vec<Carrier>,
    /// File path template for expanded file cases (`{id}`, `{carrier}`).
    pub file_path_template: String,
}

impl ExpansionPolicy {
    /// Derives the policy from run settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enabled: settings.expand_case_to_all_carriers,
            carriers: settings.expand_carriers.clone(),
            file_path_template: settings.expand_file_path_template.clone(),
        }
    }
}

/// Returns the (case, carrier) pairs to render for `case`.
///
/// With expansion disabled the case is returned as is. Otherwise one case
/// per carrier is produced with id `<id>_<carrier>`; file cases get their
/// path from the template.
#[must_use]
pub fn expand(case: Case, policy: &ExpansionPolicy) -> Vec<Case> {
    if !policy.enabled {
        return vec![case];
    }

    let base_id = sanitize_component(&case.id);
    policy
        .carriers
        .iter()
        .map(|&carrier| {
            let mut expanded = Case::new(format!("{base_id}_{carrier}"), carrier, case.payload.clone());
            if carrier == Carrier::File {
                expanded.path = Some(fill_path_template(
                    &policy.file_path_template,
                    &[("id", &base_id), ("carrier", carrier.as_str())],
                ));
            }
            expanded
        })
        .collect()
}

/// Cases ready for rendering, plus the ones dropped during expansion.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// Expanded cases in render order.
    pub cases: Vec<Case>,
    /// Cases whose id, sanitized id, or file path was already used in this run.
    pub rejected: Vec<RejectedRecord>,
}

/// Expands every case, keeping ids and file paths unique across the run.
///
/// Canaries and build-context directories derive from the sanitized id, so
/// two ids that sanitize to the same text are treated as a collision.
#[must_use]
pub fn expand_all(cases: Vec<Case>, policy: &ExpansionPolicy, suite: &str) -> Expansion {
    let mut out = Expansion::default();
    let mut ids: HashSet<String> = HashSet::new();
    let mut sanitized_ids: HashSet<String> = HashSet::new();
    let mut paths: HashSet<String> = HashSet::new();

    for case in cases.into_iter().flat_map(|c| expand(c, policy)) {
        let sanitized = sanitize_component(&case.id);
        let clash = if ids.contains(&case.id) {
            Some(format!("id '{}' already used in this run", case.id))
        } else if sanitized_ids.contains(&sanitized) {
            Some(format!(
                "id '{}' sanitizes to '{sanitized}', which another case already uses",
                case.id
            ))
        } else {
            case.path
                .as_ref()
                .filter(|p| paths.contains(*p))
                .map(|p| format!("file path '{p}' already used in this run"))
        };
        if let Some(message) = clash {
            let err = TaintboxError::schema(format!("case {}", case.id), message);
            tracing::warn!(case_id = %case.id, error = %err, "rejecting expanded case");
            out.rejected.push(RejectedRecord::new(suite, case.id, &err));
            continue;
        }
        let _ = ids.insert(case.id.clone());
        let _ = sanitized_ids.insert(sanitized);
        if let Some(path) = &case.path {
            let _ = paths.insert(path.clone());
        }
        out.cases.push(case);
    }
    tracing::info!(cases = out.cases.len(), rejected = out.rejected.len(), "expanded cases");
    out
}
