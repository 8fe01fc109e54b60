//! The ingestion pipeline: sources in, validated cases out.
//!
//! Per source: fetch → extract → optional seeded shuffle → per-source limit.
//! Across sources, in manifest order: exact-match dedup (first occurrence
//! wins) → global ceiling → id and carrier assignment → schema validation.
//! A failing source is reported in [`IngestReport::failures`] and skipped.

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use taintbox_common::config::Settings;
use taintbox_common::constants::CASE_INDEX_WIDTH;
use taintbox_common::error::{Result, TaintboxError};
use taintbox_common::types::{Carrier, Case, fill_path_template, sanitize_component};

pub use crate::source::SourceFailure;
use crate::extract::extract_payloads;
use crate::fetch::Fetcher;
use crate::source::ExternalSourceSpec;

/// Knobs of a single ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Ceiling on the merged collection; zero means no ceiling.
    pub limit: usize,
    /// Prefix of generated case ids.
    pub case_prefix: String,
    /// Carriers assigned round-robin, starting with the first case.
    pub carrier_cycle: Vec<Carrier>,
    /// Path template for file-carrier cases (`{source}`, `{idx}`, `{id}`).
    pub file_path_template: String,
    /// Seed of the generator shared by all shuffled sources.
    pub seed: u64,
}

impl IngestOptions {
    /// Derives the ingestion knobs from run settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            limit: settings.external_prompts_limit,
            case_prefix: settings.external_case_prefix.clone(),
            carrier_cycle: settings.external_carrier_cycle.clone(),
            file_path_template: settings.external_file_path_template.clone(),
            seed: settings.external_shuffle_seed,
        }
    }
}

/// Per-source counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    /// Source identifier.
    pub source_id: String,
    /// Payloads extracted before the per-source limit.
    pub extracted: usize,
    /// Payloads that made it into the output.
    pub kept: usize,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Validated cases in output order.
    pub cases: Vec<Case>,
    /// Sources that were skipped.
    pub failures: Vec<SourceFailure>,
    /// Per-source counters for sources that were read.
    pub sources: Vec<SourceSummary>,
    /// Records that yielded no payload.
    pub skipped_records: usize,
    /// Payloads dropped as exact duplicates of earlier ones.
    pub duplicates: usize,
}

struct Prompt {
    source_id: String,
    payload: String,
}

/// Runs the ingestion pipeline over `sources`.
///
/// # Errors
///
/// Returns `TaintboxError::Config` if the carrier cycle is empty. Source
/// failures never surface here; they are collected in the report.
pub fn ingest(
    sources: &[ExternalSourceSpec],
    options: &IngestOptions,
    fetcher: &dyn Fetcher,
) -> Result<IngestReport> {
    if options.carrier_cycle.is_empty() {
        return Err(TaintboxError::config("external carrier cycle must be a non-empty list"));
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut report = IngestReport::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut prompts: Vec<Prompt> = Vec::new();

    for spec in sources {
        if options.limit > 0 && prompts.len() >= options.limit {
            tracing::info!(source_id = %spec.id, limit = options.limit, "global limit reached, not fetching");
            break;
        }

        let payloads = match read_source(spec, fetcher, &mut rng) {
            Ok((payloads, skipped)) => {
                report.skipped_records += skipped;
                payloads
            }
            Err(err) => {
                tracing::warn!(source_id = %spec.id, error = %err, "skipping source");
                report.failures.push(SourceFailure::new(&spec.id, &err));
                continue;
            }
        };

        let mut summary = SourceSummary {
            source_id: spec.id.clone(),
            extracted: payloads.len(),
            kept: 0,
        };
        for payload in payloads {
            if options.limit > 0 && prompts.len() >= options.limit {
                break;
            }
            if !seen.insert(payload.clone()) {
                report.duplicates += 1;
                continue;
            }
            summary.kept += 1;
            prompts.push(Prompt {
                source_id: spec.id.clone(),
                payload,
            });
        }
        report.sources.push(summary);
    }

    report.cases = assign_cases(prompts, options);
    tracing::info!(
        cases = report.cases.len(),
        failed_sources = report.failures.len(),
        duplicates = report.duplicates,
        "ingestion finished"
    );
    Ok(report)
}

fn read_source(
    spec: &ExternalSourceSpec,
    fetcher: &dyn Fetcher,
    rng: &mut StdRng,
) -> Result<(Vec<String>, usize)> {
    let _ = spec.rule()?;
    let body = fetcher.fetch(&spec.url)?;
    let mut extraction = extract_payloads(spec, &body)?;
    if spec.shuffle {
        extraction.payloads.shuffle(rng);
    }
    if let Some(limit) = spec.limit.filter(|l| *l > 0) {
        extraction.payloads.truncate(limit);
    }
    Ok((extraction.payloads, extraction.skipped_records))
}

fn assign_cases(prompts: Vec<Prompt>, options: &IngestOptions) -> Vec<Case> {
    let prefix = sanitize_component(&options.case_prefix);
    let cycle_len = options.carrier_cycle.len();
    prompts
        .into_iter()
        .enumerate()
        .filter_map(|(i, prompt)| {
            let idx = format!("{:0width$}", i + 1, width = CASE_INDEX_WIDTH);
            let id = format!("{prefix}_{idx}");
            let carrier = options.carrier_cycle[i % cycle_len];
            let mut case = Case::new(id, carrier, prompt.payload);
            if carrier == Carrier::File {
                let source = sanitize_component(&prompt.source_id);
                case.path = Some(fill_path_template(
                    &options.file_path_template,
                    &[("source", &source), ("idx", &idx), ("id", &case.id)],
                ));
            }
            case.validate()
                .inspect_err(|e| tracing::warn!(error = %e, "dropping generated case"))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use taintbox_common::error::ErrorKind;

    use super::*;
    use crate::fetch::MemoryFetcher;
    use crate::source::SourceFormat;

    fn options(limit: usize) -> IngestOptions {
        IngestOptions {
            limit,
            case_prefix: "ext".into(),
            carrier_cycle: vec![Carrier::Label],
            file_path_template: "/data/{source}/payload_{idx}.txt".into(),
            seed: 42,
        }
    }

    fn json_source(id: &str, limit: Option<usize>, shuffle: bool) -> ExternalSourceSpec {
        ExternalSourceSpec {
            id: id.into(),
            format: SourceFormat::Json,
            url: format!("mem://{id}"),
            field: Some("prompt".into()),
            template: None,
            limit,
            shuffle,
        }
    }

    fn body(prompts: &[&str]) -> String {
        let rows: Vec<_> = prompts.iter().map(|p| serde_json::json!({ "prompt": p })).collect();
        serde_json::to_string(&rows).expect("serialize")
    }

    fn numbered(n: usize) -> String {
        let names: Vec<String> = (1..=n).map(|i| format!("prompt {i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        body(&refs)
    }

    #[test]
    fn ingest_dedups_across_sources_first_wins() {
        let fetcher = MemoryFetcher::new()
            .with("mem://a", body(&["x", "y"]))
            .with("mem://b", body(&["y", "z"]));
        let sources = [json_source("a", None, false), json_source("b", None, false)];

        let report = ingest(&sources, &options(0), &fetcher).expect("ingest");
        let payloads: Vec<_> = report.cases.iter().map(|c| c.payload.as_str()).collect();
        assert_eq!(payloads, vec!["x", "y", "z"]);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn ingest_global_limit_is_hard_ceiling() {
        let fetcher = MemoryFetcher::new()
            .with("mem://a", numbered(30))
            .with("mem://b", body(&["other"]));
        let sources = [json_source("a", None, false), json_source("b", None, false)];

        let report = ingest(&sources, &options(25), &fetcher).expect("ingest");
        assert_eq!(report.cases.len(), 25);
        assert_eq!(report.cases[24].payload, "prompt 25");
    }

    #[test]
    fn ingest_per_source_limit_applies_before_global() {
        let fetcher = MemoryFetcher::new()
            .with("mem://a", numbered(10))
            .with("mem://b", body(&["b1", "b2"]));
        let sources = [json_source("a", Some(3), false), json_source("b", None, false)];

        let report = ingest(&sources, &options(0), &fetcher).expect("ingest");
        let payloads: Vec<_> = report.cases.iter().map(|c| c.payload.as_str()).collect();
        assert_eq!(payloads, vec!["prompt 1", "prompt 2", "prompt 3", "b1", "b2"]);
    }

    #[test]
    fn ingest_failed_source_is_reported_and_skipped() {
        let fetcher = MemoryFetcher::new().with("mem://b", body(&["kept"]));
        let sources = [json_source("a", None, false), json_source("b", None, false)];

        let report = ingest(&sources, &options(0), &fetcher).expect("ingest");
        assert_eq!(report.cases.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source_id, "a");
        assert_eq!(report.failures[0].kind, ErrorKind::Fetch);
    }

    #[test]
    fn ingest_without_shuffle_is_order_stable() {
        let fetcher = MemoryFetcher::new().with("mem://a", numbered(20));
        let sources = [json_source("a", Some(10), false)];

        let first = ingest(&sources, &options(0), &fetcher).expect("ingest");
        let second = ingest(&sources, &options(0), &fetcher).expect("ingest");
        assert_eq!(first.cases, second.cases);
        assert_eq!(first.cases[0].payload, "prompt 1");
    }

    #[test]
    fn ingest_shuffle_is_seeded_and_reproducible() {
        let fetcher = MemoryFetcher::new().with("mem://a", numbered(50));
        let sources = [json_source("a", Some(10), true)];

        let first = ingest(&sources, &options(0), &fetcher).expect("ingest");
        let second = ingest(&sources, &options(0), &fetcher).expect("ingest");
        assert_eq!(first.cases, second.cases);
        assert_eq!(first.cases.len(), 10);
        let payloads: Vec<_> = first.cases.iter().map(|c| c.payload.clone()).collect();
        let unshuffled: Vec<_> = (1..=10).map(|i| format!("prompt {i}")).collect();
        assert_ne!(payloads, unshuffled);
    }

    #[test]
    fn ingest_assigns_padded_ids_and_cycles_carriers() {
        let fetcher = MemoryFetcher::new().with("mem://a/b", body(&["p1", "p2", "p3"]));
        let mut source = json_source("a/b", None, false);
        source.url = "mem://a/b".into();
        let opts = IngestOptions {
            carrier_cycle: vec![Carrier::Env, Carrier::File],
            ..options(0)
        };

        let report = ingest(&[source], &opts, &fetcher).expect("ingest");
        let ids: Vec<_> = report.cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["ext_0001", "ext_0002", "ext_0003"]);
        assert_eq!(report.cases[0].carrier, Carrier::Env);
        assert_eq!(report.cases[1].carrier, Carrier::File);
        assert_eq!(report.cases[1].path.as_deref(), Some("/data/a-b/payload_0002.txt"));
        assert_eq!(report.cases[2].carrier, Carrier::Env);
        assert_eq!(report.cases[2].path, None);
    }

    #[test]
    fn ingest_empty_cycle_is_config_error() {
        let opts = IngestOptions {
            carrier_cycle: Vec::new(),
            ..options(0)
        };
        let err = ingest(&[], &opts, &MemoryFetcher::new()).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn ingest_source_without_rule_is_schema_failure() {
        let mut source = json_source("a", None, false);
        source.field = None;
        let fetcher = MemoryFetcher::new().with("mem://a", body(&["x"]));

        let report = ingest(&[source], &options(0), &fetcher).expect("ingest");
        assert!(report.cases.is_empty());
        assert_eq!(report.failures[0].kind, ErrorKind::Schema);
    }
}
