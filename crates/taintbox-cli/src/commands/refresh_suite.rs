//! `tbx refresh-suite` — Regenerate the external suite from the prompt manifest.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use taintbox_common::config::Settings;
use taintbox_common::constants::{
    DEFAULT_EXTERNAL_CASE_PREFIX, DEFAULT_EXTERNAL_FILE_PATH_TEMPLATE, DEFAULT_EXTERNAL_SUITE,
    DEFAULT_FETCH_TIMEOUT_SECONDS, DEFAULT_PROMPT_MANIFEST, DEFAULT_SHUFFLE_SEED,
};
use taintbox_common::error::TaintboxError;
use taintbox_common::types::Carrier;
use taintbox_ingest::fetch::HttpFetcher;
use taintbox_ingest::source::load_manifest;
use taintbox_ingest::suite::write_suite;
use taintbox_ingest::{IngestOptions, ingest};

use crate::output;

/// Arguments for the `refresh-suite` command.
#[derive(Args, Debug)]
pub struct RefreshSuiteArgs {
    /// Prompt source manifest.
    #[arg(long, default_value = DEFAULT_PROMPT_MANIFEST)]
    pub manifest: PathBuf,

    /// Where to write the generated suite.
    #[arg(long, default_value = DEFAULT_EXTERNAL_SUITE)]
    pub external_out: PathBuf,

    /// Carrier cycle for generated cases; repeat to cycle (default: label, env, file, cmd).
    #[arg(long = "carrier")]
    pub carriers: Vec<Carrier>,

    /// Prefix of generated case ids.
    #[arg(long, default_value = DEFAULT_EXTERNAL_CASE_PREFIX)]
    pub id_prefix: String,

    /// Only ingest the manifest source with this id.
    #[arg(long)]
    pub source_id: Option<String>,

    /// Ceiling on generated cases (0 = none).
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    /// Timeout of each fetch, in seconds.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECONDS)]
    pub timeout_seconds: u64,

    /// Seed for shuffled sources.
    #[arg(long, default_value_t = DEFAULT_SHUFFLE_SEED)]
    pub seed: u64,

    /// Path template for file-carrier cases (`{source}`, `{idx}`).
    #[arg(long, default_value = DEFAULT_EXTERNAL_FILE_PATH_TEMPLATE)]
    pub file_path_template: String,
}

impl RefreshSuiteArgs {
    fn options(&self) -> Result<IngestOptions, TaintboxError> {
        let carrier_cycle = if self.carriers.is_empty() {
            Settings::default().external_carrier_cycle
        } else {
            self.carriers.clone()
        };
        if carrier_cycle.contains(&Carrier::File) && !self.file_path_template.contains("{idx}") {
            return Err(TaintboxError::config(
                "--file-path-template must contain {idx} when the file carrier is cycled",
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(TaintboxError::config("--timeout-seconds must be positive"));
        }
        Ok(IngestOptions {
            limit: self.limit,
            case_prefix: self.id_prefix.clone(),
            carrier_cycle,
            file_path_template: self.file_path_template.clone(),
            seed: self.seed,
        })
    }
}

/// Executes the `refresh-suite` command.
///
/// Returns `Ok(false)` when the suite was written but some source failed.
///
/// # Errors
///
/// Returns an error if the manifest is unusable or the suite cannot be written.
pub fn execute(args: RefreshSuiteArgs) -> anyhow::Result<bool> {
    let options = args.options()?;
    let mut manifest = load_manifest(&args.manifest)?;
    if let Some(source_id) = &args.source_id {
        manifest = manifest.select(source_id)?;
    }

    let fetcher = HttpFetcher::new(Duration::from_secs(args.timeout_seconds))?;
    let mut report = ingest(&manifest.sources, &options, &fetcher)?;
    let mut failures = manifest.rejected;
    failures.append(&mut report.failures);
    report.failures = failures;

    write_suite(&args.external_out, &report.cases)?;

    println!("refreshed_external: {}", args.external_out.display());
    println!("generated_cases: {}", report.cases.len());
    eprint!("{}", output::format_ingest_report(&report));
    Ok(report.failures.is_empty())
}
