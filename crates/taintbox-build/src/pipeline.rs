//! End-to-end `build-push`.
//!
//! Stages, in order: validate settings, load the basic suite, append the
//! external suite and inline-ingested prompts, merge, expand, build each
//! case, write the runlist. Run-level errors abort before the first build;
//! per-case errors end up in the runlist.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use taintbox_common::config::Settings;
use taintbox_common::error::{Result, TaintboxError};
use taintbox_ingest::fetch::Fetcher;
use taintbox_ingest::source::load_manifest;
use taintbox_ingest::{IngestOptions, SourceFailure, ingest};
use taintbox_mutate::expand::{ExpansionPolicy, expand_all};
use taintbox_mutate::suite::{LoadedSuite, load_suite, merge_suites, suite_name};
use taintbox_mutate::tag::format_timestamp;
use uuid::Uuid;

use crate::clock::Clock;
use crate::orchestrator::Orchestrator;
use crate::runlist::{RunSummary, RunlistDocument, runlist_path, write_runlist};
use crate::tool::{ContainerTool, effective_cli_args};

/// Where the runlist went and what it says.
#[derive(Debug, Clone)]
pub struct BuildPushReport {
    /// Path of the written runlist.
    pub runlist_path: PathBuf,
    /// The runlist contents.
    pub document: RunlistDocument,
}

impl BuildPushReport {
    /// Whether any case failed, was skipped, or was rejected.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.document.summary.has_failures()
    }
}

/// Everything collected before the first build.
struct Collected {
    suites: Vec<LoadedSuite>,
    external_suite: Option<String>,
    external_suite_cases_count: usize,
    external_cases_count: usize,
    ingest_failures: Vec<SourceFailure>,
}

/// Runs the whole pipeline.
///
/// # Errors
///
/// Returns an error for run-level failures: invalid settings, an unreadable
/// suite or manifest, an existing runlist for this run, a failed base-image
/// pull, or a runlist that cannot be written.
pub fn build_push(
    settings: &Settings,
    tool: &dyn ContainerTool,
    fetcher: &dyn Fetcher,
    clock: &dyn Clock,
    cancel: Option<&AtomicBool>,
) -> Result<BuildPushReport> {
    settings.validate()?;

    let basic = load_suite(&settings.suite)?;
    let basic_name = basic.name.clone();
    let collected = collect(settings, basic, fetcher)?;

    let merged = merge_suites(collected.suites);
    let mut rejected = merged.rejected;
    let expansion = expand_all(
        merged.cases,
        &ExpansionPolicy::from_settings(settings),
        &basic_name,
    );
    rejected.extend(expansion.rejected);

    let timestamp = format_timestamp(clock.now(), &settings.timestamp_format);
    std::fs::create_dir_all(&settings.outdir).map_err(|e| TaintboxError::Io {
        path: settings.outdir.clone(),
        source: e,
    })?;
    let path = runlist_path(&settings.outdir, &basic_name, &timestamp);
    if path.exists() {
        return Err(TaintboxError::config(format!(
            "runlist {} already exists; refusing to overwrite",
            path.display()
        )));
    }

    tracing::info!(
        suite = %basic_name,
        cases = expansion.cases.len(),
        rejected = rejected.len(),
        push = settings.push,
        "starting build-push"
    );

    let mut orchestrator = Orchestrator::new(settings, &basic_name, tool, clock)
        .with_external_appended_count(collected.external_cases_count);
    if let Some(flag) = cancel {
        orchestrator = orchestrator.with_cancel(flag);
    }
    let outcome = orchestrator.run(expansion.cases)?;

    let summary = RunSummary::tally(&outcome.entries, outcome.skipped.len(), rejected.len());
    let document = RunlistDocument {
        run_id: Uuid::new_v4(),
        generated_at_utc: timestamp,
        base_image: settings.base_image.clone(),
        registry: settings.registry.clone(),
        repo: settings.repo.clone(),
        image_name: settings.image_name.clone(),
        suite: settings.suite.display().to_string(),
        suite_name: basic_name,
        external_suite: collected.external_suite,
        external_suite_cases_count: collected.external_suite_cases_count,
        external_cases_count: collected.external_cases_count,
        container_cli: settings.container_cli,
        container_cli_args: effective_cli_args(
            settings.container_cli,
            &settings.container_cli_args,
            settings.insecure_registry,
        ),
        insecure_registry: settings.insecure_registry,
        push: settings.push,
        images: outcome.entries,
        skipped: outcome.skipped,
        rejected,
        ingest_failures: collected.ingest_failures,
        summary,
        cancelled: outcome.cancelled,
    };
    write_runlist(&path, &document)?;

    tracing::info!(
        runlist = %path.display(),
        attempted = summary.attempted,
        built = summary.built,
        pushed = summary.pushed,
        build_failed = summary.build_failed,
        push_failed = summary.push_failed,
        "build-push finished"
    );
    Ok(BuildPushReport {
        runlist_path: path,
        document,
    })
}

fn collect(settings: &Settings, basic: LoadedSuite, fetcher: &dyn Fetcher) -> Result<Collected> {
    let mut collected = Collected {
        suites: vec![basic],
        external_suite: None,
        external_suite_cases_count: 0,
        external_cases_count: 0,
        ingest_failures: Vec::new(),
    };

    if settings.include_external_suite {
        if !settings.external_suite.is_file() {
            return Err(TaintboxError::config(format!(
                "include_external_suite is set but {} does not exist",
                settings.external_suite.display()
            )));
        }
        let external = load_suite(&settings.external_suite)?;
        collected.external_suite = Some(settings.external_suite.display().to_string());
        collected.external_suite_cases_count = external.cases.len();
        collected.suites.push(external);
    }

    if settings.external_prompts_enabled {
        let manifest = load_manifest(&settings.external_prompt_manifest)?;
        let report = ingest(
            &manifest.sources,
            &IngestOptions::from_settings(settings),
            fetcher,
        )?;
        collected.ingest_failures.extend(manifest.rejected);
        collected.ingest_failures.extend(report.failures);
        collected.external_cases_count = report.cases.len();
        tracing::info!(
            manifest = %settings.external_prompt_manifest.display(),
            cases = report.cases.len(),
            failed_sources = collected.ingest_failures.len(),
            "ingested external prompts"
        );
        collected.suites.push(LoadedSuite {
            name: suite_name(&settings.external_prompt_manifest),
            path: settings.external_prompt_manifest.clone(),
            cases: report.cases,
            rejected: Vec::new(),
        });
    }

    Ok(collected)
}
