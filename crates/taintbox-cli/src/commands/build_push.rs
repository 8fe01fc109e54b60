//! `tbx build-push` — Build one mutated image per case and write the runlist.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Args;
use taintbox_build::build_push;
use taintbox_build::clock::SystemClock;
use taintbox_build::tool::CliTool;
use taintbox_common::config::{ContainerCli, Settings, SettingsOverrides};
use taintbox_common::constants::DEFAULT_CONFIG_PATH;
use taintbox_ingest::fetch::HttpFetcher;

use crate::output;

/// Arguments for the `build-push` command.
#[derive(Args, Debug)]
pub struct BuildPushArgs {
    /// Path to the JSON (or YAML) configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Container CLI to invoke.
    #[arg(long)]
    pub container_cli: Option<ContainerCli>,

    /// Directory exported to the tool as `DOCKER_CONFIG`.
    #[arg(long)]
    pub docker_config: Option<String>,

    /// Treat the registry as plain HTTP.
    #[arg(long, overrides_with = "secure_registry")]
    pub insecure_registry: bool,

    /// Treat the registry as TLS.
    #[arg(long)]
    pub secure_registry: bool,

    /// Base image every mutation starts from.
    #[arg(long)]
    pub base_image: Option<String>,

    /// Registry host.
    #[arg(long)]
    pub registry: Option<String>,

    /// Repository namespace.
    #[arg(long)]
    pub repo: Option<String>,

    /// Image name inside the repository.
    #[arg(long)]
    pub image_name: Option<String>,

    /// Basic suite file.
    #[arg(long)]
    pub suite: Option<PathBuf>,

    /// Generated external suite file.
    #[arg(long)]
    pub external_suite: Option<PathBuf>,

    /// Merge the external suite after the basic suite.
    #[arg(long, overrides_with = "no_external_suite")]
    pub include_external_suite: bool,

    /// Do not merge the external suite.
    #[arg(long)]
    pub no_external_suite: bool,

    /// Output directory for build contexts and runlists.
    #[arg(long)]
    pub outdir: Option<PathBuf>,

    /// Leading tag component.
    #[arg(long)]
    pub tag_prefix: Option<String>,

    /// `strftime` pattern of the tag timestamp.
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Push each image after building it.
    #[arg(long, overrides_with = "no_push")]
    pub push: bool,

    /// Build only.
    #[arg(long)]
    pub no_push: bool,

    /// Pull the base image before the first build.
    #[arg(long, overrides_with = "no_pull_base")]
    pub pull_base: bool,

    /// Use the locally cached base image.
    #[arg(long)]
    pub no_pull_base: bool,

    /// Add `case_id`/`canary`/`carrier` trace labels.
    #[arg(long)]
    pub trace_labels: bool,

    /// Duplicate each case across every configured carrier.
    #[arg(long)]
    pub expand_carriers: bool,

    /// Ingest external prompts inline before building.
    #[arg(long)]
    pub external_prompts: bool,

    /// Ceiling on inline-ingested prompts (0 = none).
    #[arg(long)]
    pub external_prompts_limit: Option<usize>,
}

const fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

impl BuildPushArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            container_cli: self.container_cli,
            docker_config: self.docker_config.clone(),
            insecure_registry: flag_pair(self.insecure_registry, self.secure_registry),
            base_image: self.base_image.clone(),
            registry: self.registry.clone(),
            repo: self.repo.clone(),
            image_name: self.image_name.clone(),
            suite: self.suite.clone(),
            external_suite: self.external_suite.clone(),
            include_external_suite: flag_pair(self.include_external_suite, self.no_external_suite),
            outdir: self.outdir.clone(),
            tag_prefix: self.tag_prefix.clone(),
            timestamp_format: self.timestamp_format.clone(),
            push: flag_pair(self.push, self.no_push),
            pull_base: flag_pair(self.pull_base, self.no_pull_base),
            trace_labels_enabled: self.trace_labels.then_some(true),
            expand_case_to_all_carriers: self.expand_carriers.then_some(true),
            external_prompts_enabled: self.external_prompts.then_some(true),
            external_prompts_limit: self.external_prompts_limit,
        }
    }
}

/// Executes the `build-push` command.
///
/// Returns `Ok(false)` when the run completed but some case failed.
///
/// # Errors
///
/// Returns an error if the run could not proceed.
pub fn execute(args: BuildPushArgs) -> anyhow::Result<bool> {
    let settings = Settings::load(&args.config)?.apply(args.overrides());
    settings.validate()?;

    let tool = CliTool::from_settings(&settings)?;
    let fetcher = HttpFetcher::new(Duration::from_secs(settings.external_fetch_timeout_seconds))?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let report = build_push(&settings, &tool, &fetcher, &SystemClock, Some(cancel.as_ref()))?;

    eprint!("{}", output::format_run_summary(&report.document));
    println!("{}", report.runlist_path.display());
    Ok(!report.has_failures())
}
