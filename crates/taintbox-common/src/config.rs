//! Run configuration for the build/push and ingestion pipelines.
//!
//! Settings are read once from a JSON (or YAML) document, overridden by
//! command-line flags, validated, and then passed by reference into each
//! stage. Nothing here is global.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, TaintboxError};
use crate::types::Carrier;

/// Container CLI used to pull, build, and push images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerCli {
    /// The Docker CLI.
    #[default]
    Docker,
    /// The containerd `nerdctl` CLI.
    Nerdctl,
}

impl ContainerCli {
    /// Binary name to resolve on `PATH`.
    #[must_use]
    pub const fn binary(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Nerdctl => "nerdctl",
        }
    }
}

impl fmt::Display for ContainerCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl std::str::FromStr for ContainerCli {
    type Err = TaintboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "docker" => Ok(Self::Docker),
            "nerdctl" => Ok(Self::Nerdctl),
            other => Err(TaintboxError::config(format!(
                "container_cli must be either 'docker' or 'nerdctl', got '{other}'"
            ))),
        }
    }
}

/// Root configuration for a taintbox run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Image every mutation starts from.
    pub base_image: String,
    /// Registry host, e.g. `registry.local:5000`.
    pub registry: String,
    /// Repository namespace inside the registry.
    pub repo: String,
    /// Image name inside the repository.
    pub image_name: String,
    /// Path to the manually curated ("basic") suite.
    pub suite: PathBuf,
    /// Container CLI to invoke.
    pub container_cli: ContainerCli,
    /// Extra arguments placed before every container CLI subcommand.
    pub container_cli_args: Vec<String>,
    /// Directory exported to the tool as `DOCKER_CONFIG`; empty leaves it unset.
    pub docker_config: String,
    /// Whether the registry is plain HTTP.
    pub insecure_registry: bool,
    /// Directory for build contexts and runlists.
    pub outdir: PathBuf,
    /// Push each image after a successful build.
    pub push: bool,
    /// Pull the base image once before processing any case.
    pub pull_base: bool,
    /// Optional leading component of every tag.
    pub tag_prefix: String,
    /// `strftime` format of the UTC timestamp in tags and runlist names.
    pub timestamp_format: String,
    /// Emit `case_id`/`canary`/`carrier` trace labels.
    pub trace_labels_enabled: bool,
    /// Namespace of the trace labels.
    pub trace_label_prefix: String,
    /// Label key carrying the payload.
    pub payload_label_key: String,
    /// Environment variable carrying the payload.
    pub payload_env_key: String,
    /// Build argument carrying the payload.
    pub payload_arg_key: String,
    /// Path to the generated external suite.
    pub external_suite: PathBuf,
    /// Merge the generated external suite after the basic suite.
    pub include_external_suite: bool,
    /// Duplicate each case across every carrier in `expand_carriers`.
    pub expand_case_to_all_carriers: bool,
    /// Carriers used when expansion is enabled.
    pub expand_carriers: Vec<Carrier>,
    /// Path template for expanded file-carrier cases (`{id}`, `{carrier}`).
    pub expand_file_path_template: String,
    /// Ingest external prompts inline during `build-push`.
    pub external_prompts_enabled: bool,
    /// Manifest of external prompt sources.
    pub external_prompt_manifest: PathBuf,
    /// Ceiling on ingested prompts; zero means no ceiling.
    pub external_prompts_limit: usize,
    /// Id prefix for ingested cases.
    pub external_case_prefix: String,
    /// Carriers assigned round-robin to ingested cases.
    pub external_carrier_cycle: Vec<Carrier>,
    /// Path template for ingested file-carrier cases (`{source}`, `{idx}`).
    pub external_file_path_template: String,
    /// Timeout for each source fetch, in seconds.
    pub external_fetch_timeout_seconds: u64,
    /// Seed for per-source shuffles.
    pub external_shuffle_seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_image: String::new(),
            registry: String::new(),
            repo: "llmsec".into(),
            image_name: "mutated".into(),
            suite: PathBuf::new(),
            container_cli: ContainerCli::default(),
            container_cli_args: Vec::new(),
            docker_config: String::new(),
            insecure_registry: false,
            outdir: PathBuf::from(constants::DEFAULT_OUTDIR),
            push: false,
            pull_base: false,
            tag_prefix: String::new(),
            timestamp_format: constants::DEFAULT_TIMESTAMP_FORMAT.into(),
            trace_labels_enabled: false,
            trace_label_prefix: constants::DEFAULT_TRACE_LABEL_PREFIX.into(),
            payload_label_key: constants::DEFAULT_PAYLOAD_LABEL_KEY.into(),
            payload_env_key: constants::DEFAULT_PAYLOAD_ENV_KEY.into(),
            payload_arg_key: constants::DEFAULT_PAYLOAD_ARG_KEY.into(),
            external_suite: PathBuf::from(constants::DEFAULT_EXTERNAL_SUITE),
            include_external_suite: true,
            expand_case_to_all_carriers: false,
            expand_carriers: vec![Carrier::Label, Carrier::Env, Carrier::File, Carrier::Cmd],
            expand_file_path_template: constants::DEFAULT_EXPAND_FILE_PATH_TEMPLATE.into(),
            external_prompts_enabled: false,
            external_prompt_manifest: PathBuf::from(constants::DEFAULT_PROMPT_MANIFEST),
            external_prompts_limit: 0,
            external_case_prefix: constants::DEFAULT_EXTERNAL_CASE_PREFIX.into(),
            external_carrier_cycle: vec![Carrier::Label, Carrier::Env, Carrier::File, Carrier::Cmd],
            external_file_path_template: constants::DEFAULT_EXTERNAL_FILE_PATH_TEMPLATE.into(),
            external_fetch_timeout_seconds: constants::DEFAULT_FETCH_TIMEOUT_SECONDS,
            external_shuffle_seed: constants::DEFAULT_SHUFFLE_SEED,
        }
    }
}

/// Per-field overrides taken from the command line.
///
/// Every `Some` value replaces the file value.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    /// Overrides `container_cli`.
    pub container_cli: Option<ContainerCli>,
    /// Overrides `docker_config`.
    pub docker_config: Option<String>,
    /// Overrides `insecure_registry`.
    pub insecure_registry: Option<bool>,
    /// Overrides `base_image`.
    pub base_image: Option<String>,
    /// Overrides `registry`.
    pub registry: Option<String>,
    /// Overrides `repo`.
    pub repo: Option<String>,
    /// Overrides `image_name`.
    pub image_name: Option<String>,
    /// Overrides `suite`.
    pub suite: Option<PathBuf>,
    /// Overrides `external_suite`.
    pub external_suite: Option<PathBuf>,
    /// Overrides `include_external_suite`.
    pub include_external_suite: Option<bool>,
    /// Overrides `outdir`.
    pub outdir: Option<PathBuf>,
    /// Overrides `tag_prefix`.
    pub tag_prefix: Option<String>,
    /// Overrides `timestamp_format`.
    pub timestamp_format: Option<String>,
    /// Overrides `push`.
    pub push: Option<bool>,
    /// Overrides `pull_base`.
    pub pull_base: Option<bool>,
    /// Overrides `trace_labels_enabled`.
    pub trace_labels_enabled: Option<bool>,
    /// Overrides `expand_case_to_all_carriers`.
    pub expand_case_to_all_carriers: Option<bool>,
    /// Overrides `external_prompts_enabled`.
    pub external_prompts_enabled: Option<bool>,
    /// Overrides `external_prompts_limit`.
    pub external_prompts_limit: Option<usize>,
}

impl Settings {
    /// Reads settings from a JSON or YAML file, chosen by extension.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Config` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading settings");
        let content = std::fs::read_to_string(path).map_err(|e| {
            TaintboxError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                TaintboxError::config(format!("malformed config {}: {e}", path.display()))
            })
        } else {
            serde_json::from_str(&content).map_err(|e| {
                TaintboxError::config(format!("malformed config {}: {e}", path.display()))
            })
        }
    }

    /// Applies command-line overrides on top of the file values.
    #[must_use]
    pub fn apply(mut self, o: SettingsOverrides) -> Self {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = o.$field { self.$field = v; })*
            };
        }
        take!(
            container_cli,
            docker_config,
            insecure_registry,
            base_image,
            registry,
            repo,
            image_name,
            suite,
            external_suite,
            include_external_suite,
            outdir,
            tag_prefix,
            timestamp_format,
            push,
            pull_base,
            trace_labels_enabled,
            expand_case_to_all_carriers,
            external_prompts_enabled,
            external_prompts_limit,
        );
        self
    }

    /// Checks the settings for missing or contradictory values.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("base_image", self.base_image.as_str()),
            ("registry", self.registry.as_str()),
            ("repo", self.repo.as_str()),
            ("image_name", self.image_name.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(TaintboxError::config(format!("missing required config field: {name}")));
            }
        }
        if self.suite.as_os_str().is_empty() {
            return Err(TaintboxError::config("missing required config field: suite"));
        }
        self.validate_expansion()?;
        self.validate_external()?;
        validate_timestamp_format(&self.timestamp_format)?;
        self.validate_keys()
    }

    /// Names of the trace labels emitted when tracing is enabled.
    #[must_use]
    pub fn trace_label_keys(&self) -> [String; 3] {
        let p = &self.trace_label_prefix;
        [format!("{p}.case_id"), format!("{p}.canary"), format!("{p}.carrier")]
    }

    fn validate_expansion(&self) -> Result<()> {
        if !self.expand_case_to_all_carriers {
            return Ok(());
        }
        if self.expand_carriers.is_empty() {
            return Err(TaintboxError::config("expand_carriers must be a non-empty list"));
        }
        let mut seen = HashSet::new();
        for carrier in &self.expand_carriers {
            if !seen.insert(carrier) {
                return Err(TaintboxError::config(format!(
                    "expand_carriers lists '{carrier}' more than once"
                )));
            }
        }
        if seen.contains(&Carrier::File) && !self.expand_file_path_template.contains("{id}") {
            return Err(TaintboxError::config(
                "expand_file_path_template must contain '{id}' so expanded file paths stay unique",
            ));
        }
        Ok(())
    }

    fn validate_external(&self) -> Result<()> {
        if !self.external_prompts_enabled {
            return Ok(());
        }
        if self.external_carrier_cycle.is_empty() {
            return Err(TaintboxError::config("external_carrier_cycle must be a non-empty list"));
        }
        if self.external_fetch_timeout_seconds == 0 {
            return Err(TaintboxError::config("external_fetch_timeout_seconds must be positive"));
        }
        if self.external_carrier_cycle.contains(&Carrier::File)
            && !self.external_file_path_template.contains("{idx}")
        {
            return Err(TaintboxError::config(
                "external_file_path_template must contain '{idx}' so file paths stay unique",
            ));
        }
        Ok(())
    }

    fn validate_keys(&self) -> Result<()> {
        for (name, value) in [
            ("payload_label_key", &self.payload_label_key),
            ("payload_env_key", &self.payload_env_key),
            ("payload_arg_key", &self.payload_arg_key),
        ] {
            if value.trim().is_empty() || value.contains(char::is_whitespace) {
                return Err(TaintboxError::config(format!(
                    "{name} must be a non-empty key without whitespace"
                )));
            }
        }
        if self.trace_labels_enabled && self.trace_label_keys().contains(&self.payload_label_key) {
            return Err(TaintboxError::config(format!(
                "payload_label_key '{}' collides with a trace label",
                self.payload_label_key
            )));
        }
        Ok(())
    }
}

/// Rejects `strftime` formats chrono cannot render.
///
/// # Errors
///
/// Returns `TaintboxError::Config` on an empty or invalid format.
pub fn validate_timestamp_format(format: &str) -> Result<()> {
    if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(TaintboxError::config(format!("invalid timestamp_format: '{format}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Settings {
        Settings {
            base_image: "alpine:3.20".into(),
            registry: "registry.local:5000".into(),
            suite: PathBuf::from("cases/suite_basic.json"),
            ..Settings::default()
        }
    }

    #[test]
    fn load_json_fills_defaults() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"base_image":"alpine","registry":"r","suite":"s.json","push":true}"#,
        )
        .expect("write");

        let settings = Settings::load(&path).expect("load failed");
        assert!(settings.push);
        assert_eq!(settings.repo, "llmsec");
        assert_eq!(settings.timestamp_format, "%Y%m%d%H%M%S");
        assert_eq!(settings.container_cli, ContainerCli::Docker);
    }

    #[test]
    fn load_yaml_by_extension() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "base_image: alpine\nregistry: r\nsuite: s.json\ncontainer_cli: nerdctl\n",
        )
        .expect("write");

        let settings = Settings::load(&path).expect("load failed");
        assert_eq!(settings.container_cli, ContainerCli::Nerdctl);
    }

    #[test]
    fn load_unknown_carrier_is_config_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"expand_carriers":["label","volume"]}"#).expect("write");

        let err = Settings::load(&path).expect_err("should fail");
        assert!(matches!(err, TaintboxError::Config { .. }));
    }

    #[test]
    fn validate_missing_base_image_fails() {
        let settings = Settings {
            base_image: " ".into(),
            ..minimal()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_minimal_succeeds() {
        minimal().validate().expect("minimal settings should validate");
    }

    #[test]
    fn validate_duplicate_expand_carriers_fails() {
        let settings = Settings {
            expand_case_to_all_carriers: true,
            expand_carriers: vec![Carrier::Label, Carrier::Label],
            ..minimal()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_literal_expand_file_template_fails() {
        let settings = Settings {
            expand_case_to_all_carriers: true,
            expand_carriers: vec![Carrier::File],
            expand_file_path_template: "/tmp/payload.txt".into(),
            ..minimal()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_trace_label_collision_fails() {
        let settings = Settings {
            trace_labels_enabled: true,
            payload_label_key: "org.llmsec.canary".into(),
            ..minimal()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_bad_timestamp_format_fails() {
        let settings = Settings {
            timestamp_format: "%Q".into(),
            ..minimal()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn apply_overrides_take_precedence() {
        let overrides = SettingsOverrides {
            push: Some(true),
            tag_prefix: Some("nightly".into()),
            container_cli: Some(ContainerCli::Nerdctl),
            ..SettingsOverrides::default()
        };
        let settings = minimal().apply(overrides);
        assert!(settings.push);
        assert_eq!(settings.tag_prefix, "nightly");
        assert_eq!(settings.container_cli, ContainerCli::Nerdctl);
        assert_eq!(settings.base_image, "alpine:3.20");
    }

    #[test]
    fn container_cli_rejects_podman() {
        assert!("podman".parse::<ContainerCli>().is_err());
    }
}
