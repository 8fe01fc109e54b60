//! Container CLI invocation.
//!
//! Every call blocks until the tool exits. A non-zero exit becomes a
//! `Build` or `Push` error carrying the tail of the tool's stderr. A failed
//! base-image pull is a `Config` error, since no case can be built without it.

use std::path::{Path, PathBuf};
use std::process::Command;

use taintbox_common::config::{ContainerCli, Settings};
use taintbox_common::error::{Result, TaintboxError};

const STDERR_TAIL_LINES: usize = 20;

/// Pulls, builds, and pushes images.
pub trait ContainerTool {
    /// Name recorded in the runlist.
    fn name(&self) -> &str;

    /// Pulls `image`.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Config` if the pull fails.
    fn pull(&self, image: &str) -> Result<()>;

    /// Builds the `Dockerfile` in `context_dir` and tags it `image`.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Build` if the build fails.
    fn build(&self, image: &str, context_dir: &Path, build_args: &[(String, String)]) -> Result<()>;

    /// Pushes `image` to its registry.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Push` if the push fails.
    fn push(&self, image: &str) -> Result<()>;
}

/// Arguments placed before every subcommand.
///
/// `insecure_registry` adds `--insecure-registry` for nerdctl; Docker only
/// honors it at daemon level, so nothing is added there.
#[must_use]
pub fn effective_cli_args(cli: ContainerCli, args: &[String], insecure_registry: bool) -> Vec<String> {
    let mut effective = args.to_vec();
    if insecure_registry {
        match cli {
            ContainerCli::Nerdctl => {
                if !effective.iter().any(|a| a == "--insecure-registry") {
                    effective.push("--insecure-registry".into());
                }
            }
            ContainerCli::Docker => tracing::warn!(
                "insecure_registry=true is set, but Docker requires daemon-level \
                 insecure-registries config; no CLI flag is applied"
            ),
        }
    }
    effective
}

/// The docker or nerdctl binary.
#[derive(Debug, Clone)]
pub struct CliTool {
    cli: ContainerCli,
    binary: PathBuf,
    args: Vec<String>,
    docker_config: Option<PathBuf>,
}

impl CliTool {
    /// Resolves the configured CLI on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Config` if the binary cannot be found.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let cli = settings.container_cli;
        let binary = which::which(cli.binary()).map_err(|_| {
            TaintboxError::config(format!("container CLI '{cli}' not found on PATH"))
        })?;
        let docker_config = Some(settings.docker_config.trim())
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);
        tracing::info!(cli = %cli, binary = %binary.display(), "resolved container CLI");
        Ok(Self {
            cli,
            binary,
            args: effective_cli_args(cli, &settings.container_cli_args, settings.insecure_registry),
            docker_config,
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        let _ = cmd.args(&self.args);
        if let Some(dir) = &self.docker_config {
            let _ = cmd.env("DOCKER_CONFIG", dir);
        }
        cmd
    }

    fn execute(&self, mut cmd: Command) -> std::result::Result<(), String> {
        tracing::info!(cmd = ?cmd, "invoking container CLI");
        let output = cmd
            .output()
            .map_err(|e| format!("failed to spawn {}: {e}", self.binary.display()))?;
        if output.status.success() {
            tracing::debug!(stdout = %String::from_utf8_lossy(&output.stdout), "container CLI succeeded");
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        Err(format!(
            "{} exited with {}: {tail}",
            self.cli,
            output.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string())
        ))
    }
}

impl ContainerTool for CliTool {
    fn name(&self) -> &str {
        self.cli.binary()
    }

    fn pull(&self, image: &str) -> Result<()> {
        let mut cmd = self.command();
        let _ = cmd.args(["pull", image]);
        self.execute(cmd)
            .map_err(|message| TaintboxError::config(format!("pull of base image '{image}' failed: {message}")))
    }

    fn build(&self, image: &str, context_dir: &Path, build_args: &[(String, String)]) -> Result<()> {
        let mut cmd = self.command();
        let _ = cmd.args(["build", "-t", image, "-f", "Dockerfile"]);
        for (key, value) in build_args {
            let _ = cmd.arg("--build-arg").arg(format!("{key}={value}"));
        }
        let _ = cmd.arg(".").current_dir(context_dir);
        self.execute(cmd).map_err(|message| TaintboxError::Build {
            tag: image.to_string(),
            message,
        })
    }

    fn push(&self, image: &str) -> Result<()> {
        let mut cmd = self.command();
        let _ = cmd.args(["push", image]);
        self.execute(cmd).map_err(|message| TaintboxError::Push {
            tag: image.to_string(),
            message,
        })
    }
}
