//! Mutation rendering: one (case, carrier) pair in, one artifact out.
//!
//! An artifact is the base image reference plus an ordered list of build
//! instructions appended to it. Rendering is pure; the base image string is
//! only read, and no state survives from one case to the next.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use serde_json::Value;
use taintbox_common::config::Settings;
use taintbox_common::constants::CANARY_PREFIX;
use taintbox_common::error::{Result, TaintboxError};
use taintbox_common::types::{Carrier, Case, sanitize_component};

/// Carrier-specific rendering knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
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
}

impl RenderOptions {
    /// Derives the rendering knobs from run settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            trace_labels_enabled: settings.trace_labels_enabled,
            trace_label_prefix: settings.trace_label_prefix.clone(),
            payload_label_key: settings.payload_label_key.clone(),
            payload_env_key: settings.payload_env_key.clone(),
            payload_arg_key: settings.payload_arg_key.clone(),
        }
    }
}

/// A single build instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Image metadata label.
    Label {
        /// Label key.
        key: String,
        /// Raw label value.
        value: String,
    },
    /// Environment variable.
    Env {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// Build argument declaration with a default.
    Arg {
        /// Argument name.
        name: String,
        /// Raw default value.
        default: String,
    },
    /// Shell command executed at build time.
    Run(String),
    /// Writes `content` verbatim to `path` inside the image.
    WriteFile {
        /// Absolute path inside the image.
        path: String,
        /// File content.
        content: String,
    },
    /// Default command, exec form.
    Cmd(Vec<String>),
}

impl Instruction {
    fn key(&self) -> Option<(&'static str, &str)> {
        match self {
            Self::Label { key, .. } => Some(("LABEL", key)),
            Self::Env { key, .. } => Some(("ENV", key)),
            Self::Arg { name, .. } => Some(("ARG", name)),
            Self::WriteFile { path, .. } => Some(("file", path)),
            Self::Cmd(_) => Some(("CMD", "")),
            Self::Run(_) => None,
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Self::Label { key, value } => {
                let _ = writeln!(out, "LABEL {key}={}", quote_value(value));
            }
            Self::Env { key, value } => {
                let _ = writeln!(out, "ENV {key}={}", quote_value(value));
            }
            Self::Arg { name, default } => {
                let _ = writeln!(out, "ARG {name}={}", quote_value(default));
            }
            Self::Run(command) => {
                let _ = writeln!(out, "RUN {command}");
            }
            Self::WriteFile { path, content } => {
                let parent = Path::new(path)
                    .parent()
                    .map_or_else(|| "/".to_string(), |p| p.display().to_string());
                let delimiter = heredoc_delimiter(content);
                let _ = writeln!(out, "RUN mkdir -p {}", shell_quote(&parent));
                let _ = writeln!(out, "RUN cat > {} <<'{delimiter}'", shell_quote(path));
                out.push_str(content);
                if !content.ends_with('\n') {
                    out.push('\n');
                }
                let _ = writeln!(out, "{delimiter}");
            }
            Self::Cmd(argv) => {
                let array = Value::Array(argv.iter().cloned().map(Value::String).collect());
                let _ = writeln!(out, "CMD {array}");
            }
        }
    }
}

/// Build instructions that embed one payload into the base image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationArtifact {
    /// Image the instructions are appended to.
    pub base_image: String,
    /// Instructions after `FROM`, in order.
    pub instructions: Vec<Instruction>,
    /// `--build-arg` values to pass to the container tool.
    pub build_args: Vec<(String, String)>,
}

impl MutationArtifact {
    /// Renders the artifact as a Dockerfile.
    #[must_use]
    pub fn to_dockerfile(&self) -> String {
        let mut out = String::new();
        if self
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::WriteFile { .. }))
        {
            out.push_str("# syntax=docker/dockerfile:1.4\n");
        }
        let _ = writeln!(out, "FROM {}", self.base_image);
        for instruction in &self.instructions {
            instruction.write_to(&mut out);
        }
        out
    }
}

/// Canary marker for a case.
#[must_use]
pub fn canary_for(case_id: &str) -> String {
    format!("{CANARY_PREFIX}{}", sanitize_component(case_id))
}

/// Renders the mutation artifact for `case`.
///
/// # Errors
///
/// Returns `TaintboxError::Render` if two instructions of the same kind
/// share a key (for instance a trace label and the payload label), and
/// `TaintboxError::Schema` if a file case has no path.
pub fn render(
    base_image: &str,
    case: &Case,
    canary: &str,
    options: &RenderOptions,
) -> Result<MutationArtifact> {
    let mut instructions = Vec::new();
    let mut build_args = Vec::new();

    if options.trace_labels_enabled {
        let prefix = &options.trace_label_prefix;
        for (name, value) in [("case_id", case.id.as_str()), ("canary", canary), ("carrier", case.carrier.as_str())] {
            instructions.push(Instruction::Label {
                key: format!("{prefix}.{name}"),
                value: value.to_string(),
            });
        }
    }

    let inline = inline_payload(&case.payload);
    match case.carrier {
        Carrier::Label => instructions.push(Instruction::Label {
            key: options.payload_label_key.clone(),
            value: inline,
        }),
        Carrier::Env => instructions.push(Instruction::Env {
            key: options.payload_env_key.clone(),
            value: inline,
        }),
        Carrier::Arg => {
            let name = options.payload_arg_key.clone();
            instructions.push(Instruction::Arg {
                name: name.clone(),
                default: inline.clone(),
            });
            instructions.push(Instruction::Run(format!("test -n \"${name}\"")));
            build_args.push((name, inline));
        }
        Carrier::File => {
            let path = case
                .path
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| {
                    TaintboxError::schema(format!("case {}", case.id), "carrier=file requires 'path'")
                })?;
            instructions.push(Instruction::WriteFile {
                path: path.to_string(),
                content: case.payload.clone(),
            });
        }
        Carrier::Cmd => {
            let escaped = inline
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('$', "\\$")
                .replace('`', "\\`");
            instructions.push(Instruction::Cmd(vec![
                "sh".into(),
                "-lc".into(),
                format!("echo \"{escaped}\""),
            ]));
        }
    }

    check_conflicts(&case.id, &instructions)?;
    tracing::debug!(case_id = %case.id, carrier = %case.carrier, instructions = instructions.len(), "rendered artifact");
    Ok(MutationArtifact {
        base_image: base_image.to_string(),
        instructions,
        build_args,
    })
}

fn check_conflicts(case_id: &str, instructions: &[Instruction]) -> Result<()> {
    let mut seen = HashSet::new();
    for (kind, key) in instructions.iter().filter_map(Instruction::key) {
        if !seen.insert((kind, key)) {
            return Err(TaintboxError::Render {
                case_id: case_id.to_string(),
                message: format!("{kind} '{key}' would be emitted twice"),
            });
        }
    }
    Ok(())
}

/// Flattens a payload onto one line.
fn inline_payload(payload: &str) -> String {
    payload.replace(['\r', '\n'], " ").trim().to_string()
}

/// Double-quotes a Dockerfile value, escaping quotes, backslashes, and `$`.
fn quote_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// POSIX shell quoting: safe words stay bare, everything else is single-quoted.
fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ',' | ':' | '@' | '%' | '+' | '='));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\"'\"'"))
    }
}

fn heredoc_delimiter(content: &str) -> String {
    let mut delimiter = "EOF".to_string();
    let mut n = 0;
    while content.lines().any(|line| line.trim() == delimiter) {
        n += 1;
        delimiter = format!("EOF_{n}");
    }
    delimiter
}
