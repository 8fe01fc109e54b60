//! Domain primitive types shared by the ingestion and build pipelines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaintboxError};

/// Mechanism by which a payload is embedded into an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    /// Image metadata label.
    Label,
    /// Environment variable.
    Env,
    /// File written into the image filesystem.
    File,
    /// Build argument consumed at build time.
    Arg,
    /// Default container command echoing the payload.
    Cmd,
}

impl Carrier {
    /// Every supported carrier, in canonical order.
    pub const ALL: [Self; 5] = [Self::Label, Self::Env, Self::File, Self::Arg, Self::Cmd];

    /// Lowercase name as used in configuration, tags, and runlists.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Env => "env",
            Self::File => "file",
            Self::Arg => "arg",
            Self::Cmd => "cmd",
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Carrier {
    type Err = TaintboxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| TaintboxError::config(format!("unknown carrier: \"{s}\"")))
    }
}

/// A single test case: one payload bound to one carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    /// Identifier, unique within a suite.
    pub id: String,
    /// Carrier used to embed the payload.
    pub carrier: Carrier,
    /// Adversarial string under test.
    pub payload: String,
    /// Target path inside the image; only meaningful for [`Carrier::File`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Case {
    /// Creates a case without a path.
    #[must_use]
    pub fn new(id: impl Into<String>, carrier: Carrier, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            carrier,
            payload: payload.into(),
            path: None,
        }
    }

    /// Sets the file path, builder style.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Checks the case against the schema and normalizes it.
    ///
    /// A `path` on a non-file carrier is dropped.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Schema` if the id or payload is blank, or a
    /// file-carrier case has no path.
    pub fn validate(mut self) -> Result<Self> {
        if self.id.trim().is_empty() {
            return Err(TaintboxError::schema("case", "missing required field: id"));
        }
        if self.payload.trim().is_empty() {
            return Err(TaintboxError::schema(
                format!("case {}", self.id),
                "missing required field: payload",
            ));
        }
        match self.carrier {
            Carrier::File => {
                if self.path.as_deref().is_none_or(|p| p.trim().is_empty()) {
                    return Err(TaintboxError::schema(
                        format!("case {}", self.id),
                        "carrier=file requires non-empty 'path'",
                    ));
                }
            }
            _ => {
                if self.path.take().is_some() {
                    tracing::debug!(case_id = %self.id, carrier = %self.carrier, "ignoring path on non-file carrier");
                }
            }
        }
        Ok(self)
    }
}

/// Replaces every character outside `[A-Za-z0-9._-]` with `-`.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Substitutes `{name}` placeholders in a path template.
///
/// Unknown placeholders are left untouched.
#[must_use]
pub fn fill_path_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}
