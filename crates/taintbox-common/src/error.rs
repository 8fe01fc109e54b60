//! Unified error types for the taintbox workspace.
//!
//! Record-level and case-level variants (`Schema`, `Fetch`, `Parse`,
//! `Render`, `Build`, `Push`) are caught and recorded by the pipelines;
//! run-level variants (`Config`, `Io` on inputs) propagate to the binary.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum TaintboxError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is malformed or contradictory.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A case or source spec failed validation.
    #[error("schema violation in {record}: {message}")]
    Schema {
        /// Identifier of the offending record.
        record: String,
        /// What was wrong with it.
        message: String,
    },

    /// A remote source could not be fetched.
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        /// URL that was requested.
        url: String,
        /// Transport or status failure.
        message: String,
    },

    /// A source body or record could not be parsed.
    #[error("parse error in {source_id}: {message}")]
    Parse {
        /// Source the body came from.
        source_id: String,
        /// Parser failure.
        message: String,
    },

    /// Two instructions in a mutation artifact map to the same key.
    #[error("instruction conflict for case {case_id}: {message}")]
    Render {
        /// Case whose artifact could not be rendered.
        case_id: String,
        /// The conflicting keys.
        message: String,
    },

    /// The container tool reported a build failure.
    #[error("build failed for {tag}: {message}")]
    Build {
        /// Image reference that was being built.
        tag: String,
        /// Tool output or spawn failure.
        message: String,
    },

    /// The image was built but could not be pushed.
    #[error("push failed for {tag}: {message}")]
    Push {
        /// Image reference that was being pushed.
        tag: String,
        /// Tool output or spawn failure.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl TaintboxError {
    /// Returns the coarse kind of this error, as recorded in run output.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Configuration,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::Parse { .. } | Self::Serialization { .. } => ErrorKind::Parse,
            Self::Render { .. } => ErrorKind::Render,
            Self::Build { .. } => ErrorKind::Build,
            Self::Push { .. } => ErrorKind::Push,
        }
    }

    /// Shorthand for a [`TaintboxError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Shorthand for a [`TaintboxError::Schema`].
    pub fn schema(record: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            record: record.into(),
            message: message.into(),
        }
    }
}

/// Error classification written into runlists and ingestion reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Filesystem failure.
    Io,
    /// Malformed or contradictory configuration.
    Configuration,
    /// Record failed validation.
    Schema,
    /// Remote source unreachable.
    Fetch,
    /// Malformed body or record.
    Parse,
    /// Instruction key conflict.
    Render,
    /// Container build failure.
    Build,
    /// Push failure after a successful build.
    Push,
    /// Run cancelled before the case was attempted.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Io => "io",
            Self::Configuration => "configuration",
            Self::Schema => "schema",
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Render => "render",
            Self::Build => "build",
            Self::Push => "push",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TaintboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_push_errors_have_distinct_kinds() {
        let build = TaintboxError::Build {
            tag: "t".into(),
            message: "exit 1".into(),
        };
        let push = TaintboxError::Push {
            tag: "t".into(),
            message: "denied".into(),
        };
        assert_eq!(build.kind(), ErrorKind::Build);
        assert_eq!(push.kind(), ErrorKind::Push);
        assert_ne!(build.kind(), push.kind());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::Configuration).expect("serialize");
        assert_eq!(json, "\"configuration\"");
    }

    #[test]
    fn schema_error_message_names_record() {
        let err = TaintboxError::schema("case c1", "missing payload");
        assert_eq!(err.to_string(), "schema violation in case c1: missing payload");
    }
}
