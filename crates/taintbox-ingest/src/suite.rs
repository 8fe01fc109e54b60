//! Persisting generated cases as a suite file.

use std::path::Path;

use taintbox_common::error::{Result, TaintboxError};
use taintbox_common::types::Case;

/// Writes `cases` to `path` as a pretty JSON array with a trailing newline.
///
/// Every case is validated first; nothing is written if one fails.
///
/// # Errors
///
/// Returns `TaintboxError::Schema` for an invalid case and
/// `TaintboxError::Io` if the file or its parent cannot be written.
pub fn write_suite(path: &Path, cases: &[Case]) -> Result<()> {
    for case in cases {
        let _ = case.clone().validate()?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TaintboxError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut json = serde_json::to_string_pretty(cases)?;
    json.push('\n');
    std::fs::write(path, json).map_err(|e| TaintboxError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), cases = cases.len(), "wrote suite");
    Ok(())
}
