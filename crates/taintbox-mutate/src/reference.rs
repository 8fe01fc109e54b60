//! Fully qualified image references.

use std::fmt;

use taintbox_common::error::{Result, TaintboxError};

/// `<registry>/<repo>/<image_name>:<tag>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: String,
    repo: String,
    image_name: String,
    tag: String,
}

impl ImageRef {
    /// Builds a reference, trimming whitespace and stray slashes.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Config` if registry, repo, or image name is
    /// empty after trimming.
    pub fn new(registry: &str, repo: &str, image_name: &str, tag: &str) -> Result<Self> {
        let registry = registry.trim().trim_end_matches('/');
        let repo = repo.trim().trim_matches('/');
        let image_name = image_name.trim().trim_matches('/');
        if registry.is_empty() || repo.is_empty() || image_name.is_empty() {
            return Err(TaintboxError::config("registry, repo, and image_name must be non-empty"));
        }
        Ok(Self {
            registry: registry.to_string(),
            repo: repo.to_string(),
            image_name: image_name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Returns the tag part.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}:{}", self.registry, self.repo, self.image_name, self.tag)
    }
}
