//! Raw source retrieval.
//!
//! The pipeline only sees bytes or a `TaintboxError::Fetch`; transport
//! details stay behind the [`Fetcher`] trait.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use taintbox_common::constants::APP_NAME;
use taintbox_common::error::{Result, TaintboxError};

/// Retrieves the raw body behind a source URL.
pub trait Fetcher {
    /// Fetches the body at `url`.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Fetch` if the body cannot be retrieved.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches `http(s)://` URLs with a bounded timeout and reads `file://` URLs from disk.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `TaintboxError::Config` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TaintboxError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn fetch_remote(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().map_err(|e| TaintboxError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(TaintboxError::Fetch {
                url: url.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().map_err(|e| TaintboxError::Fetch {
            url: url.to_string(),
            message: format!("failed to read response body: {e}"),
        })?;
        tracing::debug!(url, bytes = bytes.len(), "fetched source");
        Ok(bytes.to_vec())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            read_local(url, Path::new(path))
        } else if url.starts_with("https://") || url.starts_with("http://") {
            self.fetch_remote(url)
        } else {
            Err(TaintboxError::Fetch {
                url: url.to_string(),
                message: "unsupported URL scheme".into(),
            })
        }
    }
}

fn read_local(url: &str, path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| TaintboxError::Fetch {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Serves fixed bodies keyed by URL; unknown URLs fail to fetch.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    bodies: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    /// Creates an empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a body for `url`, builder style.
    #[must_use]
    pub fn with(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let _ = self.bodies.insert(url.into(), body.into());
        self
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.bodies.get(url).cloned().ok_or_else(|| TaintboxError::Fetch {
            url: url.to_string(),
            message: "unreachable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use taintbox_common::error::ErrorKind;

    use super::*;

    #[test]
    fn file_url_reads_local_body() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, b"[]").expect("write");

        let fetcher = HttpFetcher::new(Duration::from_secs(1)).expect("client");
        let body = fetcher
            .fetch(&format!("file://{}", path.display()))
            .expect("fetch failed");
        assert_eq!(body, b"[]");
    }

    #[test]
    fn missing_file_url_is_fetch_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).expect("client");
        let err = fetcher.fetch("file:///nonexistent/prompts.json").expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Fetch);
    }

    #[test]
    fn unknown_scheme_is_fetch_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).expect("client");
        assert!(fetcher.fetch("ftp://example.com/prompts.csv").is_err());
    }

    #[test]
    fn memory_fetcher_serves_registered_body() {
        let fetcher = MemoryFetcher::new().with("mem://a", "hello");
        assert_eq!(fetcher.fetch("mem://a").expect("fetch"), b"hello");
        assert!(fetcher.fetch("mem://b").is_err());
    }
}
