//! Transports that deliver raw route documents.
//!
//! A transport only moves bytes. Decoding and validation happen in the
//! ingestor, so every transport reports the same decode errors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, NetworkError, Result};

/// A source of remote route documents.
///
/// Implementors fetch the raw document for a validated route id. They must
/// not retry; retry policy belongs to the caller.
#[async_trait::async_trait]
pub trait RouteTransport: Send + Sync + std::fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch the raw document for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::NotFound`] if no document exists for `id` and
    /// another [`NetworkError`] if the transfer fails.
    async fn fetch(&self, id: &str) -> Result<Vec<u8>>;
}

/// Fetches `{base_url}/{id}.json` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL of the document for `id`.
    #[must_use]
    pub fn url_for(&self, id: &str) -> String {
        format!("{}/{id}.json", self.base_url)
    }
}

#[async_trait::async_trait]
impl RouteTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let url = self.url_for(id);
        debug!(url = %url, "Fetching route document");

        let request_failed = |e: reqwest::Error| NetworkError::Request {
            key: id.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(&url).send().await.map_err(request_failed)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(NetworkError::NotFound { key: id.to_string() }.into());
        }
        if !status.is_success() {
            return Err(NetworkError::Status {
                key: id.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let body = response.bytes().await.map_err(request_failed)?;
        Ok(body.to_vec())
    }
}

/// Reads `{root}/{id}.json` from a local directory, such as a synced share.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: PathBuf,
}

impl DirectoryTransport {
    /// Create a transport rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory documents are read from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl RouteTransport for DirectoryTransport {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.root.join(format!("{id}.json"));
        debug!(path = %path.display(), "Reading route document");

        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::from(NetworkError::NotFound { key: id.to_string() })
            } else {
                Error::from(NetworkError::Request {
                    key: id.to_string(),
                    message: e.to_string(),
                })
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory transport with an optional delay per fetch.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct StaticTransport {
        documents: HashMap<String, Vec<u8>>,
        delay: Option<Duration>,
        fetches: Arc<AtomicUsize>,
    }

    impl StaticTransport {
        pub(crate) fn with_document(mut self, id: &str, body: impl Into<Vec<u8>>) -> Self {
            self.documents.insert(id.to_string(), body.into());
            self
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl RouteTransport for StaticTransport {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.documents
                .get(id)
                .cloned()
                .ok_or_else(|| Error::from(NetworkError::NotFound { key: id.to_string() }))
        }
    }

    #[test]
    fn test_http_url_for() {
        let transport =
            HttpTransport::new("https://routes.example.org/v1/", Duration::from_secs(5), "trailbook-test")
                .unwrap();
        assert_eq!(
            transport.url_for("alps/lake-loop"),
            "https://routes.example.org/v1/alps/lake-loop.json"
        );
        assert_eq!(transport.name(), "http");
    }

    #[tokio::test]
    async fn test_directory_transport_reads_nested_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("alps")).unwrap();
        std::fs::write(dir.path().join("alps/lake.json"), b"{}").unwrap();

        let transport = DirectoryTransport::new(dir.path());
        assert_eq!(transport.fetch("alps/lake").await.unwrap(), b"{}");
        assert_eq!(transport.root(), dir.path());
    }

    #[tokio::test]
    async fn test_directory_transport_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let transport = DirectoryTransport::new(dir.path());

        let err = transport.fetch("missing").await.unwrap_err();
        assert!(matches!(err, Error::Network(NetworkError::NotFound { .. })));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_static_transport_counts_fetches() {
        let transport = StaticTransport::default().with_document("a", "doc");
        assert_eq!(transport.fetch("a").await.unwrap(), b"doc");
        assert!(transport.fetch("b").await.is_err());
        assert_eq!(transport.fetches(), 2);
    }
}
