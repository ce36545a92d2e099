//! Session providers: where raw sessions come from.

use crate::raw::RawSession;
use async_trait::async_trait;
use fviz_core::IngestionError;
use std::path::PathBuf;
use std::time::Duration;

/// An upstream source of raw session data.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn fetch(&self, session_id: &str) -> Result<RawSession, IngestionError>;
}

/// Reads sessions from a local archive: one JSON document per session
/// under the data directory.
pub struct ArchiveProvider {
    data_dir: PathBuf,
}

impl ArchiveProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.data_dir.join(format!("{session_id}.json"))
    }
}

#[async_trait]
impl SessionProvider for ArchiveProvider {
    async fn fetch(&self, session_id: &str) -> Result<RawSession, IngestionError> {
        let path = self.session_path(session_id);
        tracing::debug!(path = %path.display(), "reading session archive");
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| IngestionError::Unreachable(format!("{}: {e}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| IngestionError::Malformed(format!("{}: {e}", path.display())))
    }
}

/// Fetches sessions over HTTP from the structured feed.
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, IngestionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IngestionError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SessionProvider for HttpProvider {
    async fn fetch(&self, session_id: &str) -> Result<RawSession, IngestionError> {
        let url = format!("{}/sessions/{}", self.base_url, session_id);
        tracing::debug!(%url, "fetching session");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IngestionError::Unreachable(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(IngestionError::Unreachable(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| IngestionError::Malformed(format!("{url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_archive_is_unreachable() {
        let provider = ArchiveProvider::new("/nonexistent/dir");
        let err = provider.fetch("2025-monza-q").await.unwrap_err();
        assert!(matches!(err, IngestionError::Unreachable(_)));
    }

    #[tokio::test]
    async fn malformed_archive_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let provider = ArchiveProvider::new(dir.path());
        let err = provider.fetch("bad").await.unwrap_err();
        assert!(matches!(err, IngestionError::Malformed(_)));
    }
}
