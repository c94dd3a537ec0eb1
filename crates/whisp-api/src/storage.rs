use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

/// Client for the upload provider's deletion API. The provider holds the
/// media bytes; this service only ever passes URLs and keys around, and
/// the one write it performs against the provider is deletion.
#[derive(Clone)]
pub struct StorageClient {
    inner: Option<Arc<StorageInner>>,
}

struct StorageInner {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage api returned {0}")]
    Status(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl StorageClient {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            inner: Some(Arc::new(StorageInner {
                http: reqwest::Client::new(),
                api_url: api_url.trim_end_matches('/').to_string(),
                api_key,
            })),
        }
    }

    /// No-op client for setups without a storage API (local development,
    /// tests). Deletion requests are logged and dropped.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub async fn delete_files(&self, file_keys: &[String]) -> Result<(), StorageError> {
        if file_keys.is_empty() {
            return Ok(());
        }

        let Some(inner) = &self.inner else {
            warn!(
                "Storage API not configured; skipping deletion of {} file(s)",
                file_keys.len()
            );
            return Ok(());
        };

        let resp = inner
            .http
            .post(format!("{}/deleteFiles", inner.api_url))
            .header("x-api-key", &inner.api_key)
            .json(&serde_json::json!({ "fileKeys": file_keys }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(StorageError::Status(resp.status()));
        }
        Ok(())
    }
}
