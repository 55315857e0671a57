//! Forum data providers. Each yields raw post records; validation happens
//! in the analyzer so one bad record never sinks a batch.

pub mod api;

pub use api::DiscourseClient;

use async_trait::async_trait;
use digest_core::{decode_provider_payload, CoreError, ProviderError};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

#[async_trait]
pub trait ForumProvider: Send + Sync {
    async fn fetch_posts(&self) -> Result<Vec<Value>, CoreError>;

    fn name(&self) -> &str;
}

/// Reads a previously harvested batch from disk.
#[derive(Debug, Clone)]
pub struct SnapshotForumProvider {
    path: PathBuf,
}

impl SnapshotForumProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ForumProvider for SnapshotForumProvider {
    async fn fetch_posts(&self) -> Result<Vec<Value>, CoreError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ProviderError::Unavailable {
                provider: self.name().to_string(),
                reason: format!("{}: {}", self.path.display(), e),
            }
        })?;
        let payload: Value =
            serde_json::from_str(&content).map_err(|e| ProviderError::InvalidPayload {
                provider: self.name().to_string(),
                details: e.to_string(),
            })?;
        let records = decode_provider_payload(self.name(), payload)?;
        info!(
            "Loaded {} forum records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }

    fn name(&self) -> &str {
        "forum-snapshot"
    }
}
