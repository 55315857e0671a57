//! Governance data providers.
//!
//! The chain-query bridge answers one request per governance category with a
//! JSON array, or with `{"error": "..."}`. Categories are fetched and degrade
//! independently: a failed treasury query still leaves referenda usable.

pub mod http;

pub use digest_core::decode_provider_payload;
pub use http::ChainQueryClient;

use async_trait::async_trait;
use digest_core::{CoreError, ProviderError, RetryExecutor};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GovernanceCategory {
    Referenda,
    Treasury,
    Bounties,
}

impl GovernanceCategory {
    pub const ALL: [GovernanceCategory; 3] = [
        GovernanceCategory::Referenda,
        GovernanceCategory::Treasury,
        GovernanceCategory::Bounties,
    ];

    /// Path segment on the bridge and file stem in a snapshot directory.
    pub fn slug(&self) -> &'static str {
        match self {
            GovernanceCategory::Referenda => "referenda",
            GovernanceCategory::Treasury => "treasury",
            GovernanceCategory::Bounties => "bounties",
        }
    }
}

impl fmt::Display for GovernanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[async_trait]
pub trait GovernanceProvider: Send + Sync {
    async fn fetch(&self, category: GovernanceCategory) -> Result<Vec<Value>, CoreError>;

    fn name(&self) -> &str;
}

/// Reads `referenda.json`, `treasury.json` and `bounties.json` from a
/// directory. A missing file means that category had nothing to report.
#[derive(Debug, Clone)]
pub struct SnapshotDirProvider {
    dir: PathBuf,
}

impl SnapshotDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl GovernanceProvider for SnapshotDirProvider {
    async fn fetch(&self, category: GovernanceCategory) -> Result<Vec<Value>, CoreError> {
        let path = self.dir.join(format!("{}.json", category.slug()));
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No {} snapshot at {}", category, path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(ProviderError::Unavailable {
                    provider: self.name().to_string(),
                    reason: format!("{}: {}", path.display(), e),
                }
                .into())
            }
        };
        let payload: Value =
            serde_json::from_str(&content).map_err(|e| ProviderError::InvalidPayload {
                provider: self.name().to_string(),
                details: format!("{}: {}", path.display(), e),
            })?;
        Ok(decode_provider_payload(self.name(), payload)?)
    }

    fn name(&self) -> &str {
        "governance-snapshot"
    }
}

/// Raw records for one category, or an empty batch if the provider failed.
#[derive(Debug, Clone, Default)]
pub struct DomainFetch {
    pub records: Vec<Value>,
    pub degraded: Option<String>,
}

impl DomainFetch {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GovernanceSnapshot {
    pub referenda: DomainFetch,
    pub treasury: DomainFetch,
    pub bounties: DomainFetch,
}

impl GovernanceSnapshot {
    /// True when no category produced data because every one failed.
    pub fn all_degraded(&self) -> bool {
        self.referenda.is_degraded() && self.treasury.is_degraded() && self.bounties.is_degraded()
    }

    pub fn degraded_categories(&self) -> Vec<String> {
        [
            (GovernanceCategory::Referenda, &self.referenda),
            (GovernanceCategory::Treasury, &self.treasury),
            (GovernanceCategory::Bounties, &self.bounties),
        ]
        .iter()
        .filter_map(|(category, fetch)| {
            fetch
                .degraded
                .as_ref()
                .map(|reason| format!("{}: {}", category, reason))
        })
        .collect()
    }
}

/// Fetches every category through the retry executor. Failures are logged
/// and leave that category empty.
pub async fn fetch_snapshot(
    provider: &dyn GovernanceProvider,
    retry: &RetryExecutor,
) -> GovernanceSnapshot {
    let (referenda, treasury, bounties) = tokio::join!(
        fetch_category(provider, retry, GovernanceCategory::Referenda),
        fetch_category(provider, retry, GovernanceCategory::Treasury),
        fetch_category(provider, retry, GovernanceCategory::Bounties),
    );
    GovernanceSnapshot {
        referenda,
        treasury,
        bounties,
    }
}

async fn fetch_category(
    provider: &dyn GovernanceProvider,
    retry: &RetryExecutor,
    category: GovernanceCategory,
) -> DomainFetch {
    let operation = format!("{} {}", provider.name(), category);
    let outcome = retry
        .execute(&operation, || provider.fetch(category))
        .await;
    match outcome.result {
        Ok(records) => {
            info!(
                category = %category,
                records = records.len(),
                attempts = outcome.attempts,
                "Fetched governance records"
            );
            DomainFetch {
                records,
                degraded: None,
            }
        }
        Err(e) => {
            warn!(
                category = %category,
                attempts = outcome.attempts,
                error = %e,
                "Governance provider failed; continuing without this category"
            );
            DomainFetch {
                records: Vec::new(),
                degraded: Some(e.to_string()),
            }
        }
    }
}
