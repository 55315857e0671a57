//! Run configuration.
//!
//! Built once at process entry (TOML file, then CLI overrides) and passed by
//! reference to every component.

use crate::amount::{Balance, Ratio};
use crate::error::ConfigError;
use crate::rate_limiter::RateLimitConfig;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub forum: ForumConfig,
    pub chain: ChainConfig,
    pub content: ContentConfig,
    pub risk: RiskConfig,
    pub report: ReportConfig,
    pub newsletter: NewsletterConfig,
    pub distribution: DistributionConfig,
    /// Retry policy for data provider calls.
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
    pub base_url: String,
    /// Read posts from a JSON file instead of the live forum.
    pub snapshot_path: Option<PathBuf>,
    pub max_pages: u32,
    pub timeout_secs: u64,
    pub rate_limit: RateLimitConfig,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: "https://forum.polkadot.network".to_string(),
            snapshot_path: None,
            max_pages: 3,
            timeout_secs: 30,
            rate_limit: RateLimitConfig::discourse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Base URL of the chain-query bridge.
    pub endpoint: Option<String>,
    /// Directory holding referenda.json / treasury.json / bounties.json.
    pub snapshot_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            snapshot_dir: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub max_keywords: usize,
    pub max_hot_topics: usize,
    pub max_tags: usize,
    pub min_token_len: usize,
    pub extra_stop_words: Vec<String>,
    pub views_weight: f64,
    pub replies_weight: f64,
    pub recency_weight: f64,
    pub half_life_days: f64,
    pub influence_views_weight: f64,
    pub influence_replies_weight: f64,
    pub mention_weight: f64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_keywords: 10,
            max_hot_topics: 50,
            max_tags: 50,
            min_token_len: 3,
            extra_stop_words: Vec::new(),
            views_weight: 0.3,
            replies_weight: 2.5,
            recency_weight: 5.0,
            half_life_days: 7.0,
            influence_views_weight: 1.0,
            influence_replies_weight: 5.0,
            mention_weight: 3.0,
        }
    }
}

/// Per-track minimums in Perbill (parts per billion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackThresholds {
    pub min_approval_perbill: u32,
    pub min_support_perbill: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Electorate used as the support denominator, in plancks.
    pub total_issuance: String,
    pub token_decimals: u32,
    pub token_symbol: String,
    pub high_margin_percent: u32,
    pub medium_margin_percent: u32,
    pub default_min_approval_perbill: u32,
    pub default_min_support_perbill: u32,
    /// Keyed by track name.
    pub track_overrides: BTreeMap<String, TrackThresholds>,
    pub risk_keywords: Vec<String>,
    /// k in `mean + k * stddev`, as a decimal string.
    pub outlier_sigma: String,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            total_issuance: "15000000000000000000".to_string(),
            token_decimals: 10,
            token_symbol: "DOT".to_string(),
            high_margin_percent: 10,
            medium_margin_percent: 25,
            default_min_approval_perbill: 500_000_000,
            default_min_support_perbill: 10_000_000,
            track_overrides: BTreeMap::new(),
            risk_keywords: [
                "root",
                "sudo",
                "set_code",
                "force",
                "kill",
                "upgrade",
                "authorize_upgrade",
                "whitelisted_caller",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            outlier_sigma: "2".to_string(),
        }
    }
}

impl RiskConfig {
    pub fn electorate(&self) -> Result<Balance, ConfigError> {
        self.total_issuance
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "risk.total_issuance".to_string(),
                value: self.total_issuance.clone(),
            })
    }

    pub fn outlier_k(&self) -> Result<Ratio, ConfigError> {
        Ratio::from_decimal_str(&self.outlier_sigma).map_err(|_| ConfigError::InvalidValue {
            field: "risk.outlier_sigma".to_string(),
            value: self.outlier_sigma.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub engagement_threshold: f64,
    pub participation_min_posts: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            engagement_threshold: 500.0,
            participation_min_posts: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsletterConfig {
    pub title: String,
    pub top_posts: usize,
    pub top_keywords: usize,
    pub top_proposals: usize,
    pub unsubscribe_url: String,
    /// Link target for referenda in the governance block.
    pub referendum_url_base: String,
}

impl Default for NewsletterConfig {
    fn default() -> Self {
        Self {
            title: "Polkadot Community Digest".to_string(),
            top_posts: 10,
            top_keywords: 15,
            top_proposals: 5,
            unsubscribe_url: "https://digest.example.org/unsubscribe".to_string(),
            referendum_url_base: "https://polkadot.polkassembly.io/referenda".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub from_address: String,
    pub reply_to: Option<String>,
    pub resend_base_url: String,
    pub api_key: Option<String>,
    pub database_url: String,
    pub concurrency: usize,
    pub test_recipient: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            from_address: "Community Digest <digest@example.org>".to_string(),
            reply_to: None,
            resend_base_url: "https://api.resend.com".to_string(),
            api_key: None,
            database_url: "sqlite://community_digest.db".to_string(),
            concurrency: 4,
            test_recipient: None,
            rate_limit: RateLimitConfig::email_provider(),
            retry: RetryConfig::delivery(),
        }
    }
}

impl DigestConfig {
    /// Loads a TOML file. A missing file yields the defaults unless the
    /// caller insisted on it.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        if !path.exists() {
            if required {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            value: format!("{}: {}", path.display(), e),
        })?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.electorate()?;
        self.risk.outlier_k()?;

        if self.content.half_life_days <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "content.half_life_days".to_string(),
                value: self.content.half_life_days.to_string(),
            });
        }
        if self.content.min_token_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "content.min_token_len".to_string(),
                value: "0".to_string(),
            });
        }
        if self.distribution.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "distribution.concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        if self.retry.max_attempts == 0 || self.distribution.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        for (track, thresholds) in &self.risk.track_overrides {
            if thresholds.min_approval_perbill > 1_000_000_000
                || thresholds.min_support_perbill > 1_000_000_000
            {
                return Err(ConfigError::InvalidValue {
                    field: format!("risk.track_overrides.{}", track),
                    value: "perbill above 1_000_000_000".to_string(),
                });
            }
        }
        Ok(())
    }
}
