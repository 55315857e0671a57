use crate::{decode_provider_payload, GovernanceCategory, GovernanceProvider};
use async_trait::async_trait;
use digest_core::{status_error, ChainConfig, CoreError, ProviderError};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

const PROVIDER: &str = "chain-query";

/// Client for the chain-query bridge: `GET {endpoint}/{category}`.
#[derive(Debug, Clone)]
pub struct ChainQueryClient {
    http_client: Client,
    endpoint: Url,
}

impl ChainQueryClient {
    pub fn new(endpoint: &str, config: &ChainConfig) -> Result<Self, CoreError> {
        let mut base = endpoint.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base).map_err(|e| CoreError::InvalidInput {
            message: format!("chain endpoint '{}': {}", base, e),
        })?;
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl GovernanceProvider for ChainQueryClient {
    async fn fetch(&self, category: GovernanceCategory) -> Result<Vec<Value>, CoreError> {
        let url = self
            .endpoint
            .join(category.slug())
            .map_err(|e| CoreError::InvalidInput {
                message: e.to_string(),
            })?;
        debug!("Querying chain bridge: GET {}", url);

        let response = self.http_client.get(url).send().await.map_err(|e| {
            error!("Chain bridge unreachable for {}: {}", category, e);
            if e.is_timeout() {
                ProviderError::RequestTimeout {
                    provider: PROVIDER.to_string(),
                }
            } else {
                ProviderError::Unavailable {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await?;
        let payload = serde_json::from_str::<Value>(&body);

        if !status.is_success() {
            // The bridge reports its own failures through the {error} envelope.
            if let Ok(payload @ Value::Object(_)) = payload {
                if payload.get("error").is_some() {
                    return Err(decode_provider_payload(PROVIDER, payload)
                        .err()
                        .unwrap_or_else(|| {
                            status_error(PROVIDER, status.as_u16(), retry_after, category.slug())
                        })
                        .into());
                }
            }
            return Err(status_error(PROVIDER, status.as_u16(), retry_after, category.slug()).into());
        }

        let payload = payload.map_err(|e| ProviderError::InvalidPayload {
            provider: PROVIDER.to_string(),
            details: format!("{}: {}", category, e),
        })?;
        Ok(decode_provider_payload(PROVIDER, payload)?)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
