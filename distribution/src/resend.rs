use crate::{EmailTransport, OutboundEmail};
use async_trait::async_trait;
use digest_core::{CoreError, DeliveryError, DistributionConfig};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Resend HTTP API transport.
#[derive(Debug, Clone)]
pub struct ResendTransport {
    http_client: Client,
    emails_url: Url,
    api_key: String,
}

impl ResendTransport {
    pub fn new(config: &DistributionConfig) -> Result<Self, CoreError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| DeliveryError::NotConfigured {
                reason: "no Resend API key configured".to_string(),
            })?;

        let mut base = config.resend_base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let emails_url = Url::parse(&base)
            .and_then(|u| u.join("emails"))
            .map_err(|e| CoreError::InvalidInput {
                message: format!("resend base url '{}': {}", base, e),
            })?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            emails_url,
            api_key,
        })
    }
}

#[async_trait]
impl EmailTransport for ResendTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<String, DeliveryError> {
        let body = SendRequest {
            from: &email.from,
            to: [email.to.as_str()],
            subject: &email.subject,
            html: &email.html,
            reply_to: email.reply_to.as_deref(),
        };

        let response = self
            .http_client
            .post(self.emails_url.clone())
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", &email.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            let parsed: SendResponse =
                response.json().await.map_err(|e| DeliveryError::Transient {
                    reason: format!("unreadable send response: {}", e),
                })?;
            debug!(to = %email.to, message_id = %parsed.id, "Email accepted by Resend");
            return Ok(parsed.id);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let detail = response.text().await.unwrap_or_default();
        warn!(to = %email.to, status = status.as_u16(), "Resend rejected send: {}", detail);

        Err(classify_status(status, retry_after, &email.to, detail))
    }

    fn name(&self) -> &str {
        "resend"
    }
}

fn classify_status(
    status: StatusCode,
    retry_after: Option<u64>,
    recipient: &str,
    detail: String,
) -> DeliveryError {
    match status.as_u16() {
        429 => DeliveryError::RateLimited {
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        408 | 500..=599 => DeliveryError::Transient {
            reason: format!("HTTP {}: {}", status.as_u16(), detail),
        },
        401 | 403 => DeliveryError::NotConfigured {
            reason: format!("HTTP {}: {}", status.as_u16(), detail),
        },
        422 => DeliveryError::InvalidRecipient {
            recipient: recipient.to_string(),
            reason: detail,
        },
        code => DeliveryError::Rejected {
            reason: format!("HTTP {}: {}", code, detail),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(5), "a", String::new()),
            DeliveryError::RateLimited { retry_after: 5 }
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None, "a", String::new()),
            DeliveryError::Transient { .. }
        ));
        assert!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, None, "a", String::new())
                .is_permanent()
        );
        assert!(classify_status(StatusCode::BAD_REQUEST, None, "a", String::new()).is_permanent());
    }

    #[test]
    fn test_missing_api_key_is_not_configured() {
        let err = ResendTransport::new(&DistributionConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Delivery(DeliveryError::NotConfigured { .. })
        ));
    }
}
