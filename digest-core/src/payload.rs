//! Wire contract shared by every data provider: a JSON array of records on
//! success, `{"error": "..."}` on failure.

use crate::error::ProviderError;
use serde_json::Value;

pub fn decode_provider_payload(provider: &str, payload: Value) -> Result<Vec<Value>, ProviderError> {
    match payload {
        Value::Array(records) => Ok(records),
        Value::Object(mut object) => match object.remove("error") {
            Some(Value::String(message)) => Err(ProviderError::Reported {
                provider: provider.to_string(),
                message,
            }),
            Some(other) => Err(ProviderError::Reported {
                provider: provider.to_string(),
                message: other.to_string(),
            }),
            None => Err(ProviderError::InvalidPayload {
                provider: provider.to_string(),
                details: "expected a JSON array or an {error} object".to_string(),
            }),
        },
        other => Err(ProviderError::InvalidPayload {
            provider: provider.to_string(),
            details: format!("unexpected top-level JSON {}", json_kind(&other)),
        }),
    }
}

/// Maps a non-success HTTP status to the provider taxonomy.
pub fn status_error(
    provider: &str,
    status: u16,
    retry_after: Option<u64>,
    resource: &str,
) -> ProviderError {
    let provider = provider.to_string();
    match status {
        429 => ProviderError::RateLimitExceeded {
            provider,
            retry_after: retry_after.unwrap_or(60),
        },
        401 | 403 => ProviderError::Forbidden {
            provider,
            resource: resource.to_string(),
        },
        404 => ProviderError::NotFound {
            provider,
            resource: resource.to_string(),
        },
        408 => ProviderError::RequestTimeout { provider },
        status_code => ProviderError::ServerError {
            provider,
            status_code,
        },
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_is_records() {
        let records = decode_provider_payload("chain", json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_error_envelope_is_reported() {
        let err = decode_provider_payload("chain", json!({"error": "RPC timeout"})).unwrap_err();
        assert_eq!(
            err,
            ProviderError::Reported {
                provider: "chain".to_string(),
                message: "RPC timeout".to_string()
            }
        );
    }

    #[test]
    fn test_other_shapes_are_invalid() {
        assert!(matches!(
            decode_provider_payload("chain", json!({"data": []})),
            Err(ProviderError::InvalidPayload { .. })
        ));
        assert!(matches!(
            decode_provider_payload("chain", json!("ok")),
            Err(ProviderError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_error("forum", 429, Some(7), "/latest.json"),
            ProviderError::RateLimitExceeded {
                provider: "forum".to_string(),
                retry_after: 7
            }
        );
        assert!(matches!(
            status_error("forum", 404, None, "/latest.json"),
            ProviderError::NotFound { .. }
        ));
        assert!(matches!(
            status_error("forum", 503, None, "/latest.json"),
            ProviderError::ServerError {
                status_code: 503,
                ..
            }
        ));
    }
}
