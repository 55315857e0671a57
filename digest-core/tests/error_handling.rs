use digest_core::{
    retry, ConfigError, CoreError, DatabaseError, DeliveryError, ErrorExt, ProviderError,
    RecordKind, RecordParseError, RetryStrategy,
};
use std::time::Duration;

fn unavailable(provider: &str) -> ProviderError {
    ProviderError::Unavailable {
        provider: provider.to_string(),
        reason: "connection refused".to_string(),
    }
}

#[test]
fn test_error_codes() {
    let provider_error = CoreError::Provider(unavailable("chain-query"));
    assert_eq!(provider_error.error_code(), "PROVIDER");

    let db_error = CoreError::Database(DatabaseError::DatabaseLocked);
    assert_eq!(db_error.error_code(), "DATABASE");

    let delivery_error = CoreError::Delivery(DeliveryError::Rejected {
        reason: "domain not verified".to_string(),
    });
    assert_eq!(delivery_error.error_code(), "DELIVERY");

    let parse_error = CoreError::RecordParse(RecordParseError::new(
        RecordKind::Referendum,
        "#12",
        "bad tally",
    ));
    assert_eq!(parse_error.error_code(), "RECORD_PARSE");

    assert_eq!(
        CoreError::SynthesisInputsEmpty.error_code(),
        "SYNTHESIS_INPUTS_EMPTY"
    );
}

#[test]
fn test_retryable_errors() {
    assert!(CoreError::Provider(unavailable("forum")).is_retryable());
    assert!(CoreError::Delivery(DeliveryError::RateLimited { retry_after: 1 }).is_retryable());

    let permanent = CoreError::Delivery(DeliveryError::InvalidRecipient {
        recipient: "nobody".to_string(),
        reason: "missing domain".to_string(),
    });
    assert!(!permanent.is_retryable());

    let reported = CoreError::Provider(ProviderError::Reported {
        provider: "chain-query".to_string(),
        message: "unknown pallet".to_string(),
    });
    assert!(!reported.is_retryable());

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "api_key".to_string(),
    });
    assert!(!config_error.is_retryable());
}

#[test]
fn test_retry_after() {
    let rate_limit_error = CoreError::Provider(ProviderError::RateLimitExceeded {
        provider: "forum".to_string(),
        retry_after: 60,
    });
    assert_eq!(
        rate_limit_error.retry_after(),
        Some(Duration::from_secs(60))
    );

    let locked = CoreError::Database(DatabaseError::DatabaseLocked);
    assert_eq!(locked.retry_after(), Some(Duration::from_millis(100)));

    let invalid = CoreError::InvalidInput {
        message: "bad url".to_string(),
    };
    assert_eq!(invalid.retry_after(), None);
}

#[test]
fn test_retryable_matches_retry_strategy() {
    let errors = vec![
        CoreError::Provider(unavailable("forum")),
        CoreError::Provider(ProviderError::ServerError {
            provider: "forum".to_string(),
            status_code: 503,
        }),
        CoreError::Provider(ProviderError::ServerError {
            provider: "forum".to_string(),
            status_code: 418,
        }),
        CoreError::Provider(ProviderError::NotFound {
            provider: "chain-query".to_string(),
            resource: "/bounties".to_string(),
        }),
        CoreError::Delivery(DeliveryError::Transient {
            reason: "reset".to_string(),
        }),
        CoreError::Delivery(DeliveryError::Rejected {
            reason: "spam".to_string(),
        }),
        CoreError::Database(DatabaseError::DatabaseLocked),
        CoreError::Database(DatabaseError::ConnectionFailed {
            reason: "refused".to_string(),
        }),
        CoreError::Database(DatabaseError::NotConnected),
        CoreError::SynthesisInputsEmpty,
        CoreError::Internal {
            message: "join".to_string(),
        },
    ];

    for error in &errors {
        let strategy = retry::get_retry_strategy(error);
        assert_eq!(
            error.is_retryable(),
            strategy != RetryStrategy::NoRetry,
            "{}",
            error
        );
    }

    let flaky = ProviderError::RequestTimeout {
        provider: "forum".to_string(),
    };
    assert!(flaky.is_retryable());
    assert!(CoreError::Provider(flaky).is_retryable());
    assert!(!DeliveryError::NotConfigured {
        reason: "no key".to_string()
    }
    .is_retryable());
}

#[test]
fn test_user_friendly_messages() {
    let message = CoreError::Provider(unavailable("forum")).user_friendly_message();
    assert!(message.contains("forum could not be reached"));

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "api_key".to_string(),
    });
    assert!(config_error.user_friendly_message().contains("api_key"));

    let db_error = CoreError::Database(DatabaseError::NotConnected);
    assert!(db_error
        .user_friendly_message()
        .contains("Reports were still written"));
}

#[test]
fn test_permanent_delivery_classification() {
    assert!(DeliveryError::Rejected {
        reason: "blocked".to_string()
    }
    .is_permanent());
    assert!(!DeliveryError::Transient {
        reason: "502".to_string()
    }
    .is_permanent());
}
