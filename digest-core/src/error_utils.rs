use crate::error::*;
use crate::retry::{
    database_retry_strategy, delivery_retry_strategy, get_retry_strategy, provider_retry_strategy,
};
use std::time::Duration;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Provider(e) => {
                error!("Provider error details: {:?}", e);
            }
            CoreError::Delivery(e) => {
                error!("Delivery error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        get_retry_strategy(self).allows_retry()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Provider(e) => e.retry_after(),
            CoreError::Delivery(e) => e.retry_after(),
            CoreError::Database(e) => e.retry_after(),
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Provider(e) => e.user_friendly_message(),
            CoreError::Delivery(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::RecordParse(e) => format!("Skipped a malformed record: {}", e),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::SynthesisInputsEmpty => {
                "Neither the forum nor the chain returned data. The report notes the gap."
                    .to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Provider(_) => "PROVIDER".to_string(),
            CoreError::RecordParse(_) => "RECORD_PARSE".to_string(),
            CoreError::Delivery(_) => "DELIVERY".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::SynthesisInputsEmpty => "SYNTHESIS_INPUTS_EMPTY".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for ProviderError {
    fn log_error(&self) -> &Self {
        error!("ProviderError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ProviderError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        provider_retry_strategy(self).allows_retry()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimitExceeded { retry_after, .. } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(10)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ProviderError::Unavailable { provider, .. } => format!(
                "{} could not be reached. Its section of the report will be empty.",
                provider
            ),
            ProviderError::Reported { provider, message } => {
                format!("{} failed: {}", provider, message)
            }
            ProviderError::RateLimitExceeded {
                provider,
                retry_after,
            } => format!(
                "Too many requests to {}. Please wait {} seconds before trying again.",
                provider, retry_after
            ),
            ProviderError::RequestTimeout { provider } => {
                format!("Request to {} timed out. Please try again.", provider)
            }
            _ => "A data provider returned an unusable response.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ProviderError::Unavailable { .. } => "PROVIDER_UNAVAILABLE".to_string(),
            ProviderError::Reported { .. } => "PROVIDER_REPORTED".to_string(),
            ProviderError::RateLimitExceeded { .. } => "PROVIDER_RATE_LIMIT".to_string(),
            ProviderError::ServerError { .. } => "PROVIDER_SERVER_ERROR".to_string(),
            ProviderError::RequestTimeout { .. } => "PROVIDER_TIMEOUT".to_string(),
            ProviderError::Forbidden { .. } => "PROVIDER_FORBIDDEN".to_string(),
            ProviderError::NotFound { .. } => "PROVIDER_NOT_FOUND".to_string(),
            ProviderError::InvalidPayload { .. } => "PROVIDER_INVALID_PAYLOAD".to_string(),
        }
    }
}

impl ErrorExt for DeliveryError {
    fn log_error(&self) -> &Self {
        error!("DeliveryError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DeliveryError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        delivery_retry_strategy(self).allows_retry()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DeliveryError::RateLimited { retry_after } => Some(Duration::from_secs(*retry_after)),
            DeliveryError::Transient { .. } => Some(Duration::from_secs(2)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DeliveryError::InvalidRecipient { recipient, .. } => {
                format!("The address {} was rejected as invalid.", recipient)
            }
            DeliveryError::RateLimited { retry_after } => format!(
                "The email provider is throttling requests. Retrying in {} seconds.",
                retry_after
            ),
            DeliveryError::NotConfigured { .. } => {
                "Email delivery is not configured. Set an API key to send newsletters."
                    .to_string()
            }
            _ => "The newsletter could not be delivered to this recipient.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DeliveryError::Transient { .. } => "DELIVERY_TRANSIENT".to_string(),
            DeliveryError::RateLimited { .. } => "DELIVERY_RATE_LIMIT".to_string(),
            DeliveryError::InvalidRecipient { .. } => "DELIVERY_INVALID_RECIPIENT".to_string(),
            DeliveryError::Rejected { .. } => "DELIVERY_REJECTED".to_string(),
            DeliveryError::NotConfigured { .. } => "DELIVERY_NOT_CONFIGURED".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        database_retry_strategy(self).allows_retry()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DatabaseError::DatabaseLocked => Some(Duration::from_millis(100)),
            _ if self.is_retryable() => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } | DatabaseError::NotConnected => {
                "The subscriber database is unreachable. Reports were still written.".to_string()
            }
            DatabaseError::DatabaseLocked => {
                "Database is temporarily busy. Please try again.".to_string()
            }
            _ => "Database error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::NotConnected => "DB_NOT_CONNECTED".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::QueryFailed { .. } => "DB_QUERY_FAILED".to_string(),
            DatabaseError::ConstraintViolation { .. } => "DB_CONSTRAINT_VIOLATION".to_string(),
            DatabaseError::DatabaseLocked => "DB_LOCKED".to_string(),
            DatabaseError::InvalidStoredValue { .. } => "DB_INVALID_VALUE".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}
