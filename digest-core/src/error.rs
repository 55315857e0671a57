use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Record parse error: {0}")]
    RecordParse(#[from] RecordParseError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Both analysis domains produced no data")]
    SynthesisInputsEmpty,

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failures of an external data provider (forum fetcher or chain-query bridge).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("{provider} is unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("{provider} reported an error: {message}")]
    Reported { provider: String, message: String },

    #[error("Rate limit exceeded for {provider}. Retry after {retry_after} seconds")]
    RateLimitExceeded { provider: String, retry_after: u64 },

    #[error("Server error from {provider}: {status_code}")]
    ServerError { provider: String, status_code: u16 },

    #[error("Request to {provider} timed out")]
    RequestTimeout { provider: String },

    #[error("Access denied by {provider}: {resource}")]
    Forbidden { provider: String, resource: String },

    #[error("Resource not found at {provider}: {resource}")]
    NotFound { provider: String, resource: String },

    #[error("Invalid payload from {provider}: {details}")]
    InvalidPayload { provider: String, details: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    ForumPost,
    Referendum,
    TreasuryProposal,
    Bounty,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::ForumPost => "forum post",
            RecordKind::Referendum => "referendum",
            RecordKind::TreasuryProposal => "treasury proposal",
            RecordKind::Bounty => "bounty",
        };
        f.write_str(name)
    }
}

/// One malformed item inside an otherwise valid batch.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed {kind} ({locator}): {reason}")]
pub struct RecordParseError {
    pub kind: RecordKind,
    pub locator: String,
    pub reason: String,
}

impl RecordParseError {
    pub fn new(kind: RecordKind, locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            locator: locator.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("Transient transport failure: {reason}")]
    Transient { reason: String },

    #[error("Transport rate limited. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Invalid recipient {recipient}: {reason}")]
    InvalidRecipient { recipient: String, reason: String },

    #[error("Message rejected by transport: {reason}")]
    Rejected { reason: String },

    #[error("Transport not configured: {reason}")]
    NotConfigured { reason: String },
}

impl DeliveryError {
    /// Permanent failures are recorded without retry.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            DeliveryError::InvalidRecipient { .. }
                | DeliveryError::Rejected { .. }
                | DeliveryError::NotConfigured { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Database used before connect()")]
    NotConnected,

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("Invalid stored value in {column}: {value}")]
    InvalidStoredValue { column: String, value: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
