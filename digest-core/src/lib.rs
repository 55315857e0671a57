pub mod amount;
pub mod artifact;
pub mod config;
pub mod error;
pub mod error_utils;
pub mod payload;
pub mod rate_limiter;
pub mod retry;
pub mod types;

pub use amount::{Balance, ParseAmountError, Ratio};
pub use artifact::write_new;
pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use payload::{decode_provider_payload, status_error};
pub use rate_limiter::{RateLimitConfig, RateLimitPermit, RateLimiter};
pub use retry::{RetryConfig, RetryExecutor, RetryOutcome, RetryStrategy};
pub use types::*;
