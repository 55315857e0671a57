pub mod coordinator;
pub mod resend;
pub mod store;

use async_trait::async_trait;
use digest_core::DeliveryError;

pub use coordinator::{DeliverySummary, DistributionCoordinator};
pub use resend::ResendTransport;
pub use store::{DeliveryStore, MemoryDeliveryStore};

/// One rendered newsletter addressed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    /// Stable per (edition, subscriber) so the provider can drop replays.
    pub idempotency_key: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Returns the provider's message id.
    async fn send(&self, email: &OutboundEmail) -> Result<String, DeliveryError>;

    fn name(&self) -> &str;
}
