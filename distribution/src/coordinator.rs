use crate::{DeliveryStore, EmailTransport, OutboundEmail};
use chrono::Utc;
use digest_core::{
    CoreError, DeliveryError, DeliveryRecord, DeliveryStatus, DistributionConfig, ErrorExt,
    RateLimiter, RetryExecutor, Subscriber,
};
use futures::stream::{self, StreamExt};
use newsletter::NewsletterEdition;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Per-run tally of what happened to each recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliverySummary {
    pub edition_id: String,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Extra send attempts made after a first attempt failed.
    pub retries: u64,
    /// (email, error) for every recipient that ended in `failed`.
    pub failures: Vec<(String, String)>,
}

enum Outcome {
    Sent,
    Skipped,
    Failed(String, String),
    NotAttempted,
}

pub struct DistributionCoordinator {
    transport: Arc<dyn EmailTransport>,
    store: Arc<dyn DeliveryStore>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
    from_address: String,
    reply_to: Option<String>,
    concurrency: usize,
}

impl DistributionCoordinator {
    pub fn new(
        config: &DistributionConfig,
        transport: Arc<dyn EmailTransport>,
        store: Arc<dyn DeliveryStore>,
    ) -> Self {
        Self {
            transport,
            store,
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            retry: RetryExecutor::new(config.retry.clone()),
            from_address: config.from_address.clone(),
            reply_to: config.reply_to.clone(),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Recipients are deduplicated by normalised address (first wins) and
    /// inactive entries dropped before any send. A store failure stops the
    /// phase and is returned; recipients not yet started are left alone.
    pub async fn distribute(
        &self,
        edition: &NewsletterEdition,
        html: &str,
        recipients: Vec<Subscriber>,
    ) -> Result<DeliverySummary, CoreError> {
        let recipients = dedupe(recipients);
        info!(
            edition = %edition.edition_id,
            recipients = recipients.len(),
            transport = self.transport.name(),
            "Starting newsletter distribution"
        );

        let retries_before = self.retry.get_metrics().total_retries;
        let aborted = AtomicBool::new(false);
        let store_error: Mutex<Option<CoreError>> = Mutex::new(None);
        let (aborted_ref, store_error_ref) = (&aborted, &store_error);

        let outcomes: Vec<Outcome> = stream::iter(recipients.iter())
            .map(|subscriber| async move {
                if aborted_ref.load(Ordering::SeqCst) {
                    return Outcome::NotAttempted;
                }
                match self.deliver_one(edition, html, subscriber).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(
                            subscriber = %subscriber.id,
                            error_code = %e.error_code(),
                            "Delivery store failed: {}",
                            e
                        );
                        aborted_ref.store(true, Ordering::SeqCst);
                        store_error_ref.lock().await.get_or_insert(e);
                        Outcome::NotAttempted
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = DeliverySummary {
            edition_id: edition.edition_id.clone(),
            total: recipients.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Sent => summary.sent += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed(email, reason) => {
                    summary.failed += 1;
                    summary.failures.push((email, reason));
                }
                Outcome::NotAttempted => {}
            }
        }
        summary.failures.sort();
        summary.retries = self
            .retry
            .get_metrics()
            .total_retries
            .saturating_sub(retries_before);

        if let Some(e) = store_error.into_inner() {
            warn!(
                sent = summary.sent,
                failed = summary.failed,
                skipped = summary.skipped,
                "Distribution aborted: delivery store unavailable"
            );
            return Err(e);
        }

        info!(
            edition = %summary.edition_id,
            total = summary.total,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            retries = summary.retries,
            rate_limited = self.rate_limiter.rate_limited_count(),
            "Distribution finished"
        );
        Ok(summary)
    }

    async fn deliver_one(
        &self,
        edition: &NewsletterEdition,
        html: &str,
        subscriber: &Subscriber,
    ) -> Result<Outcome, CoreError> {
        let existing = self
            .store
            .get_delivery(&subscriber.id, &edition.edition_id)
            .await?;

        if let Some(record) = &existing {
            if record.is_sent() {
                debug!(subscriber = %subscriber.id, "Already sent for this edition; skipping");
                return Ok(Outcome::Skipped);
            }
            if record.permanent_failure {
                debug!(
                    subscriber = %subscriber.id,
                    "Previous permanent failure for this edition; skipping"
                );
                return Ok(Outcome::Skipped);
            }
            if record.status == DeliveryStatus::Failed
                && record.attempts >= self.retry.config().max_attempts.max(1)
            {
                debug!(
                    subscriber = %subscriber.id,
                    attempts = record.attempts,
                    "Retries exhausted on an earlier run; skipping"
                );
                return Ok(Outcome::Skipped);
            }
        }

        let mut record = existing
            .unwrap_or_else(|| DeliveryRecord::pending(&subscriber.id, &edition.edition_id));
        record.status = DeliveryStatus::Sending;
        record.updated_at = Utc::now();
        if !self.store.save_delivery(&record).await? {
            return Ok(Outcome::Skipped);
        }

        let email = OutboundEmail {
            from: self.from_address.clone(),
            to: subscriber.email.trim().to_string(),
            reply_to: self.reply_to.clone(),
            subject: edition.subject.clone(),
            html: html.to_string(),
            idempotency_key: format!("{}/{}", edition.edition_id, subscriber.id),
        };

        // A record resumed from an earlier run only gets what is left of its budget.
        let budget = self
            .retry
            .config()
            .max_attempts
            .max(1)
            .saturating_sub(record.attempts)
            .max(1);
        let outcome = self
            .retry
            .with_max_attempts(budget)
            .execute("send_newsletter", || self.attempt_send(&email))
            .await;

        record.attempts += outcome.attempts;
        record.updated_at = Utc::now();
        let result = match outcome.result {
            Ok(message_id) => {
                record.status = DeliveryStatus::Sent;
                record.provider_message_id = Some(message_id);
                record.last_error = None;
                info!(subscriber = %subscriber.id, attempts = record.attempts, "Newsletter sent");
                Outcome::Sent
            }
            Err(e) => {
                record.status = DeliveryStatus::Failed;
                record.permanent_failure =
                    matches!(&e, CoreError::Delivery(d) if d.is_permanent());
                record.last_error = Some(e.to_string());
                warn!(
                    subscriber = %subscriber.id,
                    attempts = record.attempts,
                    permanent = record.permanent_failure,
                    "Newsletter delivery failed: {}",
                    e
                );
                Outcome::Failed(email.to.clone(), e.to_string())
            }
        };

        self.store.save_delivery(&record).await?;
        Ok(result)
    }

    async fn attempt_send(&self, email: &OutboundEmail) -> Result<String, CoreError> {
        let _permit = self.rate_limiter.acquire_permit().await?;
        let result = self.transport.send(email).await;
        if matches!(result, Err(DeliveryError::RateLimited { .. })) {
            self.rate_limiter.record_rate_limited().await;
        }
        Ok(result?)
    }
}

fn dedupe(recipients: Vec<Subscriber>) -> Vec<Subscriber> {
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .filter(|s| s.active)
        .filter(|s| {
            let fresh = seen.insert(s.contact_key());
            if !fresh {
                debug!(subscriber = %s.id, "Dropping duplicate recipient {}", s.email);
            }
            fresh
        })
        .collect()
}
