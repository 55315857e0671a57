use async_trait::async_trait;
use database::Database;
use digest_core::{CoreError, DatabaseError, DeliveryRecord, Subscriber};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Durable side of distribution: who to send to and what was already sent.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, CoreError>;

    async fn get_delivery(
        &self,
        subscriber_id: &str,
        edition_id: &str,
    ) -> Result<Option<DeliveryRecord>, CoreError>;

    /// Must never overwrite a record that is already `sent`. Returns whether
    /// the record was written.
    async fn save_delivery(&self, record: &DeliveryRecord) -> Result<bool, CoreError>;
}

#[async_trait]
impl DeliveryStore for Database {
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, CoreError> {
        Database::active_subscribers(self).await
    }

    async fn get_delivery(
        &self,
        subscriber_id: &str,
        edition_id: &str,
    ) -> Result<Option<DeliveryRecord>, CoreError> {
        Database::get_delivery(self, subscriber_id, edition_id).await
    }

    async fn save_delivery(&self, record: &DeliveryRecord) -> Result<bool, CoreError> {
        Database::save_delivery(self, record).await
    }
}

/// Process-local store for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryDeliveryStore {
    subscribers: Mutex<Vec<Subscriber>>,
    deliveries: Mutex<HashMap<(String, String), DeliveryRecord>>,
    unavailable: AtomicBool,
}

impl MemoryDeliveryStore {
    pub fn new(subscribers: Vec<Subscriber>) -> Self {
        Self {
            subscribers: Mutex::new(subscribers),
            ..Default::default()
        }
    }

    pub fn insert_delivery(&self, record: DeliveryRecord) {
        self.deliveries_lock().insert(
            (record.subscriber_id.clone(), record.edition_id.clone()),
            record,
        );
    }

    pub fn delivery(&self, subscriber_id: &str, edition_id: &str) -> Option<DeliveryRecord> {
        self.deliveries_lock()
            .get(&(subscriber_id.to_string(), edition_id.to_string()))
            .cloned()
    }

    /// Simulates the backing store going away; every call then fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionFailed {
                reason: "in-memory store marked unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn deliveries_lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(String, String), DeliveryRecord>> {
        self.deliveries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl DeliveryStore for MemoryDeliveryStore {
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, CoreError> {
        self.check_available()?;
        let subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        Ok(subscribers.iter().filter(|s| s.active).cloned().collect())
    }

    async fn get_delivery(
        &self,
        subscriber_id: &str,
        edition_id: &str,
    ) -> Result<Option<DeliveryRecord>, CoreError> {
        self.check_available()?;
        Ok(self.delivery(subscriber_id, edition_id))
    }

    async fn save_delivery(&self, record: &DeliveryRecord) -> Result<bool, CoreError> {
        self.check_available()?;
        let mut deliveries = self.deliveries_lock();
        let key = (record.subscriber_id.clone(), record.edition_id.clone());
        if deliveries.get(&key).is_some_and(DeliveryRecord::is_sent) {
            return Ok(false);
        }
        deliveries.insert(key, record.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use digest_core::DeliveryStatus;

    #[tokio::test]
    async fn test_memory_store_keeps_sent_records() {
        let store = MemoryDeliveryStore::default();
        let mut record = DeliveryRecord::pending("s1", "e1");
        record.status = DeliveryStatus::Sent;
        assert!(store.save_delivery(&record).await.unwrap());

        record.status = DeliveryStatus::Failed;
        assert!(!store.save_delivery(&record).await.unwrap());
        assert!(store.delivery("s1", "e1").unwrap().is_sent());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_as_database_error() {
        let store = MemoryDeliveryStore::new(vec![Subscriber::adhoc("a@example.org")]);
        store.set_unavailable(true);
        let err = store.active_subscribers().await.unwrap_err();
        assert!(matches!(err, CoreError::Database(_)));
    }
}
