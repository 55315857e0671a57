use crate::Database;
use chrono::Utc;
use digest_core::{CoreError, DatabaseError, DeliveryRecord, DeliveryStatus};
use tempfile::TempDir;

async fn setup_test_db() -> (TempDir, Database) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_url = format!("sqlite://{}", dir.path().join("digest_test.db").display());

    let mut db = Database::new(db_url);
    db.connect()
        .await
        .expect("Failed to connect to test database");
    db.run_migrations().await.expect("Failed to run migrations");

    (dir, db)
}

#[tokio::test]
async fn test_database_connection_and_migrations() {
    let (_dir, db) = setup_test_db().await;
    // Migrations are idempotent.
    db.run_migrations().await.unwrap();
    assert!(db.list_subscribers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_use_before_connect() {
    let db = Database::new("sqlite::memory:");
    let err = db.active_subscribers().await.unwrap_err();
    assert!(matches!(err, CoreError::Database(DatabaseError::NotConnected)));
}

#[tokio::test]
async fn test_subscriber_lifecycle() {
    let (_dir, db) = setup_test_db().await;

    let alice = db
        .add_subscriber("  Alice@Example.org ", Some("Alice"))
        .await
        .unwrap();
    assert_eq!(alice.email, "alice@example.org");
    db.add_subscriber("bob@example.org", None).await.unwrap();

    assert_eq!(db.active_subscribers().await.unwrap().len(), 2);

    assert!(db.remove_subscriber("ALICE@example.org").await.unwrap());
    let active = db.active_subscribers().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].email, "bob@example.org");
    assert!(!db.remove_subscriber("nobody@example.org").await.unwrap());

    // Re-adding re-activates and keeps the same identity and name.
    let again = db.add_subscriber("alice@example.org", None).await.unwrap();
    assert_eq!(again.id, alice.id);
    assert_eq!(again.name.as_deref(), Some("Alice"));
    assert!(again.active);
    assert_eq!(db.list_subscribers().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_email_rejected() {
    let (_dir, db) = setup_test_db().await;
    let err = db.add_subscriber("not-an-address", None).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_delivery_upsert_and_sent_guard() {
    let (_dir, db) = setup_test_db().await;
    assert!(db.get_delivery("s1", "2026-10-18").await.unwrap().is_none());

    let mut record = DeliveryRecord::pending("s1", "2026-10-18");
    record.status = DeliveryStatus::Sending;
    record.attempts = 1;
    assert!(db.save_delivery(&record).await.unwrap());

    record.status = DeliveryStatus::Sent;
    record.provider_message_id = Some("msg-1".to_string());
    record.updated_at = Utc::now();
    assert!(db.save_delivery(&record).await.unwrap());

    // A sent record can never be overwritten.
    let mut regress = record.clone();
    regress.status = DeliveryStatus::Failed;
    regress.last_error = Some("boom".to_string());
    assert!(!db.save_delivery(&regress).await.unwrap());

    let stored = db.get_delivery("s1", "2026-10-18").await.unwrap().unwrap();
    assert_eq!(stored.status, DeliveryStatus::Sent);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.provider_message_id.as_deref(), Some("msg-1"));
    assert!(stored.last_error.is_none());
}

#[tokio::test]
async fn test_failed_delivery_round_trips() {
    let (_dir, db) = setup_test_db().await;
    let mut record = DeliveryRecord::pending("s2", "2026-10-18");
    record.status = DeliveryStatus::Failed;
    record.attempts = 4;
    record.permanent_failure = true;
    record.last_error = Some("Invalid recipient".to_string());
    db.save_delivery(&record).await.unwrap();

    let stored = db.get_delivery("s2", "2026-10-18").await.unwrap().unwrap();
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert_eq!(stored.attempts, 4);
    assert!(stored.permanent_failure);
    assert_eq!(stored.last_error.as_deref(), Some("Invalid recipient"));
}
