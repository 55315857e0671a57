use chrono::{DateTime, Utc};
use digest_core::{CoreError, DatabaseError, DeliveryRecord, DeliveryStatus, Subscriber};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed subscriber list and delivery ledger.
pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl Database {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            pool: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: format!("{}: {}", self.connection_string, e),
            })?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to subscriber database");
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        MIGRATOR
            .run(self.pool()?)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Database migrations applied");
        Ok(())
    }

    /// Connects and migrates in one step.
    pub async fn open(connection_string: impl Into<String>) -> Result<Self, CoreError> {
        let mut db = Self::new(connection_string);
        db.connect().await?;
        db.run_migrations().await?;
        Ok(db)
    }

    fn pool(&self) -> Result<&SqlitePool, DatabaseError> {
        self.pool.as_ref().ok_or(DatabaseError::NotConnected)
    }

    /// Adds a subscriber, or re-activates an existing address.
    pub async fn add_subscriber(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<Subscriber, CoreError> {
        let email = normalize_email(email)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO subscribers (id, email, name, status, created_at, updated_at)
            VALUES (?, ?, ?, 'active', ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                status = 'active',
                name = COALESCE(excluded.name, subscribers.name),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&email)
        .bind(name.map(str::trim).filter(|n| !n.is_empty()))
        .bind(now)
        .bind(now)
        .execute(self.pool()?)
        .await
        .map_err(map_sql)?;

        let row = sqlx::query("SELECT id, email, name, status FROM subscribers WHERE email = ?")
            .bind(&email)
            .fetch_one(self.pool()?)
            .await
            .map_err(map_sql)?;
        let subscriber = subscriber_from_row(&row)?;
        info!(subscriber = %subscriber.id, "Subscriber {} is active", subscriber.email);
        Ok(subscriber)
    }

    /// Marks the address unsubscribed. Returns false when it is unknown.
    pub async fn remove_subscriber(&self, email: &str) -> Result<bool, CoreError> {
        let email = normalize_email(email)?;
        let result = sqlx::query(
            "UPDATE subscribers SET status = 'unsubscribed', updated_at = ? WHERE email = ?",
        )
        .bind(Utc::now())
        .bind(&email)
        .execute(self.pool()?)
        .await
        .map_err(map_sql)?;

        if result.rows_affected() == 0 {
            warn!("No subscriber found with email {}", email);
            return Ok(false);
        }
        info!("Unsubscribed {}", email);
        Ok(true)
    }

    pub async fn active_subscribers(&self) -> Result<Vec<Subscriber>, CoreError> {
        let rows = sqlx::query(
            "SELECT id, email, name, status FROM subscribers WHERE status = 'active' ORDER BY created_at, email",
        )
        .fetch_all(self.pool()?)
        .await
        .map_err(map_sql)?;
        rows.iter()
            .map(|row| subscriber_from_row(row).map_err(CoreError::from))
            .collect()
    }

    pub async fn list_subscribers(&self) -> Result<Vec<Subscriber>, CoreError> {
        let rows = sqlx::query("SELECT id, email, name, status FROM subscribers ORDER BY email")
            .fetch_all(self.pool()?)
            .await
            .map_err(map_sql)?;
        rows.iter()
            .map(|row| subscriber_from_row(row).map_err(CoreError::from))
            .collect()
    }

    pub async fn get_delivery(
        &self,
        subscriber_id: &str,
        edition_id: &str,
    ) -> Result<Option<DeliveryRecord>, CoreError> {
        let row = sqlx::query(
            r#"
            SELECT subscriber_id, edition_id, status, attempts, last_error,
                   permanent_failure, provider_message_id, updated_at
            FROM deliveries
            WHERE subscriber_id = ? AND edition_id = ?
            "#,
        )
        .bind(subscriber_id)
        .bind(edition_id)
        .fetch_optional(self.pool()?)
        .await
        .map_err(map_sql)?;

        Ok(row.as_ref().map(delivery_from_row).transpose()?)
    }

    /// Upserts the record. A row that already reached `sent` is left as is;
    /// the return value says whether anything was written.
    pub async fn save_delivery(&self, record: &DeliveryRecord) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO deliveries (
                subscriber_id, edition_id, status, attempts, last_error,
                permanent_failure, provider_message_id, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(subscriber_id, edition_id) DO UPDATE SET
                status = excluded.status,
                attempts = excluded.attempts,
                last_error = excluded.last_error,
                permanent_failure = excluded.permanent_failure,
                provider_message_id = excluded.provider_message_id,
                updated_at = excluded.updated_at
            WHERE deliveries.status <> 'sent'
            "#,
        )
        .bind(&record.subscriber_id)
        .bind(&record.edition_id)
        .bind(record.status.as_str())
        .bind(i64::from(record.attempts))
        .bind(&record.last_error)
        .bind(record.permanent_failure)
        .bind(&record.provider_message_id)
        .bind(record.updated_at)
        .execute(self.pool()?)
        .await
        .map_err(map_sql)?;

        let written = result.rows_affected() > 0;
        if !written {
            debug!(
                subscriber = %record.subscriber_id,
                edition = %record.edition_id,
                "Delivery already sent; record left unchanged"
            );
        }
        Ok(written)
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

fn normalize_email(email: &str) -> Result<String, CoreError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(CoreError::InvalidInput {
            message: format!("'{}' is not a valid email address", email),
        }),
    }
}

fn map_sql(e: sqlx::Error) -> DatabaseError {
    match &e {
        sqlx::Error::Database(db) if db.message().contains("database is locked") => {
            DatabaseError::DatabaseLocked
        }
        sqlx::Error::Database(db)
            if db.is_unique_violation() || db.is_check_violation() || db.is_foreign_key_violation() =>
        {
            DatabaseError::ConstraintViolation {
                constraint: db.message().to_string(),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            }
        }
        _ => DatabaseError::Sql(e),
    }
}

fn subscriber_from_row(row: &SqliteRow) -> Result<Subscriber, DatabaseError> {
    let status: String = row.try_get("status").map_err(map_sql)?;
    Ok(Subscriber {
        id: row.try_get("id").map_err(map_sql)?,
        email: row.try_get("email").map_err(map_sql)?,
        name: row.try_get("name").map_err(map_sql)?,
        active: status == "active",
    })
}

fn delivery_from_row(row: &SqliteRow) -> Result<DeliveryRecord, DatabaseError> {
    let status: String = row.try_get("status").map_err(map_sql)?;
    let status = DeliveryStatus::from_str(&status).map_err(|_| DatabaseError::InvalidStoredValue {
        column: "deliveries.status".to_string(),
        value: status.clone(),
    })?;
    let attempts: i64 = row.try_get("attempts").map_err(map_sql)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(map_sql)?;

    Ok(DeliveryRecord {
        subscriber_id: row.try_get("subscriber_id").map_err(map_sql)?,
        edition_id: row.try_get("edition_id").map_err(map_sql)?,
        status,
        attempts: u32::try_from(attempts).map_err(|_| DatabaseError::InvalidStoredValue {
            column: "deliveries.attempts".to_string(),
            value: attempts.to_string(),
        })?,
        last_error: row.try_get("last_error").map_err(map_sql)?,
        permanent_failure: row.try_get("permanent_failure").map_err(map_sql)?,
        provider_message_id: row.try_get("provider_message_id").map_err(map_sql)?,
        updated_at,
    })
}

#[cfg(test)]
mod tests;
