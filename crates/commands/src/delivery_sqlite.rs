//! SQLite-backed delivery store using sqlx.

use std::time::Duration;

use {
    async_trait::async_trait,
    herald_common::MessageId,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Result,
    delivery::{DEFAULT_RECORD_TTL, DeliveryStore},
    error::Context,
};

/// Delivery records in the `delivery_records` table, one row per message.
///
/// Expired rows are ignored on read and purged on the next write.
pub struct SqliteDeliveryStore {
    pool: SqlitePool,
    ttl: Duration,
}

impl SqliteDeliveryStore {
    /// Create a new store with its own connection pool and run migrations.
    ///
    /// For a pool shared with other tables, use
    /// [`SqliteDeliveryStore::with_pool`] after [`crate::run_migrations`].
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to SQLite")?;

        crate::run_migrations(&pool).await?;

        Ok(Self::with_pool(pool))
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            ttl: DEFAULT_RECORD_TTL,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn expires_at_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_add(i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX))
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<()> {
        sqlx::query("DELETE FROM delivery_records WHERE expires_at_ms <= ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch(&self, trigger: MessageId, now_ms: i64) -> Result<()> {
        sqlx::query("UPDATE delivery_records SET expires_at_ms = ? WHERE trigger_id = ?")
            .bind(self.expires_at_ms(now_ms))
            .bind(trigger.get() as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryStore for SqliteDeliveryStore {
    async fn record_new(&self, trigger: MessageId, message: MessageId) -> Result<()> {
        let now = Self::now_ms();
        self.purge_expired(now).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM delivery_records WHERE trigger_id = ?")
            .bind(trigger.get() as i64)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO delivery_records (trigger_id, position, message_id, expires_at_ms)
             VALUES (?, 0, ?, ?)",
        )
        .bind(trigger.get() as i64)
        .bind(message.get() as i64)
        .bind(self.expires_at_ms(now))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_append(&self, trigger: MessageId, message: MessageId) -> Result<()> {
        let now = Self::now_ms();
        self.purge_expired(now).await?;

        sqlx::query(
            "INSERT INTO delivery_records (trigger_id, position, message_id, expires_at_ms)
             SELECT ?, COALESCE(MAX(position) + 1, 0), ?, ?
             FROM delivery_records WHERE trigger_id = ?",
        )
        .bind(trigger.get() as i64)
        .bind(message.get() as i64)
        .bind(self.expires_at_ms(now))
        .bind(trigger.get() as i64)
        .execute(&self.pool)
        .await?;
        self.touch(trigger, now).await
    }

    async fn lookup(&self, trigger: MessageId) -> Result<Vec<MessageId>> {
        let rows = sqlx::query(
            "SELECT message_id FROM delivery_records
             WHERE trigger_id = ? AND expires_at_ms > ?
             ORDER BY position",
        )
        .bind(trigger.get() as i64)
        .bind(Self::now_ms())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| MessageId(row.get::<i64, _>("message_id") as u64))
            .collect())
    }

    async fn drop_oldest(&self, trigger: MessageId) -> Result<Option<MessageId>> {
        let now = Self::now_ms();
        let row = sqlx::query(
            "SELECT position, message_id FROM delivery_records
             WHERE trigger_id = ? AND expires_at_ms > ?
             ORDER BY position LIMIT 1",
        )
        .bind(trigger.get() as i64)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let position: i64 = row.get("position");
        sqlx::query("DELETE FROM delivery_records WHERE trigger_id = ? AND position = ?")
            .bind(trigger.get() as i64)
            .bind(position)
            .execute(&self.pool)
            .await?;
        self.touch(trigger, now).await?;
        Ok(Some(MessageId(row.get::<i64, _>("message_id") as u64)))
    }

    async fn remove(&self, trigger: MessageId, message: MessageId) -> Result<bool> {
        let now = Self::now_ms();
        let result = sqlx::query(
            "DELETE FROM delivery_records
             WHERE trigger_id = ? AND message_id = ? AND expires_at_ms > ?",
        )
        .bind(trigger.get() as i64)
        .bind(message.get() as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.touch(trigger, now).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, trigger: MessageId) -> Result<()> {
        sqlx::query("DELETE FROM delivery_records WHERE trigger_id = ?")
            .bind(trigger.get() as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const T: MessageId = MessageId(1);

    async fn make_store() -> SqliteDeliveryStore {
        // One connection: every `sqlite::memory:` connection is its own
        // database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        SqliteDeliveryStore::with_pool(pool)
    }

    #[tokio::test]
    async fn missing_record_is_empty() {
        let store = make_store().await;
        assert!(store.lookup(T).await.unwrap().is_empty());
        assert_eq!(store.drop_oldest(T).await.unwrap(), None);
        assert!(!store.remove(T, MessageId(5)).await.unwrap());
    }

    #[tokio::test]
    async fn record_and_append_keep_order() {
        let store = make_store().await;
        store.record_new(T, MessageId(10)).await.unwrap();
        store.record_append(T, MessageId(11)).await.unwrap();
        store.record_append(T, MessageId(12)).await.unwrap();
        assert_eq!(store.lookup(T).await.unwrap(), vec![
            MessageId(10),
            MessageId(11),
            MessageId(12)
        ]);

        assert_eq!(store.drop_oldest(T).await.unwrap(), Some(MessageId(10)));
        store.record_append(T, MessageId(13)).await.unwrap();
        assert_eq!(store.lookup(T).await.unwrap(), vec![
            MessageId(11),
            MessageId(12),
            MessageId(13)
        ]);
    }

    #[tokio::test]
    async fn record_new_replaces_and_clear_forgets() {
        let store = make_store().await;
        store.record_append(T, MessageId(10)).await.unwrap();
        store.record_append(T, MessageId(11)).await.unwrap();
        store.record_new(T, MessageId(20)).await.unwrap();
        assert_eq!(store.lookup(T).await.unwrap(), vec![MessageId(20)]);

        assert!(store.remove(T, MessageId(20)).await.unwrap());
        store.record_new(T, MessageId(21)).await.unwrap();
        store.clear(T).await.unwrap();
        assert!(store.lookup(T).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_rows_look_missing() {
        let store = make_store().await.with_ttl(Duration::ZERO);
        store.record_new(T, MessageId(10)).await.unwrap();
        assert!(store.lookup(T).await.unwrap().is_empty());

        // Appending to an expired record starts a fresh one.
        let store = SqliteDeliveryStore::with_pool(store.pool.clone());
        store.record_append(T, MessageId(11)).await.unwrap();
        assert_eq!(store.lookup(T).await.unwrap(), vec![MessageId(11)]);
    }

    #[tokio::test]
    async fn triggers_are_independent() {
        let store = make_store().await;
        store.record_new(T, MessageId(10)).await.unwrap();
        store.record_new(MessageId(2), MessageId(20)).await.unwrap();
        store.clear(T).await.unwrap();
        assert_eq!(store.lookup(MessageId(2)).await.unwrap(), vec![
            MessageId(20)
        ]);
    }
}
