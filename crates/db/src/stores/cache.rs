use std::time::Duration;

use boardlink_core::ports::{CacheDelta, CacheScope, ScopedCacheStore, StoreError};
use chrono::Utc;
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::debug;

use super::{backend, decode};
use crate::DbPool;

/// Cache entries keyed by scope and key, with millisecond expiry.
pub struct SqlCacheStore {
    pool: DbPool,
}

impl SqlCacheStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Deletes expired rows and returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cache_entry WHERE expires_at_ms <= ?")
            .bind(now_ms())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl ScopedCacheStore for SqlCacheStore {
    async fn get(&self, scope: CacheScope, key: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value_json FROM cache_entry
             WHERE scope = ? AND cache_key = ? AND expires_at_ms > ?",
        )
        .bind(scope.storage_key())
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|(raw,)| serde_json::from_str(&raw).map_err(decode)).transpose()
    }

    async fn set(
        &self,
        scope: CacheScope,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        sqlx::query(
            "INSERT INTO cache_entry (scope, cache_key, value_json, expires_at_ms)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(scope, cache_key) DO UPDATE SET
                value_json = excluded.value_json,
                expires_at_ms = excluded.expires_at_ms",
        )
        .bind(scope.storage_key())
        .bind(key)
        .bind(value.to_string())
        .bind(now_ms().saturating_add(ttl_ms))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn update(
        &self,
        scope: CacheScope,
        key: &str,
        deltas: &[CacheDelta],
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(backend)?;
        let updated = apply_deltas(&mut tx, &scope.storage_key(), key, deltas).await?;
        tx.commit().await.map_err(backend)?;
        if !updated {
            debug!(
                event_name = "store.cache.update_missed",
                cache_key = key,
                "no live entry to patch"
            );
        }
        Ok(updated)
    }

    async fn remove(&self, scope: CacheScope, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cache_entry WHERE scope = ? AND cache_key = ?")
            .bind(scope.storage_key())
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

async fn apply_deltas(
    conn: &mut SqliteConnection,
    scope: &str,
    key: &str,
    deltas: &[CacheDelta],
) -> Result<bool, StoreError> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT value_json FROM cache_entry
         WHERE scope = ? AND cache_key = ? AND expires_at_ms > ?",
    )
    .bind(scope)
    .bind(key)
    .bind(now_ms())
    .fetch_optional(&mut *conn)
    .await
    .map_err(backend)?;

    let Some((raw,)) = row else {
        return Ok(false);
    };
    let mut value: Value = serde_json::from_str(&raw).map_err(decode)?;
    for delta in deltas {
        delta.apply(&mut value);
    }

    sqlx::query("UPDATE cache_entry SET value_json = ? WHERE scope = ? AND cache_key = ?")
        .bind(value.to_string())
        .bind(scope)
        .bind(key)
        .execute(&mut *conn)
        .await
        .map_err(backend)?;
    Ok(true)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
