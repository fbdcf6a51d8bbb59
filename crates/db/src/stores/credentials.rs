use boardlink_core::domain::identity::{Credential, UserId};
use boardlink_core::domain::settings::DeferredAction;
use boardlink_core::ports::{CredentialStore, StoreError};

use super::{backend, decode, now_rfc3339};
use crate::DbPool;

pub struct SqlCredentialStore {
    pool: DbPool,
}

impl SqlCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialStore for SqlCredentialStore {
    async fn credential(&self, user: UserId) -> Result<Option<Credential>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT token FROM user_credential WHERE user_id = ?")
                .bind(user.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(row.map(|(token,)| Credential::new(token)))
    }

    async fn store_credential(
        &self,
        user: UserId,
        credential: &Credential,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_credential (user_id, token, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                token = excluded.token,
                updated_at = excluded.updated_at",
        )
        .bind(user.0)
        .bind(credential.token())
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn invalidate(&self, user: UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_credential WHERE user_id = ?")
            .bind(user.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn defer_until_reauthorized(
        &self,
        user: UserId,
        action: DeferredAction,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&action).map_err(decode)?;
        sqlx::query(
            "INSERT OR IGNORE INTO deferred_action (user_id, action_json, created_at)
             VALUES (?, ?, ?)",
        )
        .bind(user.0)
        .bind(raw)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn take_deferred(&self, user: UserId) -> Result<Vec<DeferredAction>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT action_json FROM deferred_action WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(backend)?;
        sqlx::query("DELETE FROM deferred_action WHERE user_id = ?")
            .bind(user.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        rows.into_iter().map(|(raw,)| serde_json::from_str(&raw).map_err(decode)).collect()
    }
}
