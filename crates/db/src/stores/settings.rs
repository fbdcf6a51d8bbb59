use boardlink_core::domain::identity::{ChatId, UserId};
use boardlink_core::domain::settings::{ChatSettings, UserSettings};
use boardlink_core::ports::{SettingsStore, StoreError};

use super::{backend, decode, now_rfc3339};
use crate::DbPool;

/// Settings documents stored as one JSON row per user and per chat, so every
/// save is a single atomic write.
pub struct SqlSettingsStore {
    pool: DbPool,
}

impl SqlSettingsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SettingsStore for SqlSettingsStore {
    async fn user_settings(&self, user: UserId) -> Result<UserSettings, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT settings_json FROM user_settings WHERE user_id = ?")
                .bind(user.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        match row {
            Some((raw,)) => serde_json::from_str(&raw).map_err(decode),
            None => Ok(UserSettings::default()),
        }
    }

    async fn save_user_settings(
        &self,
        user: UserId,
        settings: &UserSettings,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(settings).map_err(decode)?;
        sqlx::query(
            "INSERT INTO user_settings (user_id, settings_json, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                settings_json = excluded.settings_json,
                updated_at = excluded.updated_at",
        )
        .bind(user.0)
        .bind(raw)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn chat_settings(&self, chat: ChatId) -> Result<ChatSettings, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT settings_json FROM chat_settings WHERE chat_id = ?")
                .bind(chat.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        match row {
            Some((raw,)) => serde_json::from_str(&raw).map_err(decode),
            None => Ok(ChatSettings::default()),
        }
    }

    async fn save_chat_settings(
        &self,
        chat: ChatId,
        settings: &ChatSettings,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(settings).map_err(decode)?;
        sqlx::query(
            "INSERT INTO chat_settings (chat_id, settings_json, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(chat_id) DO UPDATE SET
                settings_json = excluded.settings_json,
                updated_at = excluded.updated_at",
        )
        .bind(chat.0)
        .bind(raw)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
