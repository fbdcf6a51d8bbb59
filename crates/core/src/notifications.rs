//! Per-chat notification filters for linked boards.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::domain::identity::ChatId;
use crate::domain::settings::{ChatBoardSetting, NotificationKind};
use crate::domain::BoardId;
use crate::ports::{SettingsStore, StoreError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("board {board} is not linked to chat {chat}")]
    BoardNotLinked { chat: ChatId, board: BoardId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct NotificationSettings {
    settings: Arc<dyn SettingsStore>,
}

impl NotificationSettings {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub async fn board_setting(
        &self,
        chat: ChatId,
        board: &BoardId,
    ) -> Result<Option<ChatBoardSetting>, StoreError> {
        Ok(self.settings.chat_settings(chat).await?.boards.get(board).cloned())
    }

    pub async fn toggle_notification(
        &self,
        chat: ChatId,
        board: &BoardId,
        kind: NotificationKind,
    ) -> Result<ChatBoardSetting, NotificationError> {
        self.modify(chat, board, |setting| {
            let enabled = setting.filter.toggle(kind);
            info!(
                event_name = "notifications.kind_toggled",
                chat_id = chat.0,
                board_id = %board,
                kind = kind.button_id(),
                enabled,
                "notification kind toggled"
            );
        })
        .await
    }

    pub async fn toggle_enabled(
        &self,
        chat: ChatId,
        board: &BoardId,
    ) -> Result<ChatBoardSetting, NotificationError> {
        self.modify(chat, board, |setting| {
            setting.enabled = !setting.enabled;
            info!(
                event_name = "notifications.board_switched",
                chat_id = chat.0,
                board_id = %board,
                enabled = setting.enabled,
                "board notifications switched"
            );
        })
        .await
    }

    /// Whether an event of `kind` on `board` should be posted to `chat`.
    pub async fn should_notify(
        &self,
        chat: ChatId,
        board: &BoardId,
        kind: NotificationKind,
    ) -> Result<bool, StoreError> {
        Ok(self
            .board_setting(chat, board)
            .await?
            .is_some_and(|setting| setting.enabled && setting.filter.contains(kind)))
    }

    async fn modify(
        &self,
        chat: ChatId,
        board: &BoardId,
        change: impl FnOnce(&mut ChatBoardSetting),
    ) -> Result<ChatBoardSetting, NotificationError> {
        let mut settings = self.settings.chat_settings(chat).await?;
        let setting = settings
            .boards
            .get_mut(board)
            .ok_or_else(|| NotificationError::BoardNotLinked { chat, board: board.clone() })?;
        change(setting);
        let updated = setting.clone();
        self.settings.save_chat_settings(chat, &settings).await?;
        Ok(updated)
    }
}
