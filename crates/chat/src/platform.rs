//! The messaging host as seen from the bot.

use async_trait::async_trait;
use boardlink_core::domain::identity::{ChatId, UserId};
use boardlink_core::panel::Panel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filters::FilterKeyboard;
use crate::interaction::SearchResults;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// A free-text question asked outside the panel, answered by the next
/// reply of the same user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputPrompt {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub reply_to: MessageHandle,
    pub text: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("message delivery failed: {0}")]
    Delivery(String),
    #[error("message {0:?} can no longer be edited")]
    NotEditable(MessageHandle),
}

#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    async fn render(
        &self,
        chat: ChatId,
        text: &str,
        panel: &Panel,
    ) -> Result<MessageHandle, PlatformError>;

    async fn edit(
        &self,
        handle: &MessageHandle,
        text: Option<&str>,
        panel: Option<&Panel>,
    ) -> Result<(), PlatformError>;

    /// Short non-blocking notice shown to the user who pressed a button.
    async fn toast(&self, user: UserId, text: &str) -> Result<(), PlatformError>;

    async fn prompt(&self, prompt: &InputPrompt) -> Result<(), PlatformError>;

    async fn send(&self, chat: ChatId, text: &str) -> Result<(), PlatformError>;

    /// Points the user at the authorization flow.
    async fn request_authorization(&self, user: UserId) -> Result<(), PlatformError>;

    /// Answers a search with cards and with lists to file a new card in.
    async fn search_results(
        &self,
        query_id: &str,
        results: &SearchResults,
    ) -> Result<(), PlatformError>;

    /// Sends `text` with a reply keyboard, or hides the keyboard when
    /// `keyboard` is `None`.
    async fn reply_keyboard(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&FilterKeyboard>,
    ) -> Result<(), PlatformError>;

    /// Sends `text` with one reply button per option. No options hides the
    /// reply keyboard.
    async fn choose(
        &self,
        chat: ChatId,
        text: &str,
        options: &[String],
    ) -> Result<(), PlatformError>;
}
