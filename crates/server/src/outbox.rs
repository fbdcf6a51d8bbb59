//! Messaging host stand-in that writes every outgoing message to the log.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use boardlink_chat::filters::FilterKeyboard;
use boardlink_chat::interaction::SearchResults;
use boardlink_chat::platform::InputPrompt;
use boardlink_chat::{MessageHandle, MessagingPlatform, PlatformError};
use boardlink_core::domain::identity::{ChatId, UserId};
use boardlink_core::panel::Panel;
use tracing::info;

#[derive(Default)]
pub struct LogOutbox {
    next_message_id: AtomicI64,
}

fn button_count(panel: &Panel) -> usize {
    panel.buttons().count()
}

#[async_trait]
impl MessagingPlatform for LogOutbox {
    async fn render(
        &self,
        chat: ChatId,
        text: &str,
        panel: &Panel,
    ) -> Result<MessageHandle, PlatformError> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            event_name = "egress.chat.card_rendered",
            chat_id = chat.0,
            message_id,
            menu = panel.menu.as_str(),
            buttons = button_count(panel),
            text,
            "card message sent"
        );
        Ok(MessageHandle { chat_id: chat, message_id })
    }

    async fn edit(
        &self,
        handle: &MessageHandle,
        text: Option<&str>,
        panel: Option<&Panel>,
    ) -> Result<(), PlatformError> {
        info!(
            event_name = "egress.chat.message_edited",
            chat_id = handle.chat_id.0,
            message_id = handle.message_id,
            text_changed = text.is_some(),
            menu = panel.map(|panel| panel.menu.as_str()).unwrap_or("none"),
            "card message edited"
        );
        Ok(())
    }

    async fn toast(&self, user: UserId, text: &str) -> Result<(), PlatformError> {
        info!(event_name = "egress.chat.toast", user_id = user.0, text, "notice shown");
        Ok(())
    }

    async fn prompt(&self, prompt: &InputPrompt) -> Result<(), PlatformError> {
        info!(
            event_name = "egress.chat.prompt",
            chat_id = prompt.chat_id.0,
            user_id = prompt.user_id.0,
            reply_to = prompt.reply_to.message_id,
            text = %prompt.text,
            "question asked"
        );
        Ok(())
    }

    async fn send(&self, chat: ChatId, text: &str) -> Result<(), PlatformError> {
        info!(event_name = "egress.chat.text", chat_id = chat.0, text, "text sent");
        Ok(())
    }

    async fn request_authorization(&self, user: UserId) -> Result<(), PlatformError> {
        info!(event_name = "egress.chat.authorize", user_id = user.0, "authorization requested");
        Ok(())
    }

    async fn search_results(
        &self,
        query_id: &str,
        results: &SearchResults,
    ) -> Result<(), PlatformError> {
        info!(
            event_name = "egress.chat.search_results",
            query_id,
            results = results.results.len(),
            list_offers = results.list_offers.len(),
            next_offset = ?results.next_offset,
            "search results answered"
        );
        Ok(())
    }

    async fn reply_keyboard(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&FilterKeyboard>,
    ) -> Result<(), PlatformError> {
        info!(
            event_name = "egress.chat.reply_keyboard",
            chat_id = chat.0,
            rows = keyboard.map(Vec::len).unwrap_or(0),
            text,
            "reply keyboard sent"
        );
        Ok(())
    }

    async fn choose(
        &self,
        chat: ChatId,
        text: &str,
        options: &[String],
    ) -> Result<(), PlatformError> {
        info!(
            event_name = "egress.chat.choose",
            chat_id = chat.0,
            options = options.len(),
            text,
            "choice keyboard sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use boardlink_core::panel::{Menu, Panel};

    use super::*;

    #[tokio::test]
    async fn rendered_messages_get_increasing_handles() {
        let outbox = LogOutbox::default();
        let panel = Panel { menu: Menu::Collapsed, rows: vec![] };

        let first = outbox.render(ChatId(4), "one", &panel).await.expect("render");
        let second = outbox.render(ChatId(4), "two", &panel).await.expect("render");

        assert_eq!(first, MessageHandle { chat_id: ChatId(4), message_id: 1 });
        assert_eq!(second.message_id, 2);
    }
}
