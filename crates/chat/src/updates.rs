use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use boardlink_core::panel::Panel;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{ChatEnvelope, EventContext, EventDispatcher, HandlerResult, Reply, Sender};
use crate::filters::FilterReply;
use crate::interaction::PanelEdit;
use crate::platform::{MessageHandle, MessagingPlatform, PlatformError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Source of chat updates, e.g. a long-poll or webhook queue.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_update(&self) -> Result<Option<ChatEnvelope>, TransportError>;
    async fn acknowledge(&self, update_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Transport that never yields an update.
#[derive(Default)]
pub struct NoopUpdateTransport;

#[async_trait]
impl UpdateTransport for NoopUpdateTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_update(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _update_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Pulls updates, dispatches them and applies the replies to the chat.
pub struct UpdatePump {
    transport: Arc<dyn UpdateTransport>,
    dispatcher: EventDispatcher,
    platform: Arc<dyn MessagingPlatform>,
    reconnect_policy: ReconnectPolicy,
}

impl UpdatePump {
    pub fn new(
        transport: Arc<dyn UpdateTransport>,
        dispatcher: EventDispatcher,
        platform: Arc<dyn MessagingPlatform>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, platform, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "chat update transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "chat update retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening chat update transport");
        self.transport.connect().await?;
        info!(attempt, "chat update transport connected");

        loop {
            let Some(envelope) = self.transport.next_update().await? else {
                info!(attempt, "chat update stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let context = EventContext::for_envelope(&envelope);

            info!(
                event_name = "ingress.chat.update_received",
                update_id = %envelope.update_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %context.correlation_id,
                user_id = envelope.sender.user_id.0,
                chat_id = envelope.sender.chat_id.0,
                "received chat update"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.update_id).await {
                warn!(
                    event_name = "ingress.chat.ack_failed",
                    update_id = %envelope.update_id,
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "failed to acknowledge chat update"
                );
            } else {
                debug!(
                    event_name = "ingress.chat.ack_sent",
                    update_id = %envelope.update_id,
                    correlation_id = %context.correlation_id,
                    "acknowledged chat update"
                );
            }

            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Responded(reply)) => {
                    if let Err(error) = self.deliver(&envelope.sender, reply).await {
                        warn!(
                            event_name = "egress.chat.delivery_failed",
                            update_id = %envelope.update_id,
                            correlation_id = %context.correlation_id,
                            error = %error,
                            "reply delivery failed; continuing update loop"
                        );
                    }
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        update_id = %envelope.update_id,
                        correlation_id = %context.correlation_id,
                        error = %error,
                        "event dispatch failed; continuing update loop"
                    );
                }
            }
        }
    }

    async fn deliver(&self, sender: &Sender, reply: Reply) -> Result<(), PlatformError> {
        let platform = self.platform.as_ref();
        match reply {
            Reply::Press { handle, current, response } => {
                apply_edit(platform, &handle, Some(current), response.edit).await?;
                if let Some(toast) = &response.toast {
                    platform.toast(sender.user_id, toast).await?;
                }
                if let Some(prompt) = &response.prompt {
                    platform.prompt(prompt).await?;
                }
                if response.reauthorize {
                    platform.request_authorization(sender.user_id).await?;
                }
                Ok(())
            }
            Reply::Edit { handle, edit } => apply_edit(platform, &handle, None, edit).await,
            Reply::NewCard { chat, card } => {
                platform.render(chat, &card.text, &card.panel).await.map(|_| ())
            }
            Reply::Text { chat, text } => platform.send(chat, &text).await,
            Reply::Filters { chat, reply: FilterReply::Finished { text } } => {
                platform.reply_keyboard(chat, &text, None).await
            }
            Reply::Filters { chat, reply: FilterReply::Updated { text, keyboard } } => {
                platform.reply_keyboard(chat, &text, Some(&keyboard)).await
            }
            Reply::SearchResults { query_id, results } => {
                platform.search_results(&query_id, &results).await
            }
            Reply::Choose { chat, text, options } => platform.choose(chat, &text, &options).await,
            Reply::Authorize => platform.request_authorization(sender.user_id).await,
        }
    }
}

async fn apply_edit(
    platform: &dyn MessagingPlatform,
    handle: &MessageHandle,
    current: Option<Panel>,
    edit: PanelEdit,
) -> Result<(), PlatformError> {
    match edit {
        PanelEdit::Unchanged => Ok(()),
        PanelEdit::ReplaceButton(button) => {
            let Some(mut panel) = current else {
                return Ok(());
            };
            if !panel.replace_button(button) {
                debug!(
                    event_name = "egress.chat.button_missing",
                    chat_id = handle.chat_id.0,
                    message_id = handle.message_id,
                    "pressed button no longer on the panel"
                );
                return Ok(());
            }
            platform.edit(handle, None, Some(&panel)).await
        }
        PanelEdit::Replace { text, panel } => platform.edit(handle, Some(&text), Some(&panel)).await,
    }
}
