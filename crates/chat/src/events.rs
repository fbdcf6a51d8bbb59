use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use boardlink_core::cache::EntityCache;
use boardlink_core::domain::identity::{Actor, ChatId, Credential, UserId};
use boardlink_core::domain::{BoardId, CardId, ListId};
use boardlink_core::panel::{ButtonId, Panel};
use boardlink_core::ports::{CredentialStore, StoreError};
use boardlink_core::subscriptions::{SubscriptionManager, SubscriptionOutcome};
use chrono::FixedOffset;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::drafts::{CardCreator, DraftReply};
use crate::filters::{FilterReply, FilterTuner};
use crate::interaction::{
    ButtonPress, CardInteraction, InteractionError, PanelEdit, PressResponse, RenderedCard,
    SearchResults,
};
use crate::platform::MessageHandle;

#[derive(Clone, Debug)]
pub struct ChatEnvelope {
    pub update_id: String,
    pub sender: Sender,
    pub event: ChatEvent,
}

/// Who caused an update and where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub utc_offset_secs: i32,
}

#[derive(Clone, Debug)]
pub enum ChatEvent {
    ButtonPress(ButtonPressEvent),
    TextReply(TextReplyEvent),
    FilterPress(FilterPressEvent),
    LinkBoard(LinkBoardEvent),
    ShowCard(ShowCardEvent),
    Search(SearchEvent),
    CardChosen(CardChosenEvent),
    CreateCard(CreateCardEvent),
    /// The user asked to file a new card step by step.
    StartCard,
    Authorized(AuthorizedEvent),
    /// The user asked to drop their credential and authorize again.
    Reauthorize,
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::ButtonPress(_) => ChatEventType::ButtonPress,
            Self::TextReply(_) => ChatEventType::TextReply,
            Self::FilterPress(_) => ChatEventType::FilterPress,
            Self::LinkBoard(_) => ChatEventType::LinkBoard,
            Self::ShowCard(_) => ChatEventType::ShowCard,
            Self::Search(_) => ChatEventType::Search,
            Self::CardChosen(_) => ChatEventType::CardChosen,
            Self::CreateCard(_) => ChatEventType::CreateCard,
            Self::StartCard => ChatEventType::StartCard,
            Self::Authorized(_) => ChatEventType::Authorized,
            Self::Reauthorize => ChatEventType::Reauthorize,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    ButtonPress,
    TextReply,
    FilterPress,
    LinkBoard,
    ShowCard,
    Search,
    CardChosen,
    CreateCard,
    StartCard,
    Authorized,
    Reauthorize,
    Unsupported,
}

/// A press on a card panel. `panel` is the panel as currently shown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonPressEvent {
    pub handle: MessageHandle,
    pub card: CardId,
    pub panel: Panel,
    pub button: String,
    pub state: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextReplyEvent {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterPressEvent {
    pub board: BoardId,
    pub button: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkBoardEvent {
    pub board: BoardId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShowCardEvent {
    pub card: CardId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchEvent {
    pub query_id: String,
    pub query: String,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardChosenEvent {
    pub card: CardId,
}

/// A list offer picked from search results. `handle` is the message the
/// host posted for it, to be replaced by the new card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateCardEvent {
    pub handle: MessageHandle,
    pub list: ListId,
    pub name: String,
}

/// A fresh credential handed over by the authorization flow.
#[derive(Clone, Debug)]
pub struct AuthorizedEvent {
    pub credential: Credential,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl EventContext {
    pub fn for_envelope(envelope: &ChatEnvelope) -> Self {
        if envelope.update_id.is_empty() {
            Self { correlation_id: Uuid::new_v4().to_string() }
        } else {
            Self { correlation_id: envelope.update_id.clone() }
        }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// What the messaging host has to do in answer to an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Press { handle: MessageHandle, current: Panel, response: PressResponse },
    Edit { handle: MessageHandle, edit: PanelEdit },
    NewCard { chat: ChatId, card: RenderedCard },
    Text { chat: ChatId, text: String },
    Filters { chat: ChatId, reply: FilterReply },
    SearchResults { query_id: String, results: SearchResults },
    Choose { chat: ChatId, text: String, options: Vec<String> },
    Authorize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Reply),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("user state unavailable: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Builds the acting user from the sender and the stored credential.
#[derive(Clone)]
pub struct ActorResolver {
    credentials: Arc<dyn CredentialStore>,
}

impl ActorResolver {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    pub async fn resolve(&self, sender: &Sender) -> Result<Actor, StoreError> {
        let credential = self.credentials.credential(sender.user_id).await?;
        let actor = Actor::new(sender.user_id, sender.chat_id, credential);
        Ok(match FixedOffset::east_opt(sender.utc_offset_secs) {
            Some(offset) => actor.with_utc_offset(offset),
            None => actor,
        })
    }
}

/// Everything the card handlers share.
#[derive(Clone)]
pub struct ChatServices {
    pub actors: ActorResolver,
    pub interaction: CardInteraction,
    pub creator: CardCreator,
    pub tuner: FilterTuner,
    pub subscriptions: SubscriptionManager,
    pub cache: EntityCache,
    pub credentials: Arc<dyn CredentialStore>,
}

pub fn dispatcher(services: &ChatServices) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ButtonPressHandler::new(services.clone()));
    dispatcher.register(TextReplyHandler::new(services.clone()));
    dispatcher.register(FilterPressHandler::new(services.clone()));
    dispatcher.register(LinkBoardHandler::new(services.clone()));
    dispatcher.register(ShowCardHandler::new(services.clone()));
    dispatcher.register(SearchHandler::new(services.clone()));
    dispatcher.register(CardChosenHandler::new(services.clone()));
    dispatcher.register(CreateCardHandler::new(services.clone()));
    dispatcher.register(StartCardHandler::new(services.clone()));
    dispatcher.register(AuthorizedHandler::new(services.clone()));
    dispatcher.register(ReauthorizeHandler::new(services.clone()));
    dispatcher
}

fn log_failure(ctx: &EventContext, sender: &Sender, operation: &'static str, error: &InteractionError) {
    warn!(
        event_name = "interaction.failed",
        correlation_id = %ctx.correlation_id,
        user_id = sender.user_id.0,
        operation,
        retryable = error.is_retryable(),
        error = %error,
        "chat interaction failed"
    );
}

fn failure_reply(sender: &Sender, error: &InteractionError) -> Reply {
    if error.needs_reauthorization() {
        Reply::Authorize
    } else {
        Reply::Text { chat: sender.chat_id, text: error.user_message().to_owned() }
    }
}

fn draft_reply(chat: ChatId, reply: DraftReply) -> Reply {
    match reply {
        DraftReply::Choose { text, options } => Reply::Choose { chat, text, options },
        DraftReply::Ask { text } => Reply::Choose { chat, text, options: Vec::new() },
        DraftReply::Created(card) => Reply::NewCard { chat, card },
    }
}

macro_rules! handler {
    ($name:ident) => {
        pub struct $name {
            services: ChatServices,
        }

        impl $name {
            pub fn new(services: ChatServices) -> Self {
                Self { services }
            }
        }
    };
}

handler!(ButtonPressHandler);
handler!(TextReplyHandler);
handler!(FilterPressHandler);
handler!(LinkBoardHandler);
handler!(ShowCardHandler);
handler!(SearchHandler);
handler!(CardChosenHandler);
handler!(CreateCardHandler);
handler!(StartCardHandler);
handler!(AuthorizedHandler);
handler!(ReauthorizeHandler);

#[async_trait]
impl EventHandler for ButtonPressHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ButtonPress
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ButtonPress(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let actor = self.services.actors.resolve(&envelope.sender).await?;

        let result = match ButtonId::parse(&event.button) {
            Ok(button) => {
                let press = ButtonPress {
                    handle: event.handle.clone(),
                    card: event.card.clone(),
                    menu: event.panel.menu,
                    button,
                    state: event.state,
                };
                self.services.interaction.handle_press(&actor, &press).await
            }
            Err(error) => Err(InteractionError::from(error)),
        };
        let response = result.unwrap_or_else(|error| {
            log_failure(ctx, &envelope.sender, "button_press", &error);
            PressResponse::from_error(&error)
        });

        Ok(HandlerResult::Responded(Reply::Press {
            handle: event.handle.clone(),
            current: event.panel.clone(),
            response,
        }))
    }
}

#[async_trait]
impl EventHandler for TextReplyHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::TextReply
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::TextReply(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let actor = self.services.actors.resolve(&envelope.sender).await?;

        let chat = envelope.sender.chat_id;

        let result = match self.services.interaction.complete_input(&actor, &event.text).await {
            Ok(Some(completion)) => {
                Ok(Some(Reply::Edit { handle: completion.handle, edit: completion.edit }))
            }
            Ok(None) => self
                .services
                .creator
                .advance(&actor, &event.text)
                .await
                .map(|reply| reply.map(|reply| draft_reply(chat, reply))),
            Err(error) => Err(error),
        };
        match result {
            Ok(Some(reply)) => Ok(HandlerResult::Responded(reply)),
            Ok(None) => Ok(HandlerResult::Ignored),
            Err(error) => {
                log_failure(ctx, &envelope.sender, "text_reply", &error);
                Ok(HandlerResult::Responded(failure_reply(&envelope.sender, &error)))
            }
        }
    }
}

#[async_trait]
impl EventHandler for FilterPressHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::FilterPress
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::FilterPress(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let chat = envelope.sender.chat_id;

        let reply = match self.services.tuner.press(chat, &event.board, &event.button).await {
            Ok(reply) => Reply::Filters { chat, reply },
            Err(error) => {
                warn!(
                    event_name = "notifications.filter_press_failed",
                    correlation_id = %ctx.correlation_id,
                    chat_id = chat.0,
                    board_id = %event.board,
                    error = %error,
                    "filter press failed"
                );
                Reply::Text { chat, text: error.user_message().to_owned() }
            }
        };
        Ok(HandlerResult::Responded(reply))
    }
}

#[async_trait]
impl EventHandler for LinkBoardHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::LinkBoard
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::LinkBoard(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let actor = self.services.actors.resolve(&envelope.sender).await?;
        let chat = envelope.sender.chat_id;

        let board = match self.services.cache.board(&actor, &event.board).await {
            Ok(Some(board)) => board,
            Ok(None) => {
                return Ok(HandlerResult::Responded(Reply::Text {
                    chat,
                    text: "That board is not available to you.".to_owned(),
                }))
            }
            Err(error) => {
                let error = InteractionError::from(error);
                log_failure(ctx, &envelope.sender, "link_board", &error);
                return Ok(HandlerResult::Responded(failure_reply(&envelope.sender, &error)));
            }
        };

        let outcome = self.services.subscriptions.ensure_subscription(&actor, &board, chat).await;
        let reply = match outcome {
            Ok(SubscriptionOutcome::DeferredUntilReauthorized) => Reply::Authorize,
            Ok(outcome) => {
                info!(
                    event_name = "subscription.board_linked",
                    correlation_id = %ctx.correlation_id,
                    chat_id = chat.0,
                    board_id = %board.id,
                    outcome = ?outcome,
                    "board linked to chat"
                );
                match self.services.tuner.keyboard(chat, &board.id).await {
                    Ok(keyboard) => Reply::Filters {
                        chat,
                        reply: FilterReply::Updated {
                            text: format!("Tune notifications for \"{}\" board", board.name),
                            keyboard,
                        },
                    },
                    Err(error) => Reply::Text { chat, text: error.user_message().to_owned() },
                }
            }
            Err(error) => {
                warn!(
                    event_name = "subscription.link_failed",
                    correlation_id = %ctx.correlation_id,
                    chat_id = chat.0,
                    board_id = %board.id,
                    retryable = error.is_retryable(),
                    error = %error,
                    "could not subscribe to board"
                );
                let text = if error.is_retryable() {
                    "The board service is temporarily unavailable. Please retry shortly."
                } else {
                    "Could not connect the board. Please try again."
                };
                Reply::Text { chat, text: text.to_owned() }
            }
        };
        Ok(HandlerResult::Responded(reply))
    }
}

#[async_trait]
impl EventHandler for ShowCardHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ShowCard
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ShowCard(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let actor = self.services.actors.resolve(&envelope.sender).await?;

        let reply = match self.services.interaction.render_card(&actor, &event.card).await {
            Ok(card) => Reply::NewCard { chat: envelope.sender.chat_id, card },
            Err(error) => {
                log_failure(ctx, &envelope.sender, "show_card", &error);
                failure_reply(&envelope.sender, &error)
            }
        };
        Ok(HandlerResult::Responded(reply))
    }
}

#[async_trait]
impl EventHandler for SearchHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Search
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Search(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let actor = self.services.actors.resolve(&envelope.sender).await?;

        let reply =
            match self.services.interaction.search(&actor, &event.query, event.offset).await {
                Ok(results) => Reply::SearchResults { query_id: event.query_id.clone(), results },
                Err(error) => {
                    log_failure(ctx, &envelope.sender, "search", &error);
                    if error.needs_reauthorization() {
                        Reply::Authorize
                    } else {
                        Reply::SearchResults {
                            query_id: event.query_id.clone(),
                            results: SearchResults::default(),
                        }
                    }
                }
            };
        Ok(HandlerResult::Responded(reply))
    }
}

#[async_trait]
impl EventHandler for CardChosenHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::CardChosen
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::CardChosen(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let actor = self.services.actors.resolve(&envelope.sender).await?;

        if let Err(error) = self.services.interaction.card_chosen(&actor, &event.card).await {
            log_failure(ctx, &envelope.sender, "card_chosen", &error);
        }
        Ok(HandlerResult::Processed)
    }
}

#[async_trait]
impl EventHandler for CreateCardHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::CreateCard
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::CreateCard(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let actor = self.services.actors.resolve(&envelope.sender).await?;

        let reply = match self.services.creator.create(&actor, &event.list, &event.name).await {
            Ok(card) => Reply::Edit {
                handle: event.handle.clone(),
                edit: PanelEdit::Replace { text: card.text, panel: card.panel },
            },
            Err(error) => {
                log_failure(ctx, &envelope.sender, "create_card", &error);
                failure_reply(&envelope.sender, &error)
            }
        };
        Ok(HandlerResult::Responded(reply))
    }
}

#[async_trait]
impl EventHandler for StartCardHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::StartCard
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let actor = self.services.actors.resolve(&envelope.sender).await?;

        let reply = match self.services.creator.start(&actor).await {
            Ok(reply) => draft_reply(envelope.sender.chat_id, reply),
            Err(error) => {
                log_failure(ctx, &envelope.sender, "start_card", &error);
                failure_reply(&envelope.sender, &error)
            }
        };
        Ok(HandlerResult::Responded(reply))
    }
}

#[async_trait]
impl EventHandler for AuthorizedHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Authorized
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::Authorized(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let sender = &envelope.sender;
        self.services.credentials.store_credential(sender.user_id, &event.credential).await?;
        let actor = self.services.actors.resolve(sender).await?;
        if let Err(error) = self.services.cache.forget_user(&actor).await {
            warn!(
                event_name = "cache.user.forget_failed",
                correlation_id = %ctx.correlation_id,
                user_id = sender.user_id.0,
                error = %error,
                "could not drop user cache after authorization"
            );
        }

        let text = match self.services.subscriptions.on_reauthorized(&actor).await {
            Ok(report) => {
                info!(
                    event_name = "subscription.reauthorized",
                    correlation_id = %ctx.correlation_id,
                    user_id = sender.user_id.0,
                    renewed = report.resubscribed.renewed.len(),
                    replayed = report.replayed.len(),
                    failed = report.failed.len() + report.resubscribed.failed.len(),
                    "authorization completed"
                );
                "Authorization completed, your boards are connected.".to_owned()
            }
            Err(error) => {
                warn!(
                    event_name = "subscription.reauthorization_failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = sender.user_id.0,
                    error = %error,
                    "could not renew subscriptions after authorization"
                );
                "Authorization completed, but some boards could not be reconnected yet.".to_owned()
            }
        };
        Ok(HandlerResult::Responded(Reply::Text { chat: sender.chat_id, text }))
    }
}

#[async_trait]
impl EventHandler for ReauthorizeHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Reauthorize
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let sender = &envelope.sender;
        self.services.credentials.invalidate(sender.user_id).await?;
        let actor = self.services.actors.resolve(sender).await?;
        if let Err(error) = self.services.cache.forget_user(&actor).await {
            warn!(
                event_name = "cache.user.forget_failed",
                correlation_id = %ctx.correlation_id,
                user_id = sender.user_id.0,
                error = %error,
                "could not drop user cache after credential reset"
            );
        }
        info!(
            event_name = "identity.credential.reset",
            correlation_id = %ctx.correlation_id,
            user_id = sender.user_id.0,
            "credential dropped on request"
        );
        Ok(HandlerResult::Responded(Reply::Authorize))
    }
}

#[cfg(test)]
mod tests {
    use boardlink_core::cache::{CacheTtls, RemoteGuard};
    use boardlink_core::domain::board::BoardDetail;
    use boardlink_core::notifications::NotificationSettings;
    use boardlink_core::panel::{Command, Menu, STATE_OFF};
    use boardlink_core::ports::{
        InMemoryCacheStore, InMemoryCredentialStore, InMemorySettingsStore, SettingsStore,
    };
    use boardlink_core::testing::{self, RemoteFixture, ScriptedRemote};

    use super::*;
    use crate::render;

    struct Fixture {
        dispatcher: EventDispatcher,
        remote: Arc<ScriptedRemote>,
        credentials: Arc<InMemoryCredentialStore>,
        settings: Arc<InMemorySettingsStore>,
    }

    fn fixture() -> Fixture {
        let mut remote_fixture = RemoteFixture::new(testing::member("alice", "alice"));
        remote_fixture.boards = vec![testing::board("b1", "Roadmap")];
        remote_fixture.details.insert(
            BoardId::new("b1"),
            BoardDetail {
                lists: vec![testing::list("l1", "Todo", "b1")],
                ..BoardDetail::default()
            },
        );
        remote_fixture
            .cards
            .insert(CardId::new("c1"), testing::card("c1", "Fix login", "b1", "l1"));
        let remote = Arc::new(ScriptedRemote::new(remote_fixture));
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let settings = Arc::new(InMemorySettingsStore::new());
        let guard = RemoteGuard::new(remote.clone(), credentials.clone());
        let cache =
            EntityCache::new(Arc::new(InMemoryCacheStore::new()), guard.clone(), CacheTtls::default());
        let services = ChatServices {
            actors: ActorResolver::new(credentials.clone()),
            interaction: CardInteraction::new(cache.clone()),
            creator: CardCreator::new(cache.clone()),
            tuner: FilterTuner::new(NotificationSettings::new(settings.clone())),
            subscriptions: SubscriptionManager::new(
                guard,
                settings.clone(),
                credentials.clone(),
                "https://bot.example",
            ),
            cache,
            credentials: credentials.clone(),
        };
        Fixture { dispatcher: dispatcher(&services), remote, credentials, settings }
    }

    fn envelope(event: ChatEvent) -> ChatEnvelope {
        ChatEnvelope {
            update_id: "upd-1".to_owned(),
            sender: Sender { user_id: UserId(1), chat_id: ChatId(10), utc_offset_secs: 0 },
            event,
        }
    }

    fn press(button: &str, state: Option<u8>) -> ChatEvent {
        let card = testing::card("c1", "Fix login", "b1", "l1");
        ChatEvent::ButtonPress(ButtonPressEvent {
            handle: MessageHandle { chat_id: ChatId(10), message_id: 5 },
            card: card.id.clone(),
            panel: render::expanded_panel(&card),
            button: button.to_owned(),
            state,
        })
    }

    async fn authorize(fixture: &Fixture) {
        fixture
            .credentials
            .store_credential(UserId(1), &Credential::new("token"))
            .await
            .expect("store credential");
    }

    #[tokio::test]
    async fn every_event_kind_has_a_handler() {
        let fixture = fixture();
        assert_eq!(fixture.dispatcher.handler_count(), 11);

        let result = fixture
            .dispatcher
            .dispatch(
                &envelope(ChatEvent::Unsupported { event_type: "sticker".to_owned() }),
                &EventContext::default(),
            )
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn press_without_credential_asks_to_authorize() {
        let fixture = fixture();
        let result = fixture
            .dispatcher
            .dispatch(&envelope(press("cmd:archive", Some(1))), &EventContext::default())
            .await
            .expect("dispatch");

        let HandlerResult::Responded(Reply::Press { response, .. }) = result else {
            panic!("expected a press reply");
        };
        assert!(response.reauthorize);
        assert_eq!(response.edit, PanelEdit::Unchanged);
        assert!(fixture.remote.calls().await.is_empty());
    }

    #[tokio::test]
    async fn garbled_button_becomes_a_notice() {
        let fixture = fixture();
        authorize(&fixture).await;
        let result = fixture
            .dispatcher
            .dispatch(&envelope(press("archive", Some(1))), &EventContext::default())
            .await
            .expect("dispatch");

        let HandlerResult::Responded(Reply::Press { response, .. }) = result else {
            panic!("expected a press reply");
        };
        assert_eq!(response, PressResponse::notice("That button is no longer available."));
    }

    #[tokio::test]
    async fn archive_press_returns_relabeled_button_and_current_panel() {
        let fixture = fixture();
        authorize(&fixture).await;
        let result = fixture
            .dispatcher
            .dispatch(&envelope(press("cmd:archive", Some(1))), &EventContext::default())
            .await
            .expect("dispatch");

        let HandlerResult::Responded(Reply::Press { current, response, .. }) = result else {
            panic!("expected a press reply");
        };
        assert_eq!(current.menu, Menu::Expanded);
        let PanelEdit::ReplaceButton(button) = response.edit else {
            panic!("expected a relabeled button");
        };
        assert_eq!(button.id, ButtonId::Command(Command::Archive));
        assert_eq!(button.state, Some(STATE_OFF));
    }

    #[tokio::test]
    async fn linking_a_board_subscribes_and_opens_filters() {
        let fixture = fixture();
        authorize(&fixture).await;
        let result = fixture
            .dispatcher
            .dispatch(
                &envelope(ChatEvent::LinkBoard(LinkBoardEvent { board: BoardId::new("b1") })),
                &EventContext::default(),
            )
            .await
            .expect("dispatch");

        let HandlerResult::Responded(Reply::Filters { reply, .. }) = result else {
            panic!("expected the filter keyboard");
        };
        assert!(matches!(reply, FilterReply::Updated { .. }));
        assert_eq!(fixture.remote.created_webhooks().await, 1);
        let chat = fixture.settings.chat_settings(ChatId(10)).await.expect("chat settings");
        assert!(chat.boards.contains_key(&BoardId::new("b1")));
    }

    #[tokio::test]
    async fn text_without_pending_question_is_ignored() {
        let fixture = fixture();
        authorize(&fixture).await;
        let result = fixture
            .dispatcher
            .dispatch(
                &envelope(ChatEvent::TextReply(TextReplyEvent { text: "hello".to_owned() })),
                &EventContext::default(),
            )
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn authorization_stores_credential_and_reports() {
        let fixture = fixture();
        let result = fixture
            .dispatcher
            .dispatch(
                &envelope(ChatEvent::Authorized(AuthorizedEvent {
                    credential: Credential::new("fresh"),
                })),
                &EventContext::default(),
            )
            .await
            .expect("dispatch");

        assert!(matches!(result, HandlerResult::Responded(Reply::Text { .. })));
        let stored = fixture.credentials.credential(UserId(1)).await.expect("load");
        assert_eq!(stored.map(|credential| credential.token().to_owned()).as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn reauthorize_drops_credential_and_cached_boards() {
        let fixture = fixture();
        authorize(&fixture).await;
        fixture
            .dispatcher
            .dispatch(&envelope(ChatEvent::StartCard), &EventContext::default())
            .await
            .expect("warm boards");
        assert_eq!(fixture.remote.call_count("boards").await, 1);

        let result = fixture
            .dispatcher
            .dispatch(&envelope(ChatEvent::Reauthorize), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Responded(Reply::Authorize));
        assert!(fixture.credentials.credential(UserId(1)).await.expect("load").is_none());

        authorize(&fixture).await;
        fixture
            .dispatcher
            .dispatch(&envelope(ChatEvent::StartCard), &EventContext::default())
            .await
            .expect("refetch boards");
        assert_eq!(fixture.remote.call_count("boards").await, 2);
    }

    #[tokio::test]
    async fn picked_list_offer_is_replaced_by_the_new_card() {
        let fixture = fixture();
        authorize(&fixture).await;
        let handle = MessageHandle { chat_id: ChatId(10), message_id: 9 };
        let result = fixture
            .dispatcher
            .dispatch(
                &envelope(ChatEvent::CreateCard(CreateCardEvent {
                    handle: handle.clone(),
                    list: ListId::new("l1"),
                    name: "Draft changelog".to_owned(),
                })),
                &EventContext::default(),
            )
            .await
            .expect("dispatch");

        let HandlerResult::Responded(Reply::Edit { handle: edited, edit }) = result else {
            panic!("expected the offer to be replaced");
        };
        assert_eq!(edited, handle);
        let PanelEdit::Replace { text, panel } = edit else {
            panic!("expected a full replacement");
        };
        assert!(text.starts_with("Draft changelog"));
        assert_eq!(panel.menu, Menu::Collapsed);
        assert_eq!(fixture.remote.call_count("create_card").await, 1);
    }

    #[tokio::test]
    async fn new_card_draft_is_driven_by_text_replies() {
        let fixture = fixture();
        authorize(&fixture).await;
        let ctx = EventContext::default();
        let reply = |text: &str| {
            envelope(ChatEvent::TextReply(TextReplyEvent { text: text.to_owned() }))
        };

        let started =
            fixture.dispatcher.dispatch(&envelope(ChatEvent::StartCard), &ctx).await.expect("start");
        assert_eq!(
            started,
            HandlerResult::Responded(Reply::Choose {
                chat: ChatId(10),
                text: "Select the board to create a card".to_owned(),
                options: vec!["Roadmap".to_owned()],
            })
        );

        fixture.dispatcher.dispatch(&reply("Roadmap"), &ctx).await.expect("board");
        let asked = fixture.dispatcher.dispatch(&reply("Todo"), &ctx).await.expect("list");
        let HandlerResult::Responded(Reply::Choose { options, .. }) = asked else {
            panic!("expected the title question");
        };
        assert!(options.is_empty());

        let created = fixture.dispatcher.dispatch(&reply("Ship it"), &ctx).await.expect("title");
        let HandlerResult::Responded(Reply::NewCard { chat, card }) = created else {
            panic!("expected the new card");
        };
        assert_eq!(chat, ChatId(10));
        assert!(card.text.starts_with("Ship it"));

        let after = fixture.dispatcher.dispatch(&reply("again"), &ctx).await.expect("after");
        assert_eq!(after, HandlerResult::Ignored);
    }
}
