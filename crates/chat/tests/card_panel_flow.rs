use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use boardlink_chat::events::ButtonPressEvent;
use boardlink_chat::filters::FilterKeyboard;
use boardlink_chat::interaction::SearchResults;
use boardlink_chat::platform::InputPrompt;
use boardlink_chat::render;
use boardlink_chat::updates::TransportError;
use boardlink_chat::{
    dispatcher, ActorResolver, CardCreator, CardInteraction, ChatEnvelope, ChatEvent,
    ChatServices, FilterTuner, MessageHandle, MessagingPlatform, PlatformError, ReconnectPolicy,
    Sender, UpdatePump, UpdateTransport,
};
use boardlink_core::panel::{ButtonId, Command, Panel, STATE_OFF, STATE_ON};
use boardlink_core::ports::{
    CardMutation, CredentialStore, InMemoryCacheStore, InMemoryCredentialStore,
    InMemorySettingsStore,
};
use boardlink_core::testing::{self, RemoteFixture, ScriptedRemote};
use boardlink_core::{
    BoardDetail, BoardId, CacheTtls, CardId, ChatId, Credential, EntityCache, MemberId,
    NotificationSettings, RemoteGuard, SubscriptionManager, UserId,
};
use tokio::sync::Mutex;

const USER: UserId = UserId(1);
const CHAT: ChatId = ChatId(10);

struct QueuedUpdates(Mutex<VecDeque<ChatEnvelope>>);

#[async_trait]
impl UpdateTransport for QueuedUpdates {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_update(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        Ok(self.0.lock().await.pop_front())
    }

    async fn acknowledge(&self, _update_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Default)]
struct ChatLog {
    edits: Mutex<Vec<(MessageHandle, Option<String>, Option<Panel>)>>,
    toasts: Mutex<Vec<String>>,
    authorizations: Mutex<Vec<UserId>>,
}

#[async_trait]
impl MessagingPlatform for ChatLog {
    async fn render(
        &self,
        chat: ChatId,
        _text: &str,
        _panel: &Panel,
    ) -> Result<MessageHandle, PlatformError> {
        Ok(MessageHandle { chat_id: chat, message_id: 100 })
    }

    async fn edit(
        &self,
        handle: &MessageHandle,
        text: Option<&str>,
        panel: Option<&Panel>,
    ) -> Result<(), PlatformError> {
        self.edits.lock().await.push((handle.clone(), text.map(str::to_owned), panel.cloned()));
        Ok(())
    }

    async fn toast(&self, _user: UserId, text: &str) -> Result<(), PlatformError> {
        self.toasts.lock().await.push(text.to_owned());
        Ok(())
    }

    async fn prompt(&self, _prompt: &InputPrompt) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn send(&self, _chat: ChatId, _text: &str) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn request_authorization(&self, user: UserId) -> Result<(), PlatformError> {
        self.authorizations.lock().await.push(user);
        Ok(())
    }

    async fn search_results(
        &self,
        _query_id: &str,
        _results: &SearchResults,
    ) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn choose(
        &self,
        _chat: ChatId,
        _text: &str,
        _options: &[String],
    ) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn reply_keyboard(
        &self,
        _chat: ChatId,
        _text: &str,
        _keyboard: Option<&FilterKeyboard>,
    ) -> Result<(), PlatformError> {
        Ok(())
    }
}

struct Bot {
    remote: Arc<ScriptedRemote>,
    credentials: Arc<InMemoryCredentialStore>,
    cache: EntityCache,
    services: ChatServices,
}

fn bot() -> Bot {
    let mut fixture = RemoteFixture::new(testing::member("alice", "alice"));
    fixture.boards = vec![testing::board("b1", "Roadmap")];
    fixture.details.insert(
        BoardId::new("b1"),
        BoardDetail {
            lists: vec![testing::list("l1", "Todo", "b1")],
            members: vec![testing::member("alice", "alice"), testing::member("bob", "bob")],
            labels: vec![],
        },
    );
    let mut card = testing::card("c1", "Fix login", "b1", "l1");
    card.id_members = vec![MemberId::new("bob")];
    card.members = vec![testing::member("bob", "bob")];
    fixture.cards.insert(CardId::new("c1"), card);

    let remote = Arc::new(ScriptedRemote::new(fixture));
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
            settings,
            credentials.clone(),
            "https://bot.example",
        ),
        cache: cache.clone(),
        credentials: credentials.clone(),
    };
    Bot { remote, credentials, cache, services }
}

fn handle() -> MessageHandle {
    MessageHandle { chat_id: CHAT, message_id: 42 }
}

fn press(panel: Panel, button: ButtonId, state: Option<u8>) -> ChatEnvelope {
    ChatEnvelope {
        update_id: "upd-7".to_owned(),
        sender: Sender { user_id: USER, chat_id: CHAT, utc_offset_secs: 3_600 },
        event: ChatEvent::ButtonPress(ButtonPressEvent {
            handle: handle(),
            card: CardId::new("c1"),
            panel,
            button: button.encode(),
            state,
        }),
    }
}

async fn run(bot: &Bot, update: ChatEnvelope) -> Arc<ChatLog> {
    let log = Arc::new(ChatLog::default());
    let transport = Arc::new(QueuedUpdates(Mutex::new(VecDeque::from([update]))));
    UpdatePump::new(
        transport,
        dispatcher(&bot.services),
        log.clone(),
        ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
    )
    .start()
    .await
    .expect("pump");
    log
}

fn label_of<'a>(panel: &'a Panel, id: &ButtonId) -> Option<&'a str> {
    panel.find(id).map(|button| button.label.as_str())
}

#[tokio::test]
async fn assigning_a_member_relabels_only_that_button() {
    let bot = bot();
    bot.credentials.store_credential(USER, &Credential::new("token")).await.expect("credential");

    let card = testing::card("c1", "Fix login", "b1", "l1");
    let mut shown_card = card.clone();
    shown_card.id_members = vec![MemberId::new("bob")];
    let shown = render::assign_panel(
        &shown_card,
        &[testing::member("alice", "alice"), testing::member("bob", "bob")],
    );
    let alice = ButtonId::Member(MemberId::new("alice"));
    let bob = ButtonId::Member(MemberId::new("bob"));
    assert_eq!(label_of(&shown, &alice), Some("   @alice"));

    let log = run(&bot, press(shown.clone(), alice.clone(), Some(STATE_OFF))).await;

    assert_eq!(
        bot.remote.mutations().await,
        vec![(CardId::new("c1"), CardMutation::AddMember(MemberId::new("alice")))]
    );

    let edits = log.edits.lock().await.clone();
    assert_eq!(edits.len(), 1);
    let (edited, text, panel) = &edits[0];
    assert_eq!(edited, &handle());
    assert_eq!(text, &None);
    let panel = panel.as_ref().expect("panel edit");
    assert_eq!(label_of(panel, &alice), Some("✅ @alice"));
    assert_eq!(panel.find(&alice).and_then(|button| button.state), Some(STATE_ON));
    assert_eq!(label_of(panel, &bob), label_of(&shown, &bob));
    assert_eq!(panel.rows.len(), shown.rows.len());

    let sender = Sender { user_id: USER, chat_id: CHAT, utc_offset_secs: 0 };
    let actor = bot.services.actors.resolve(&sender).await.expect("actor");
    let cached = bot.cache.card(&actor, &CardId::new("c1")).await.expect("cached card");
    assert_eq!(cached.id_members, vec![MemberId::new("bob"), MemberId::new("alice")]);
}

#[tokio::test]
async fn revoked_credential_leaves_panel_untouched() {
    let bot = bot();
    bot.credentials.store_credential(USER, &Credential::new("token")).await.expect("credential");
    bot.credentials.invalidate(USER).await.expect("revoke");

    let card = testing::card("c1", "Fix login", "b1", "l1");
    let shown = render::collapsed_panel(&card);
    let log = run(&bot, press(shown, ButtonId::Command(Command::Vote), Some(STATE_OFF))).await;

    assert!(bot.remote.calls().await.is_empty());
    assert!(log.edits.lock().await.is_empty());
    assert_eq!(log.authorizations.lock().await.clone(), vec![USER]);
    assert_eq!(log.toasts.lock().await.len(), 1);
}
