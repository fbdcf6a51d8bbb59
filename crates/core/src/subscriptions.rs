//! Idempotent webhook subscriptions per (board, credential).

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::RemoteGuard;
use crate::domain::board::Board;
use crate::domain::identity::{Actor, ChatId, Credential, CredentialFingerprint, UserId};
use crate::domain::settings::{ChatBoardSetting, DeferredAction, UserBoardSubscription};
use crate::domain::webhook::WebhookInfo;
use crate::domain::{BoardId, WebhookId};
use crate::errors::CoreError;
use crate::ports::{ConflictKind, CredentialStore, RemoteError, SettingsStore, StoreError};

pub const WEBHOOK_DESCRIPTION: &str = "boardlink";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    None,
    Creating,
    Active,
    Stale,
}

impl SubscriptionState {
    pub fn of(
        record: Option<&UserBoardSubscription>,
        current: Option<&CredentialFingerprint>,
    ) -> Self {
        match (record, current) {
            (None, _) => Self::None,
            (Some(record), Some(current))
                if &record.fingerprint == current && !record.webhook_id.0.is_empty() =>
            {
                Self::Active
            }
            (Some(_), _) => Self::Stale,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    /// Record and chat link already exist; nothing was called.
    AlreadyActive { webhook: WebhookId },
    /// Record was current; only the chat link was written.
    Linked { webhook: WebhookId },
    /// Webhook created (or found existing) and confirmed remotely.
    Created { webhook: WebhookId },
    /// Credential missing or rejected; replayed after re-authorization.
    DeferredUntilReauthorized,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("webhook for board {board} was not found after creation")]
    WebhookNotConfirmed { board: BoardId },
}

impl SubscriptionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Core(error) => error.is_retryable(),
            Self::WebhookNotConfirmed { .. } => true,
        }
    }
}

impl From<StoreError> for SubscriptionError {
    fn from(value: StoreError) -> Self {
        Self::Core(CoreError::Store(value))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResubscribeReport {
    pub renewed: Vec<BoardId>,
    pub failed: Vec<(BoardId, String)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReauthorizationReport {
    pub resubscribed: ResubscribeReport,
    pub replayed: Vec<(BoardId, SubscriptionOutcome)>,
    pub failed: Vec<(BoardId, String)>,
}

#[derive(Clone)]
pub struct SubscriptionManager {
    guard: RemoteGuard,
    settings: Arc<dyn SettingsStore>,
    credentials: Arc<dyn CredentialStore>,
    callback_base_url: String,
}

impl SubscriptionManager {
    pub fn new(
        guard: RemoteGuard,
        settings: Arc<dyn SettingsStore>,
        credentials: Arc<dyn CredentialStore>,
        callback_base_url: impl Into<String>,
    ) -> Self {
        let callback_base_url = callback_base_url.into().trim_end_matches('/').to_owned();
        Self { guard, settings, credentials, callback_base_url }
    }

    pub fn callback_url(&self, user: UserId) -> String {
        format!("{}/webhooks/{}", self.callback_base_url, user.0)
    }

    pub async fn ensure_subscription(
        &self,
        actor: &Actor,
        board: &Board,
        target: ChatId,
    ) -> Result<SubscriptionOutcome, SubscriptionError> {
        let settings = self.settings.user_settings(actor.user_id).await?;
        let record = settings.boards.get(&board.id);
        let fingerprint = actor.credential.as_ref().map(Credential::fingerprint);
        let state = SubscriptionState::of(record, fingerprint);

        if let (SubscriptionState::Active, Some(record)) = (state, record) {
            let chat = self.settings.chat_settings(target).await?;
            if chat.boards.contains_key(&board.id) {
                debug!(
                    event_name = "subscription.confirmed_locally",
                    user_id = actor.user_id.0,
                    board_id = %board.id,
                    chat_id = target.0,
                    "subscription already active"
                );
                return Ok(SubscriptionOutcome::AlreadyActive { webhook: record.webhook_id.clone() });
            }
            let webhook = record.webhook_id.clone();
            self.link_chat(actor.user_id, board, target).await?;
            info!(
                event_name = "subscription.chat_linked",
                user_id = actor.user_id.0,
                board_id = %board.id,
                chat_id = target.0,
                "linked chat to existing subscription"
            );
            return Ok(SubscriptionOutcome::Linked { webhook });
        }

        let Some(credential) = actor.credential.as_ref() else {
            self.defer(actor.user_id, board, target).await?;
            return Ok(SubscriptionOutcome::DeferredUntilReauthorized);
        };

        info!(
            event_name = "subscription.state_changed",
            user_id = actor.user_id.0,
            board_id = %board.id,
            from = ?state,
            to = ?SubscriptionState::Creating,
            "creating webhook"
        );
        match self.create_and_confirm(actor, credential, &board.id).await {
            Ok(webhook) => {
                self.link_chat(actor.user_id, board, target).await?;
                self.record(actor.user_id, board, &webhook.id, credential.fingerprint()).await?;
                info!(
                    event_name = "subscription.webhook.created",
                    user_id = actor.user_id.0,
                    board_id = %board.id,
                    webhook_id = %webhook.id,
                    chat_id = target.0,
                    "subscription active"
                );
                Ok(SubscriptionOutcome::Created { webhook: webhook.id })
            }
            Err(SubscriptionError::Core(CoreError::CredentialInvalid(_))) => {
                self.defer(actor.user_id, board, target).await?;
                Ok(SubscriptionOutcome::DeferredUntilReauthorized)
            }
            Err(error) => {
                warn!(
                    event_name = "subscription.webhook.failed",
                    user_id = actor.user_id.0,
                    board_id = %board.id,
                    retryable = error.is_retryable(),
                    error = %error,
                    "subscription could not be established"
                );
                Err(error)
            }
        }
    }

    /// Renews every stored subscription whose credential fingerprint is
    /// stale or whose webhook id is empty, then writes settings once.
    pub async fn resubscribe_all(
        &self,
        actor: &Actor,
    ) -> Result<ResubscribeReport, SubscriptionError> {
        let credential = self.guard.credential(actor).map_err(SubscriptionError::from)?;
        let mut settings = self.settings.user_settings(actor.user_id).await?;
        let mut report = ResubscribeReport::default();
        let mut aborted = None;

        let stale: Vec<BoardId> = settings
            .boards
            .iter()
            .filter(|(_, record)| {
                SubscriptionState::of(Some(*record), Some(credential.fingerprint()))
                    == SubscriptionState::Stale
            })
            .map(|(board, _)| board.clone())
            .collect();

        for board in stale {
            match self.create_and_confirm(actor, credential, &board).await {
                Ok(webhook) => {
                    if let Some(record) = settings.boards.get_mut(&board) {
                        record.webhook_id = webhook.id;
                        record.fingerprint = credential.fingerprint().clone();
                    }
                    report.renewed.push(board);
                }
                Err(SubscriptionError::Core(error)) if error.needs_reauthorization() => {
                    aborted = Some(error);
                    break;
                }
                Err(error) => {
                    warn!(
                        event_name = "subscription.renewal_failed",
                        user_id = actor.user_id.0,
                        board_id = %board,
                        error = %error,
                        "could not renew subscription"
                    );
                    report.failed.push((board, error.to_string()));
                }
            }
        }

        if !report.renewed.is_empty() {
            self.settings.save_user_settings(actor.user_id, &settings).await?;
        }
        info!(
            event_name = "subscription.resubscribed",
            user_id = actor.user_id.0,
            renewed = report.renewed.len(),
            failed = report.failed.len(),
            "bulk resubscription finished"
        );
        match aborted {
            Some(error) => Err(error.into()),
            None => Ok(report),
        }
    }

    /// Renews stale subscriptions and replays work deferred while the
    /// credential was unusable.
    pub async fn on_reauthorized(
        &self,
        actor: &Actor,
    ) -> Result<ReauthorizationReport, SubscriptionError> {
        let resubscribed = self.resubscribe_all(actor).await?;
        let mut report = ReauthorizationReport { resubscribed, ..ReauthorizationReport::default() };

        for action in self.credentials.take_deferred(actor.user_id).await? {
            match action {
                DeferredAction::EnsureSubscription { board, board_name, chat } => {
                    let target = Board { id: board.clone(), name: board_name, ..Board::default() };
                    match self.ensure_subscription(actor, &target, chat).await {
                        Ok(outcome) => report.replayed.push((board, outcome)),
                        Err(error) => report.failed.push((board, error.to_string())),
                    }
                }
            }
        }
        Ok(report)
    }

    async fn create_and_confirm(
        &self,
        actor: &Actor,
        credential: &Credential,
        board: &BoardId,
    ) -> Result<WebhookInfo, SubscriptionError> {
        let callback_url = self.callback_url(actor.user_id);
        let result = self
            .guard
            .remote()
            .create_webhook(credential, board, &callback_url, WEBHOOK_DESCRIPTION)
            .await;
        match result {
            Ok(created) => debug!(
                event_name = "subscription.webhook.create_acknowledged",
                board_id = %board,
                reported_id = %created.id,
                "webhook create acknowledged, confirming"
            ),
            Err(RemoteError::Conflict(ConflictKind::WebhookExists)) => debug!(
                event_name = "subscription.webhook.already_exists",
                board_id = %board,
                "webhook already exists, confirming"
            ),
            Err(error) => {
                self.guard.settle(actor, "create_webhook", Err::<(), _>(error)).await?;
            }
        }

        let result = self.guard.remote().webhooks(credential).await;
        let webhooks = self.guard.settle(actor, "webhooks", result).await?;
        webhooks
            .into_iter()
            .find(|webhook| webhook.watches(board.as_str(), &callback_url))
            .ok_or_else(|| SubscriptionError::WebhookNotConfirmed { board: board.clone() })
    }

    async fn link_chat(&self, user: UserId, board: &Board, chat: ChatId) -> Result<(), StoreError> {
        let mut settings = self.settings.chat_settings(chat).await?;
        settings
            .boards
            .entry(board.id.clone())
            .or_insert_with(|| ChatBoardSetting::linked_by(user, board.name.clone()));
        self.settings.save_chat_settings(chat, &settings).await
    }

    async fn record(
        &self,
        user: UserId,
        board: &Board,
        webhook: &WebhookId,
        fingerprint: &CredentialFingerprint,
    ) -> Result<(), StoreError> {
        let mut settings = self.settings.user_settings(user).await?;
        settings.boards.insert(
            board.id.clone(),
            UserBoardSubscription {
                name: board.name.clone(),
                webhook_id: webhook.clone(),
                fingerprint: fingerprint.clone(),
            },
        );
        self.settings.save_user_settings(user, &settings).await
    }

    async fn defer(&self, user: UserId, board: &Board, chat: ChatId) -> Result<(), StoreError> {
        info!(
            event_name = "subscription.deferred",
            user_id = user.0,
            board_id = %board.id,
            chat_id = chat.0,
            "subscription waits for re-authorization"
        );
        self.credentials
            .defer_until_reauthorized(
                user,
                DeferredAction::EnsureSubscription {
                    board: board.id.clone(),
                    board_name: board.name.clone(),
                    chat,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settings::UserSettings;
    use crate::ports::{InMemoryCredentialStore, InMemorySettingsStore};
    use crate::testing::{self, RemoteFixture, ScriptedRemote};

    const BASE: &str = "https://hooks.example.test";

    struct Harness {
        manager: SubscriptionManager,
        remote: Arc<ScriptedRemote>,
        settings: Arc<InMemorySettingsStore>,
        credentials: Arc<InMemoryCredentialStore>,
    }

    fn harness(fixture: RemoteFixture) -> Harness {
        let remote = Arc::new(ScriptedRemote::new(fixture));
        let settings = Arc::new(InMemorySettingsStore::new());
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let guard = RemoteGuard::new(remote.clone(), credentials.clone());
        let manager = SubscriptionManager::new(
            guard,
            settings.clone(),
            credentials.clone(),
            format!("{BASE}/"),
        );
        Harness { manager, remote, settings, credentials }
    }

    fn fixture() -> RemoteFixture {
        RemoteFixture::new(testing::member("m1", "ann"))
    }

    fn actor(token: &str) -> Actor {
        Actor::new(UserId(1), ChatId(-100), Some(Credential::new(token)))
    }

    fn roadmap() -> Board {
        testing::board("b1", "Roadmap")
    }

    #[tokio::test]
    async fn creates_confirms_and_links_new_subscription() {
        let harness = harness(fixture());

        let outcome = harness
            .manager
            .ensure_subscription(&actor("t1"), &roadmap(), ChatId(-100))
            .await
            .expect("ensure");

        let SubscriptionOutcome::Created { webhook } = outcome else {
            panic!("expected creation, got {outcome:?}");
        };
        let user = harness.settings.user_settings(UserId(1)).await.expect("user settings");
        let record = user.boards.get(&BoardId::new("b1")).expect("record");
        assert_eq!(record.webhook_id, webhook);
        assert_eq!(record.fingerprint, CredentialFingerprint::of("t1"));
        let chat = harness.settings.chat_settings(ChatId(-100)).await.expect("chat settings");
        let link = chat.boards.get(&BoardId::new("b1")).expect("chat link");
        assert!(link.enabled);
        assert_eq!(link.user, UserId(1));
        assert_eq!(harness.manager.callback_url(UserId(1)), format!("{BASE}/webhooks/1"));
    }

    #[tokio::test]
    async fn second_ensure_with_same_credential_makes_no_remote_call() {
        let harness = harness(fixture());
        harness
            .manager
            .ensure_subscription(&actor("t1"), &roadmap(), ChatId(-100))
            .await
            .expect("first ensure");
        let calls_after_first = harness.remote.calls().await.len();

        let outcome = harness
            .manager
            .ensure_subscription(&actor("t1"), &roadmap(), ChatId(-100))
            .await
            .expect("second ensure");

        assert!(matches!(outcome, SubscriptionOutcome::AlreadyActive { .. }));
        assert_eq!(harness.remote.calls().await.len(), calls_after_first);
        assert_eq!(harness.remote.created_webhooks().await, 1);
    }

    #[tokio::test]
    async fn current_record_links_new_chat_locally() {
        let harness = harness(fixture());
        harness
            .manager
            .ensure_subscription(&actor("t1"), &roadmap(), ChatId(-100))
            .await
            .expect("first ensure");
        let calls_after_first = harness.remote.calls().await.len();

        let outcome = harness
            .manager
            .ensure_subscription(&actor("t1"), &roadmap(), ChatId(-200))
            .await
            .expect("link second chat");

        assert!(matches!(outcome, SubscriptionOutcome::Linked { .. }));
        assert_eq!(harness.remote.calls().await.len(), calls_after_first);
        let chat = harness.settings.chat_settings(ChatId(-200)).await.expect("chat settings");
        assert!(chat.boards.contains_key(&BoardId::new("b1")));
    }

    #[tokio::test]
    async fn already_exists_recovers_identifier_from_listing() {
        let mut fixture = fixture();
        fixture.webhooks = vec![
            WebhookInfo {
                id: WebhookId::new("other-callback"),
                id_model: "b1".to_owned(),
                callback_url: "https://elsewhere.test/webhooks/1".to_owned(),
                ..WebhookInfo::default()
            },
            WebhookInfo {
                id: WebhookId::new("existing"),
                id_model: "b1".to_owned(),
                callback_url: format!("{BASE}/webhooks/1"),
                ..WebhookInfo::default()
            },
        ];
        let harness = harness(fixture);
        harness
            .remote
            .fail_next("create_webhook", RemoteError::Conflict(ConflictKind::WebhookExists))
            .await;

        let outcome = harness
            .manager
            .ensure_subscription(&actor("t1"), &roadmap(), ChatId(-100))
            .await
            .expect("ensure");

        assert_eq!(outcome, SubscriptionOutcome::Created { webhook: WebhookId::new("existing") });
    }

    #[tokio::test]
    async fn unconfirmed_webhook_is_a_retryable_failure() {
        let mut fixture = fixture();
        fixture.register_created_webhooks = false;
        let harness = harness(fixture);

        let error = harness
            .manager
            .ensure_subscription(&actor("t1"), &roadmap(), ChatId(-100))
            .await
            .expect_err("confirmation should fail");

        assert!(error.is_retryable());
        let user = harness.settings.user_settings(UserId(1)).await.expect("user settings");
        assert!(user.boards.is_empty());
    }

    #[tokio::test]
    async fn rejected_credential_defers_and_replays_after_reauthorization() {
        let harness = harness(fixture());
        harness.credentials.store_credential(UserId(1), &Credential::new("old")).await.expect("store");
        harness.remote.fail_next("create_webhook", RemoteError::CredentialInvalid).await;

        let outcome = harness
            .manager
            .ensure_subscription(&actor("old"), &roadmap(), ChatId(-100))
            .await
            .expect("ensure");

        assert_eq!(outcome, SubscriptionOutcome::DeferredUntilReauthorized);
        assert!(harness.credentials.credential(UserId(1)).await.expect("load").is_none());
        assert_eq!(harness.remote.created_webhooks().await, 0);

        let report = harness.manager.on_reauthorized(&actor("new")).await.expect("replay");

        assert_eq!(report.replayed.len(), 1);
        assert!(matches!(report.replayed[0].1, SubscriptionOutcome::Created { .. }));
        let chat = harness.settings.chat_settings(ChatId(-100)).await.expect("chat settings");
        assert!(chat.boards.contains_key(&BoardId::new("b1")));
    }

    #[tokio::test]
    async fn missing_credential_defers_without_remote_call() {
        let harness = harness(fixture());
        let anonymous = Actor::new(UserId(1), ChatId(-100), None);

        let outcome = harness
            .manager
            .ensure_subscription(&anonymous, &roadmap(), ChatId(-100))
            .await
            .expect("ensure");

        assert_eq!(outcome, SubscriptionOutcome::DeferredUntilReauthorized);
        assert!(harness.remote.calls().await.is_empty());
        assert_eq!(harness.credentials.take_deferred(UserId(1)).await.expect("take").len(), 1);
    }

    #[tokio::test]
    async fn resubscribe_renews_only_stale_records_in_one_write() {
        let harness = harness(fixture());
        let mut settings = UserSettings::default();
        for (board, fingerprint, webhook) in [
            ("b1", CredentialFingerprint::of("old"), "wh-old"),
            ("b2", CredentialFingerprint::of("new"), "wh-current"),
            ("b3", CredentialFingerprint::of("new"), ""),
        ] {
            settings.boards.insert(
                BoardId::new(board),
                UserBoardSubscription {
                    name: board.to_uppercase(),
                    webhook_id: WebhookId::new(webhook),
                    fingerprint,
                },
            );
        }
        harness.settings.save_user_settings(UserId(1), &settings).await.expect("seed");

        let report = harness.manager.resubscribe_all(&actor("new")).await.expect("resubscribe");

        assert_eq!(report.renewed, vec![BoardId::new("b1"), BoardId::new("b3")]);
        assert_eq!(harness.remote.created_webhooks().await, 2);
        let stored = harness.settings.user_settings(UserId(1)).await.expect("settings");
        for record in stored.boards.values() {
            assert_eq!(record.fingerprint, CredentialFingerprint::of("new"));
            assert!(!record.webhook_id.0.is_empty());
        }
        assert_eq!(
            stored.boards.get(&BoardId::new("b2")).map(|record| record.webhook_id.as_str()),
            Some("wh-current")
        );
    }

    #[tokio::test]
    async fn resubscribe_keeps_going_after_transient_failure() {
        let harness = harness(fixture());
        let mut settings = UserSettings::default();
        for board in ["b1", "b2"] {
            settings.boards.insert(
                BoardId::new(board),
                UserBoardSubscription {
                    name: board.to_owned(),
                    webhook_id: WebhookId::new("stale"),
                    fingerprint: CredentialFingerprint::of("old"),
                },
            );
        }
        harness.settings.save_user_settings(UserId(1), &settings).await.expect("seed");
        harness.remote.fail_next("create_webhook", RemoteError::Transient("503".to_owned())).await;

        let report = harness.manager.resubscribe_all(&actor("new")).await.expect("resubscribe");

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.renewed, vec![BoardId::new("b2")]);
    }
}
