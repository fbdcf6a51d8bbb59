//! Read-through entity cache over the scoped store.

pub mod guard;
pub mod mutation;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::board::{Board, BoardDetail, Label, List, Member};
use crate::domain::card::{Card, CardPatch};
use crate::domain::identity::Actor;
use crate::domain::{BoardId, CardId};
use crate::errors::CoreError;
use crate::ports::{CacheDelta, CacheScope, ScopedCacheStore, StoreError};
use crate::ranking::boards_by_recency;

pub use guard::RemoteGuard;
pub use mutation::{CardChange, CardMutator};

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Boards whose open cards seed the per-user card collection.
pub const WARM_BOARD_LIMIT: usize = 5;

pub mod keys {
    use crate::domain::{BoardId, CardId};

    pub const ME: &str = "me";
    pub const BOARDS: &str = "boards";
    pub const CARDS: &str = "cards";
    pub const PENDING_INPUT: &str = "pending_input";
    pub const CARD_DRAFT: &str = "card_draft";

    pub fn lists(board: &BoardId) -> String {
        format!("lists_{board}")
    }

    pub fn members(board: &BoardId) -> String {
        format!("members_{board}")
    }

    pub fn labels(board: &BoardId) -> String {
        format!("labels_{board}")
    }

    pub fn card(card: &CardId) -> String {
        format!("card_{card}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheTtls {
    pub me: Duration,
    pub boards: Duration,
    pub lists: Duration,
    pub members: Duration,
    pub labels: Duration,
    pub cards: Duration,
    pub user_cards: Duration,
    pub pending_input: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            me: Duration::from_secs(HOUR),
            boards: Duration::from_secs(HOUR),
            lists: Duration::from_secs(6 * HOUR),
            members: Duration::from_secs(7 * DAY),
            labels: Duration::from_secs(7 * DAY),
            cards: Duration::from_secs(100 * DAY),
            user_cards: Duration::from_secs(HOUR),
            pending_input: Duration::from_secs(DAY),
        }
    }
}

#[derive(Clone)]
pub struct EntityCache {
    store: Arc<dyn ScopedCacheStore>,
    guard: RemoteGuard,
    ttls: CacheTtls,
}

impl EntityCache {
    pub fn new(store: Arc<dyn ScopedCacheStore>, guard: RemoteGuard, ttls: CacheTtls) -> Self {
        Self { store, guard, ttls }
    }

    pub fn guard(&self) -> &RemoteGuard {
        &self.guard
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    pub async fn me(&self, actor: &Actor) -> Result<Member, CoreError> {
        let scope = CacheScope::User(actor.user_id);
        if let Some(member) = self.read(scope, keys::ME).await? {
            return Ok(member);
        }
        let credential = self.guard.credential(actor)?;
        let result = self.guard.remote().current_member(credential).await;
        let member = self.guard.settle(actor, "current_member", result).await?;
        self.write(scope, keys::ME, &member, self.ttls.me).await?;
        Ok(member)
    }

    pub async fn boards(&self, actor: &Actor) -> Result<Vec<Board>, CoreError> {
        let scope = CacheScope::User(actor.user_id);
        if let Some(boards) = self.read(scope, keys::BOARDS).await? {
            return Ok(boards);
        }
        let credential = self.guard.credential(actor)?;
        let result = self.guard.remote().boards(credential).await;
        let boards = self.guard.settle(actor, "boards", result).await?;
        self.write(scope, keys::BOARDS, &boards, self.ttls.boards).await?;
        Ok(boards)
    }

    pub async fn board(&self, actor: &Actor, board: &BoardId) -> Result<Option<Board>, CoreError> {
        Ok(self.boards(actor).await?.into_iter().find(|known| &known.id == board))
    }

    /// Fetches lists, members and labels of a board in one remote call and
    /// refreshes all three entries.
    pub async fn board_detail(
        &self,
        actor: &Actor,
        board: &BoardId,
    ) -> Result<BoardDetail, CoreError> {
        let credential = self.guard.credential(actor)?;
        let result = self.guard.remote().board_detail(credential, board).await;
        let detail = self.guard.settle(actor, "board_detail", result).await?;

        let scope = CacheScope::Service;
        self.write(scope, &keys::lists(board), &detail.lists, self.ttls.lists).await?;
        self.write(scope, &keys::members(board), &detail.members, self.ttls.members).await?;
        self.write(scope, &keys::labels(board), &detail.labels, self.ttls.labels).await?;
        debug!(
            event_name = "cache.board_detail.refreshed",
            user_id = actor.user_id.0,
            board_id = %board,
            lists = detail.lists.len(),
            members = detail.members.len(),
            labels = detail.labels.len(),
            "board detail cached"
        );
        Ok(detail)
    }

    pub async fn lists(&self, actor: &Actor, board: &BoardId) -> Result<Vec<List>, CoreError> {
        match self.read(CacheScope::Service, &keys::lists(board)).await? {
            Some(lists) => Ok(lists),
            None => Ok(self.board_detail(actor, board).await?.lists),
        }
    }

    pub async fn members(&self, actor: &Actor, board: &BoardId) -> Result<Vec<Member>, CoreError> {
        match self.read(CacheScope::Service, &keys::members(board)).await? {
            Some(members) => Ok(members),
            None => Ok(self.board_detail(actor, board).await?.members),
        }
    }

    pub async fn labels(&self, actor: &Actor, board: &BoardId) -> Result<Vec<Label>, CoreError> {
        match self.read(CacheScope::Service, &keys::labels(board)).await? {
            Some(labels) => Ok(labels),
            None => Ok(self.board_detail(actor, board).await?.labels),
        }
    }

    pub async fn card(&self, actor: &Actor, card: &CardId) -> Result<Card, CoreError> {
        if let Some(cached) = self.read(CacheScope::Service, &keys::card(card)).await? {
            return Ok(cached);
        }
        let credential = self.guard.credential(actor)?;
        let result = self.guard.remote().card(credential, card).await;
        let mut fetched = self.guard.settle(actor, "card", result).await?;
        self.resolve_references(actor, &mut fetched).await?;
        self.write(CacheScope::Service, &keys::card(card), &fetched, self.ttls.cards).await?;
        Ok(fetched)
    }

    /// Writes the card entry and adds the card to the actor's collection.
    pub async fn store_card(&self, actor: &Actor, card: &Card) -> Result<(), CoreError> {
        self.write(CacheScope::Service, &keys::card(&card.id), card, self.ttls.cards).await?;
        let value = serde_json::to_value(card).map_err(encode_error)?;
        self.store
            .update(CacheScope::User(actor.user_id), keys::CARDS, &[CacheDelta::add_to_set("", value)])
            .await?;
        Ok(())
    }

    /// Cards the actor works with: the cached collection, or on a miss the
    /// member's open cards merged with the open cards of the most recently
    /// active boards.
    pub async fn user_cards(&self, actor: &Actor) -> Result<Vec<Card>, CoreError> {
        let scope = CacheScope::User(actor.user_id);
        if let Some(cards) = self.read(scope, keys::CARDS).await? {
            return Ok(cards);
        }
        let credential = self.guard.credential(actor)?;
        let result = self.guard.remote().member_cards(credential).await;
        let mut cards = self.guard.settle(actor, "member_cards", result).await?;

        let boards = boards_by_recency(&self.boards(actor).await?);
        let mut seen: HashSet<CardId> = cards.iter().map(|card| card.id.clone()).collect();
        for board in boards.iter().take(WARM_BOARD_LIMIT) {
            let result = self.guard.remote().board_cards(credential, &board.id).await;
            let board_cards = self.guard.settle(actor, "board_cards", result).await?;
            for card in board_cards {
                if seen.insert(card.id.clone()) {
                    cards.push(card);
                }
            }
        }

        self.write(scope, keys::CARDS, &cards, self.ttls.user_cards).await?;
        debug!(
            event_name = "cache.user_cards.warmed",
            user_id = actor.user_id.0,
            cards = cards.len(),
            "user card collection cached"
        );
        Ok(cards)
    }

    /// Applies the patch to the cached card. Returns `false` when the card
    /// is not cached; the next read fetches it fresh.
    pub async fn patch_card(&self, card: &CardId, patch: &CardPatch) -> Result<bool, CoreError> {
        let deltas = patch.deltas().map_err(encode_error)?;
        let patched = self.store.update(CacheScope::Service, &keys::card(card), &deltas).await?;
        debug!(
            event_name = "cache.card.patched",
            card_id = %card,
            fields = ?deltas.iter().map(CacheDelta::field).collect::<Vec<_>>(),
            patched,
            "card patch applied"
        );
        Ok(patched)
    }

    /// Drops the actor's identity, board and card collections.
    pub async fn forget_user(&self, actor: &Actor) -> Result<(), CoreError> {
        let scope = CacheScope::User(actor.user_id);
        for key in [keys::ME, keys::BOARDS, keys::CARDS] {
            self.store.remove(scope, key).await?;
        }
        debug!(event_name = "cache.user.forgotten", user_id = actor.user_id.0, "user cache dropped");
        Ok(())
    }

    pub async fn read<T: DeserializeOwned>(
        &self,
        scope: CacheScope,
        key: &str,
    ) -> Result<Option<T>, CoreError> {
        let Some(value) = self.store.get(scope, key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(error) => {
                warn!(
                    event_name = "cache.entry.undecodable",
                    scope = %scope.storage_key(),
                    key,
                    error = %error,
                    "treating undecodable cache entry as a miss"
                );
                Ok(None)
            }
        }
    }

    pub async fn write<T: Serialize + ?Sized>(
        &self,
        scope: CacheScope,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CoreError> {
        let value = serde_json::to_value(value).map_err(encode_error)?;
        self.store.set(scope, key, value, ttl).await?;
        Ok(())
    }

    pub async fn remove(&self, scope: CacheScope, key: &str) -> Result<(), CoreError> {
        self.store.remove(scope, key).await?;
        Ok(())
    }

    async fn resolve_references(&self, actor: &Actor, card: &mut Card) -> Result<(), CoreError> {
        if card.board.is_none() {
            card.board = self.board(actor, &card.id_board).await?;
        }
        if card.list.is_none() && card.board.is_some() {
            let lists = self.lists(actor, &card.id_board).await?;
            card.list = lists.into_iter().find(|list| list.id == card.id_list);
        }
        Ok(())
    }
}

fn encode_error(error: serde_json::Error) -> CoreError {
    CoreError::Store(StoreError::Decode(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::identity::{ChatId, Credential, UserId};
    use crate::domain::MemberId;
    use crate::ports::{InMemoryCacheStore, InMemoryCredentialStore, CredentialStore, RemoteError};
    use crate::testing::{self, RemoteFixture, ScriptedRemote};

    struct Harness {
        cache: EntityCache,
        remote: Arc<ScriptedRemote>,
        credentials: Arc<InMemoryCredentialStore>,
        store: Arc<InMemoryCacheStore>,
    }

    fn fixture() -> RemoteFixture {
        let mut fixture = RemoteFixture::new(testing::member("m1", "ann"));
        fixture.boards = vec![testing::board("b1", "Roadmap")];
        fixture.details.insert(
            BoardId::new("b1"),
            BoardDetail {
                lists: vec![testing::list("l1", "Todo", "b1"), testing::list("l2", "Done", "b1")],
                members: vec![testing::member("m1", "ann")],
                labels: vec![testing::label("g1", "bug", 3)],
            },
        );
        fixture.cards.insert(CardId::new("c1"), testing::card("c1", "Fix login", "b1", "l1"));
        fixture
    }

    async fn harness(fixture: RemoteFixture) -> Harness {
        let remote = Arc::new(ScriptedRemote::new(fixture));
        let credentials = Arc::new(InMemoryCredentialStore::new());
        credentials
            .store_credential(UserId(1), &Credential::new("token"))
            .await
            .expect("store credential");
        let store = Arc::new(InMemoryCacheStore::new());
        let guard = RemoteGuard::new(remote.clone(), credentials.clone());
        let cache = EntityCache::new(store.clone(), guard, CacheTtls::default());
        Harness { cache, remote, credentials, store }
    }

    fn actor() -> Actor {
        Actor::new(UserId(1), ChatId(1), Some(Credential::new("token")))
    }

    #[tokio::test]
    async fn one_board_detail_fetch_serves_lists_members_and_labels() {
        let harness = harness(fixture()).await;
        let board = BoardId::new("b1");

        let lists = harness.cache.lists(&actor(), &board).await.expect("lists");
        let members = harness.cache.members(&actor(), &board).await.expect("members");
        let labels = harness.cache.labels(&actor(), &board).await.expect("labels");

        assert_eq!(lists.len(), 2);
        assert_eq!(members.len(), 1);
        assert_eq!(labels.len(), 1);
        assert_eq!(harness.remote.call_count("board_detail").await, 1);
    }

    #[tokio::test]
    async fn card_miss_fetches_once_and_resolves_board_and_list() {
        let harness = harness(fixture()).await;
        let card_id = CardId::new("c1");

        let first = harness.cache.card(&actor(), &card_id).await.expect("card");
        let second = harness.cache.card(&actor(), &card_id).await.expect("cached card");

        assert_eq!(first, second);
        assert_eq!(first.board.as_ref().map(|board| board.name.as_str()), Some("Roadmap"));
        assert_eq!(first.list.as_ref().map(|list| list.name.as_str()), Some("Todo"));
        assert_eq!(harness.remote.call_count("card").await, 1);
    }

    #[tokio::test]
    async fn patch_touches_only_the_patched_fields() {
        let harness = harness(fixture()).await;
        let card_id = CardId::new("c1");
        harness.cache.card(&actor(), &card_id).await.expect("warm card");

        let patched = harness
            .cache
            .patch_card(&card_id, &CardPatch::AddVote(MemberId::new("m1")))
            .await
            .expect("patch");
        let cached = harness.cache.card(&actor(), &card_id).await.expect("card");

        assert!(patched);
        assert_eq!(cached.id_members_voted, vec![MemberId::new("m1")]);
        assert_eq!(cached.name, "Fix login");
        assert_eq!(harness.remote.call_count("card").await, 1);
    }

    #[tokio::test]
    async fn patch_of_uncached_card_is_a_noop() {
        let harness = harness(fixture()).await;
        let patched = harness
            .cache
            .patch_card(&CardId::new("c1"), &CardPatch::Closed(true))
            .await
            .expect("patch");
        assert!(!patched);
        assert_eq!(harness.store.get(CacheScope::Service, "card_c1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn rejected_credential_is_invalidated_at_any_call_site() {
        let harness = harness(fixture()).await;
        harness.remote.fail_next("boards", RemoteError::CredentialInvalid).await;

        let error = harness.cache.boards(&actor()).await.expect_err("boards should fail");

        assert_eq!(error, CoreError::CredentialInvalid(UserId(1)));
        assert!(harness.credentials.credential(UserId(1)).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn missing_credential_makes_no_remote_call() {
        let harness = harness(fixture()).await;
        let anonymous = Actor::new(UserId(1), ChatId(1), None);

        let error = harness.cache.me(&anonymous).await.expect_err("me should fail");

        assert_eq!(error, CoreError::CredentialMissing(UserId(1)));
        assert!(harness.remote.calls().await.is_empty());
    }

    #[tokio::test]
    async fn store_card_extends_existing_user_collection_only_once() {
        let mut fixture = fixture();
        fixture.member_cards = vec![testing::card("c1", "Fix login", "b1", "l1")];
        let harness = harness(fixture).await;
        harness.cache.user_cards(&actor()).await.expect("warm collection");

        let new_card = testing::card("c2", "Write docs", "b1", "l1");
        harness.cache.store_card(&actor(), &new_card).await.expect("store");
        harness.cache.store_card(&actor(), &new_card).await.expect("store again");

        let cards = harness.cache.user_cards(&actor()).await.expect("cards");
        let ids: Vec<_> = cards.iter().map(|card| card.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(harness.remote.call_count("member_cards").await, 1);
    }

    #[tokio::test]
    async fn forget_user_drops_user_scoped_entries() {
        let harness = harness(fixture()).await;
        harness.cache.me(&actor()).await.expect("me");
        harness.cache.boards(&actor()).await.expect("boards");

        harness.cache.forget_user(&actor()).await.expect("forget");
        harness.cache.me(&actor()).await.expect("me again");

        assert_eq!(harness.remote.call_count("current_member").await, 2);
        assert_eq!(
            harness.store.get(CacheScope::User(UserId(1)), keys::BOARDS).await.expect("get"),
            None
        );
    }
}
