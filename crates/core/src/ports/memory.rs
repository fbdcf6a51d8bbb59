use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::identity::{ChatId, Credential, UserId};
use crate::domain::settings::{ChatSettings, DeferredAction, UserSettings};

use super::store::{CacheDelta, CacheScope, CredentialStore, ScopedCacheStore, SettingsStore};
use super::StoreError;

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<(CacheScope, String), CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ScopedCacheStore for InMemoryCacheStore {
    async fn get(&self, scope: CacheScope, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(&(scope, key.to_owned()))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        scope: CacheScope,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert((scope, key.to_owned()), CacheEntry { value, expires_at: Instant::now() + ttl });
        Ok(())
    }

    async fn update(
        &self,
        scope: CacheScope,
        key: &str,
        deltas: &[CacheDelta],
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        match entries.get_mut(&(scope, key.to_owned())) {
            Some(entry) if entry.is_live(now) => {
                for delta in deltas {
                    delta.apply(&mut entry.value);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, scope: CacheScope, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(&(scope, key.to_owned()));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySettingsStore {
    users: RwLock<HashMap<UserId, UserSettings>>,
    chats: RwLock<HashMap<ChatId, ChatSettings>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn user_settings(&self, user: UserId) -> Result<UserSettings, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&user).cloned().unwrap_or_default())
    }

    async fn save_user_settings(
        &self,
        user: UserId,
        settings: &UserSettings,
    ) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        users.insert(user, settings.clone());
        Ok(())
    }

    async fn chat_settings(&self, chat: ChatId) -> Result<ChatSettings, StoreError> {
        let chats = self.chats.read().await;
        Ok(chats.get(&chat).cloned().unwrap_or_default())
    }

    async fn save_chat_settings(
        &self,
        chat: ChatId,
        settings: &ChatSettings,
    ) -> Result<(), StoreError> {
        let mut chats = self.chats.write().await;
        chats.insert(chat, settings.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<UserId, Credential>>,
    deferred: RwLock<HashMap<UserId, Vec<DeferredAction>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn credential(&self, user: UserId) -> Result<Option<Credential>, StoreError> {
        let credentials = self.credentials.read().await;
        Ok(credentials.get(&user).cloned())
    }

    async fn store_credential(
        &self,
        user: UserId,
        credential: &Credential,
    ) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write().await;
        credentials.insert(user, credential.clone());
        Ok(())
    }

    async fn invalidate(&self, user: UserId) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write().await;
        credentials.remove(&user);
        Ok(())
    }

    async fn defer_until_reauthorized(
        &self,
        user: UserId,
        action: DeferredAction,
    ) -> Result<(), StoreError> {
        let mut deferred = self.deferred.write().await;
        let queue = deferred.entry(user).or_default();
        if !queue.contains(&action) {
            queue.push(action);
        }
        Ok(())
    }

    async fn take_deferred(&self, user: UserId) -> Result<Vec<DeferredAction>, StoreError> {
        let mut deferred = self.deferred.write().await;
        Ok(deferred.remove(&user).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::BoardId;

    #[tokio::test]
    async fn expired_entries_are_misses_and_ignore_updates() {
        let store = InMemoryCacheStore::new();
        store
            .set(CacheScope::Service, "card_c1", json!({"pos": 1}), Duration::ZERO)
            .await
            .expect("set");

        assert_eq!(store.get(CacheScope::Service, "card_c1").await.expect("get"), None);
        let updated = store
            .update(CacheScope::Service, "card_c1", &[CacheDelta::set("pos", json!(2))])
            .await
            .expect("update");
        assert!(!updated);
    }

    #[tokio::test]
    async fn scopes_do_not_share_keys() {
        let store = InMemoryCacheStore::new();
        let hour = Duration::from_secs(3600);
        store.set(CacheScope::User(UserId(1)), "boards", json!(["a"]), hour).await.expect("set");
        store.set(CacheScope::User(UserId(2)), "boards", json!(["b"]), hour).await.expect("set");

        assert_eq!(
            store.get(CacheScope::User(UserId(1)), "boards").await.expect("get"),
            Some(json!(["a"]))
        );
        assert_eq!(store.get(CacheScope::Chat(ChatId(1)), "boards").await.expect("get"), None);
    }

    #[tokio::test]
    async fn update_applies_all_deltas_to_live_entry() {
        let store = InMemoryCacheStore::new();
        store
            .set(CacheScope::Service, "card_c1", json!({"pos": 1, "idMembers": []}), Duration::from_secs(60))
            .await
            .expect("set");

        let updated = store
            .update(
                CacheScope::Service,
                "card_c1",
                &[CacheDelta::set("pos", json!(5)), CacheDelta::add_to_set("idMembers", json!("m1"))],
            )
            .await
            .expect("update");

        assert!(updated);
        assert_eq!(
            store.get(CacheScope::Service, "card_c1").await.expect("get"),
            Some(json!({"pos": 5, "idMembers": ["m1"]}))
        );
    }

    #[tokio::test]
    async fn deferred_actions_are_drained_once() {
        let store = InMemoryCredentialStore::new();
        let action = DeferredAction::EnsureSubscription {
            board: BoardId::new("b1"),
            board_name: "Roadmap".to_owned(),
            chat: ChatId(10),
        };
        store.defer_until_reauthorized(UserId(1), action.clone()).await.expect("defer");
        store.defer_until_reauthorized(UserId(1), action.clone()).await.expect("defer again");

        assert_eq!(store.take_deferred(UserId(1)).await.expect("take"), vec![action]);
        assert!(store.take_deferred(UserId(1)).await.expect("take again").is_empty());
    }
}
