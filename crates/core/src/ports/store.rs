use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::identity::{ChatId, Credential, UserId};
use crate::domain::settings::{ChatSettings, DeferredAction, UserSettings};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("stored value could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Service,
    User(UserId),
    Chat(ChatId),
}

impl CacheScope {
    pub fn storage_key(&self) -> String {
        match self {
            Self::Service => "service".to_owned(),
            Self::User(user) => format!("user:{}", user.0),
            Self::Chat(chat) => format!("chat:{}", chat.0),
        }
    }
}

/// Structured update of one cached document.
///
/// `field` is a dot-separated path into the document; the empty path
/// addresses the document itself, which is how list-valued entries are
/// extended.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheDelta {
    Set { field: String, value: Value },
    AddToSet { field: String, value: Value },
    RemoveFromSet { field: String, value: Value },
}

impl CacheDelta {
    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Self::Set { field: field.into(), value }
    }

    pub fn add_to_set(field: impl Into<String>, value: Value) -> Self {
        Self::AddToSet { field: field.into(), value }
    }

    pub fn remove_from_set(field: impl Into<String>, value: Value) -> Self {
        Self::RemoveFromSet { field: field.into(), value }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Set { field, .. }
            | Self::AddToSet { field, .. }
            | Self::RemoveFromSet { field, .. } => field,
        }
    }

    pub fn apply(&self, document: &mut Value) {
        match self {
            Self::Set { field, value } => *slot(document, field) = value.clone(),
            Self::AddToSet { field, value } => {
                let target = slot(document, field);
                if !target.is_array() {
                    *target = Value::Array(Vec::new());
                }
                if let Value::Array(items) = target {
                    if !items.iter().any(|item| same_member(item, value)) {
                        items.push(value.clone());
                    }
                }
            }
            Self::RemoveFromSet { field, value } => {
                if let Some(Value::Array(items)) = existing(document, field) {
                    items.retain(|item| !same_member(item, value));
                }
            }
        }
    }
}

/// Objects that both carry an `id` are the same set member when the ids match.
pub fn same_member(left: &Value, right: &Value) -> bool {
    match (left.get("id"), right.get("id")) {
        (Some(left_id), Some(right_id)) => left_id == right_id,
        _ => left == right,
    }
}

fn slot<'a>(document: &'a mut Value, path: &str) -> &'a mut Value {
    path.split('.').filter(|segment| !segment.is_empty()).fold(document, |current, segment| {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        match current {
            Value::Object(map) => map.entry(segment.to_owned()).or_insert(Value::Null),
            other => other,
        }
    })
}

fn existing<'a>(document: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(document, |current, segment| current.get_mut(segment))
}

#[async_trait]
pub trait ScopedCacheStore: Send + Sync {
    async fn get(&self, scope: CacheScope, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(
        &self,
        scope: CacheScope,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Applies every delta to the live entry as one unit. Returns `false`
    /// when no live entry exists, in which case nothing is written.
    async fn update(
        &self,
        scope: CacheScope,
        key: &str,
        deltas: &[CacheDelta],
    ) -> Result<bool, StoreError>;

    async fn remove(&self, scope: CacheScope, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn user_settings(&self, user: UserId) -> Result<UserSettings, StoreError>;
    async fn save_user_settings(
        &self,
        user: UserId,
        settings: &UserSettings,
    ) -> Result<(), StoreError>;
    async fn chat_settings(&self, chat: ChatId) -> Result<ChatSettings, StoreError>;
    async fn save_chat_settings(
        &self,
        chat: ChatId,
        settings: &ChatSettings,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credential(&self, user: UserId) -> Result<Option<Credential>, StoreError>;
    async fn store_credential(&self, user: UserId, credential: &Credential)
        -> Result<(), StoreError>;
    async fn invalidate(&self, user: UserId) -> Result<(), StoreError>;
    async fn defer_until_reauthorized(
        &self,
        user: UserId,
        action: DeferredAction,
    ) -> Result<(), StoreError>;
    async fn take_deferred(&self, user: UserId) -> Result<Vec<DeferredAction>, StoreError>;
}
