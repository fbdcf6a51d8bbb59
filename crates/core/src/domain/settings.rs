use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::identity::{ChatId, CredentialFingerprint, UserId};
use super::{BoardId, WebhookId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    CardCreated,
    CardCommented,
    CardMoved,
    PersonAssigned,
    Labeled,
    Voted,
    Archived,
    Checklisted,
    Due,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 9] = [
        Self::CardCreated,
        Self::CardCommented,
        Self::CardMoved,
        Self::PersonAssigned,
        Self::Labeled,
        Self::Voted,
        Self::Archived,
        Self::Checklisted,
        Self::Due,
    ];

    pub fn button_id(self) -> &'static str {
        match self {
            Self::CardCreated => "CardCreated",
            Self::CardCommented => "CardCommented",
            Self::CardMoved => "CardMoved",
            Self::PersonAssigned => "PersonAssigned",
            Self::Labeled => "Labeled",
            Self::Voted => "Voted",
            Self::Archived => "Archived",
            Self::Checklisted => "Checklisted",
            Self::Due => "Due",
        }
    }

    pub fn from_button_id(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.button_id() == value)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::CardCreated => "Card Created",
            Self::CardCommented => "Commented",
            Self::CardMoved => "Moved",
            Self::PersonAssigned => "Someone Assigned",
            Self::Labeled => "Label attached",
            Self::Voted => "Upvoted",
            Self::Archived => "Archived",
            Self::Checklisted => "Checklisted",
            Self::Due => "Due date set",
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Bitset over [`NotificationKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationFilter(u16);

impl NotificationFilter {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn of(kinds: &[NotificationKind]) -> Self {
        kinds.iter().fold(Self::empty(), |mut filter, kind| {
            filter.insert(*kind);
            filter
        })
    }

    pub fn contains(self, kind: NotificationKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: NotificationKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: NotificationKind) {
        self.0 &= !kind.bit();
    }

    /// Returns whether the kind is enabled afterwards.
    pub fn toggle(&mut self, kind: NotificationKind) -> bool {
        self.0 ^= kind.bit();
        self.contains(kind)
    }

    pub fn kinds(self) -> impl Iterator<Item = NotificationKind> {
        NotificationKind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }
}

impl Default for NotificationFilter {
    fn default() -> Self {
        Self::of(&[
            NotificationKind::CardCreated,
            NotificationKind::CardCommented,
            NotificationKind::CardMoved,
            NotificationKind::PersonAssigned,
            NotificationKind::Archived,
            NotificationKind::Due,
        ])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBoardSubscription {
    pub name: String,
    #[serde(default)]
    pub webhook_id: WebhookId,
    #[serde(default)]
    pub fingerprint: CredentialFingerprint,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub boards: BTreeMap<BoardId, UserBoardSubscription>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBoardSetting {
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub filter: NotificationFilter,
    pub user: UserId,
}

impl ChatBoardSetting {
    pub fn linked_by(user: UserId, board_name: impl Into<String>) -> Self {
        Self {
            name: board_name.into(),
            enabled: true,
            filter: NotificationFilter::default(),
            user,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSettings {
    #[serde(default)]
    pub boards: BTreeMap<BoardId, ChatBoardSetting>,
}

/// Work postponed until the user re-authorizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeferredAction {
    EnsureSubscription { board: BoardId, board_name: String, chat: ChatId },
}
