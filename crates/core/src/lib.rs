pub mod cache;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod due;
pub mod errors;
pub mod notifications;
pub mod panel;
pub mod ports;
pub mod ranking;
pub mod subscriptions;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{CacheTtls, CardChange, CardMutator, EntityCache, RemoteGuard};
pub use discovery::{discover_cards, SearchHit, SearchPage};
pub use domain::board::{Board, BoardDetail, Label, List, Member};
pub use domain::card::{Card, CardPatch};
pub use domain::identity::{Actor, ChatId, Credential, CredentialFingerprint, UserId};
pub use domain::settings::{ChatBoardSetting, NotificationFilter, NotificationKind};
pub use domain::{BoardId, CardId, LabelId, ListId, MemberId, WebhookId};
pub use errors::{CoreError, InterfaceError};
pub use notifications::{NotificationError, NotificationSettings};
pub use ranking::{compare_relevance, rank_cards};
pub use subscriptions::{
    SubscriptionError, SubscriptionManager, SubscriptionOutcome, SubscriptionState,
};
