pub mod memory;
pub mod remote;
pub mod store;

pub use memory::{InMemoryCacheStore, InMemoryCredentialStore, InMemorySettingsStore};
pub use remote::{
    CardMutation, ConflictKind, MutationReceipt, PositionTarget, RemoteBoardClient, RemoteError,
};
pub use store::{
    CacheDelta, CacheScope, CredentialStore, ScopedCacheStore, SettingsStore, StoreError,
};
