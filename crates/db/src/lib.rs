pub mod connection;
pub mod migrations;
pub mod stores;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use stores::{
    InMemoryCacheStore, InMemoryCredentialStore, InMemorySettingsStore, SqlCacheStore,
    SqlCredentialStore, SqlSettingsStore,
};
