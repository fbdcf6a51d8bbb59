//! SQLite implementations of the core store ports.

pub mod cache;
pub mod credentials;
pub mod settings;

use boardlink_core::ports::StoreError;
use chrono::Utc;

pub use boardlink_core::ports::{InMemoryCacheStore, InMemoryCredentialStore, InMemorySettingsStore};
pub use cache::SqlCacheStore;
pub use credentials::SqlCredentialStore;
pub use settings::SqlSettingsStore;

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn decode(error: serde_json::Error) -> StoreError {
    StoreError::Decode(error.to_string())
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
