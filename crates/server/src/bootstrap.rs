use std::sync::Arc;

use boardlink_chat::{
    dispatcher, ActorResolver, CardCreator, CardInteraction, ChatServices, EventDispatcher,
    FilterTuner,
};
use boardlink_core::cache::{EntityCache, RemoteGuard};
use boardlink_core::config::{AppConfig, ConfigError, LoadOptions};
use boardlink_core::notifications::NotificationSettings;
use boardlink_core::subscriptions::SubscriptionManager;
use boardlink_db::{
    connect_from_config, migrations, DbPool, SqlCacheStore, SqlCredentialStore, SqlSettingsStore,
};
use boardlink_remote::HttpBoardClient;
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub services: ChatServices,
    pub dispatcher: EventDispatcher,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("tracker client could not be built: {0}")]
    TrackerClient(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let cache_store = Arc::new(SqlCacheStore::new(db_pool.clone()));
    match cache_store.purge_expired().await {
        Ok(purged) => info!(
            event_name = "system.bootstrap.cache_purged",
            correlation_id = "bootstrap",
            purged,
            "expired cache entries removed"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.cache_purged",
            correlation_id = "bootstrap",
            error = %error,
            "could not purge expired cache entries"
        ),
    }

    let remote = HttpBoardClient::from_config(&config.tracker)
        .map_err(|error| BootstrapError::TrackerClient(error.to_string()))?;
    let credentials = Arc::new(SqlCredentialStore::new(db_pool.clone()));
    let settings = Arc::new(SqlSettingsStore::new(db_pool.clone()));

    let guard = RemoteGuard::new(Arc::new(remote), credentials.clone());
    let cache = EntityCache::new(cache_store, guard.clone(), config.cache.ttls());
    let services = ChatServices {
        actors: ActorResolver::new(credentials.clone()),
        interaction: CardInteraction::new(cache.clone()),
        creator: CardCreator::new(cache.clone()),
        tuner: FilterTuner::new(NotificationSettings::new(settings.clone())),
        subscriptions: SubscriptionManager::new(
            guard,
            settings,
            credentials.clone(),
            config.tracker.callback_base_url.clone(),
        ),
        cache,
        credentials,
    };
    let dispatcher = dispatcher(&services);
    info!(
        event_name = "system.bootstrap.services_wired",
        correlation_id = "bootstrap",
        handlers = dispatcher.handler_count(),
        "chat services wired"
    );

    Ok(Application { config, db_pool, services, dispatcher })
}
