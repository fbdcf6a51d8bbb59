use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheTtls;

const CONFIG_FILE: &str = "boardlink.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub tracker: TrackerConfig,
    pub chat: ChatConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub api_key: SecretString,
    pub api_base_url: String,
    /// Public base URL the tracker posts webhook callbacks to.
    pub callback_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub bot_token: SecretString,
}

/// Cache lifetimes in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub me_secs: u64,
    pub boards_secs: u64,
    pub lists_secs: u64,
    pub members_secs: u64,
    pub labels_secs: u64,
    pub cards_secs: u64,
    pub user_cards_secs: u64,
    pub pending_input_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub tracker_api_key: Option<String>,
    pub tracker_callback_base_url: Option<String>,
    pub chat_bot_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://boardlink.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            tracker: TrackerConfig {
                api_key: String::new().into(),
                api_base_url: "https://api.trello.com/1".to_string(),
                callback_base_url: "http://localhost:8080".to_string(),
                timeout_secs: 15,
            },
            chat: ChatConfig { bot_token: String::new().into() },
            cache: CacheConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let ttls = CacheTtls::default();
        Self {
            me_secs: ttls.me.as_secs(),
            boards_secs: ttls.boards.as_secs(),
            lists_secs: ttls.lists.as_secs(),
            members_secs: ttls.members.as_secs(),
            labels_secs: ttls.labels.as_secs(),
            cards_secs: ttls.cards.as_secs(),
            user_cards_secs: ttls.user_cards.as_secs(),
            pending_input_secs: ttls.pending_input.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttls(&self) -> CacheTtls {
        CacheTtls {
            me: Duration::from_secs(self.me_secs),
            boards: Duration::from_secs(self.boards_secs),
            lists: Duration::from_secs(self.lists_secs),
            members: Duration::from_secs(self.members_secs),
            labels: Duration::from_secs(self.labels_secs),
            cards: Duration::from_secs(self.cards_secs),
            user_cards: Duration::from_secs(self.user_cards_secs),
            pending_input: Duration::from_secs(self.pending_input_secs),
        }
    }

    fn entries(&self) -> [(&'static str, u64); 8] {
        [
            ("cache.me_secs", self.me_secs),
            ("cache.boards_secs", self.boards_secs),
            ("cache.lists_secs", self.lists_secs),
            ("cache.members_secs", self.members_secs),
            ("cache.labels_secs", self.labels_secs),
            ("cache.cards_secs", self.cards_secs),
            ("cache.user_cards_secs", self.user_cards_secs),
            ("cache.pending_input_secs", self.pending_input_secs),
        ]
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(tracker) = patch.tracker {
            if let Some(api_key) = tracker.api_key {
                self.tracker.api_key = secret_value(api_key);
            }
            if let Some(api_base_url) = tracker.api_base_url {
                self.tracker.api_base_url = api_base_url;
            }
            if let Some(callback_base_url) = tracker.callback_base_url {
                self.tracker.callback_base_url = callback_base_url;
            }
            if let Some(timeout_secs) = tracker.timeout_secs {
                self.tracker.timeout_secs = timeout_secs;
            }
        }

        if let Some(chat) = patch.chat {
            if let Some(bot_token) = chat.bot_token {
                self.chat.bot_token = secret_value(bot_token);
            }
        }

        if let Some(cache) = patch.cache {
            let target = &mut self.cache;
            let fields = [
                (cache.me_secs, &mut target.me_secs),
                (cache.boards_secs, &mut target.boards_secs),
                (cache.lists_secs, &mut target.lists_secs),
                (cache.members_secs, &mut target.members_secs),
                (cache.labels_secs, &mut target.labels_secs),
                (cache.cards_secs, &mut target.cards_secs),
                (cache.user_cards_secs, &mut target.user_cards_secs),
                (cache.pending_input_secs, &mut target.pending_input_secs),
            ];
            for (value, slot) in fields {
                if let Some(value) = value {
                    *slot = value;
                }
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BOARDLINK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BOARDLINK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("BOARDLINK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BOARDLINK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BOARDLINK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BOARDLINK_TRACKER_API_KEY") {
            self.tracker.api_key = secret_value(value);
        }
        if let Some(value) = read_env("BOARDLINK_TRACKER_API_BASE_URL") {
            self.tracker.api_base_url = value;
        }
        if let Some(value) = read_env("BOARDLINK_TRACKER_CALLBACK_BASE_URL") {
            self.tracker.callback_base_url = value;
        }
        if let Some(value) = read_env("BOARDLINK_TRACKER_TIMEOUT_SECS") {
            self.tracker.timeout_secs = parse_u64("BOARDLINK_TRACKER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BOARDLINK_CHAT_BOT_TOKEN") {
            self.chat.bot_token = secret_value(value);
        }

        if let Some(value) = read_env("BOARDLINK_CACHE_CARDS_SECS") {
            self.cache.cards_secs = parse_u64("BOARDLINK_CACHE_CARDS_SECS", &value)?;
        }
        if let Some(value) = read_env("BOARDLINK_CACHE_BOARDS_SECS") {
            self.cache.boards_secs = parse_u64("BOARDLINK_CACHE_BOARDS_SECS", &value)?;
        }

        if let Some(value) = read_env("BOARDLINK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BOARDLINK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("BOARDLINK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("BOARDLINK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("BOARDLINK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("BOARDLINK_LOGGING_LEVEL").or_else(|| read_env("BOARDLINK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BOARDLINK_LOGGING_FORMAT").or_else(|| read_env("BOARDLINK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(api_key) = overrides.tracker_api_key {
            self.tracker.api_key = secret_value(api_key);
        }
        if let Some(callback_base_url) = overrides.tracker_callback_base_url {
            self.tracker.callback_base_url = callback_base_url;
        }
        if let Some(bot_token) = overrides.chat_bot_token {
            self.chat.bot_token = secret_value(bot_token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_tracker(&self.tracker)?;
        validate_chat(&self.chat)?;
        validate_cache(&self.cache)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(CONFIG_FILE), Path::new("config").join(CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_tracker(tracker: &TrackerConfig) -> Result<(), ConfigError> {
    if tracker.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "tracker.api_key is required. Get it from https://trello.com/app-key".to_string(),
        ));
    }

    for (name, url) in [
        ("tracker.api_base_url", &tracker.api_base_url),
        ("tracker.callback_base_url", &tracker.callback_base_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{name} must start with http:// or https://"
            )));
        }
    }

    if tracker.timeout_secs == 0 || tracker.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "tracker.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    let bot_token = chat.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "chat.bot_token is required. Ask @BotFather for a bot token".to_string(),
        ));
    }
    if !bot_token.contains(':') {
        return Err(ConfigError::Validation(
            "chat.bot_token must look like `<bot id>:<secret>`".to_string(),
        ));
    }

    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    match cache.entries().into_iter().find(|(_, secs)| *secs == 0) {
        Some((name, _)) => {
            Err(ConfigError::Validation(format!("{name} must be greater than zero")))
        }
        None => Ok(()),
    }
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    tracker: Option<TrackerPatch>,
    chat: Option<ChatPatch>,
    cache: Option<CachePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackerPatch {
    api_key: Option<String>,
    api_base_url: Option<String>,
    callback_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    bot_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    me_secs: Option<u64>,
    boards_secs: Option<u64>,
    lists_secs: Option<u64>,
    members_secs: Option<u64>,
    labels_secs: Option<u64>,
    cards_secs: Option<u64>,
    user_cards_secs: Option<u64>,
    pending_input_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REQUIRED: [(&str, &str); 2] =
        [("BOARDLINK_TRACKER_API_KEY", "key-from-env"), ("BOARDLINK_CHAT_BOT_TOKEN", "42:bot-secret")];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_required() {
        for (var, value) in REQUIRED {
            env::set_var(var, value);
        }
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
        for (var, _) in REQUIRED {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TRACKER_KEY", "interpolated-key");
        env::set_var("TEST_BOT_TOKEN", "7:interpolated");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("boardlink.toml");
            fs::write(
                &path,
                r#"
[tracker]
api_key = "${TEST_TRACKER_KEY}"

[chat]
bot_token = "${TEST_BOT_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.tracker.api_key.expose_secret() == "interpolated-key",
                "api key should be loaded from environment",
            )?;
            ensure(
                config.chat.bot_token.expose_secret() == "7:interpolated",
                "bot token should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_TRACKER_KEY", "TEST_BOT_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("BOARDLINK_LOG_LEVEL", "warn");
        env::set_var("BOARDLINK_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["BOARDLINK_LOG_LEVEL", "BOARDLINK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("BOARDLINK_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("boardlink.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[tracker]
api_key = "key-from-file"
callback_base_url = "https://hooks.example.org"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.tracker.api_key.expose_secret() == "key-from-env",
                "env api key should win over file and defaults",
            )?;
            ensure(
                config.tracker.callback_base_url == "https://hooks.example.org",
                "file callback url should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["BOARDLINK_DATABASE_URL"]);
        result
    }

    #[test]
    fn cache_section_maps_to_ttls() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("boardlink.toml");
            fs::write(
                &path,
                r#"
[cache]
cards_secs = 600
lists_secs = 60
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;
            let ttls = config.cache.ttls();

            ensure(ttls.cards == Duration::from_secs(600), "card ttl should come from file")?;
            ensure(ttls.lists == Duration::from_secs(60), "list ttl should come from file")?;
            ensure(
                ttls.members == Duration::from_secs(7 * 24 * 3600),
                "member ttl should keep its default",
            )?;
            Ok(())
        })();

        clear_vars(&[]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BOARDLINK_CHAT_BOT_TOKEN", "42:bot-secret");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("tracker.api_key")
            );
            ensure(has_message, "validation failure should mention tracker.api_key")
        })();

        clear_vars(&[]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("key-from-env"), "debug output should not contain api key")?;
            ensure(!debug.contains("bot-secret"), "debug output should not contain bot token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&[]);
        result
    }
}
