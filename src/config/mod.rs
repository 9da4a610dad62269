//! Configuration management
//!
//! Configuration is read from a YAML file (default `config.yml`) and then
//! overridden by `JOBBOARD_*` environment variables. Every section is
//! optional; missing values fall back to defaults.

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin for the frontend
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Take the client address from `X-Forwarded-For`; only safe behind a
    /// reverse proxy that overwrites the header
    #[serde(default)]
    pub trusted_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            trusted_proxy: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Connection URL, or a file path for SQLite
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/jobboard.db".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub driver: CacheDriver,
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Default TTL for plain cache entries
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// How long a stale-while-revalidate entry is served as fresh
    #[serde(default = "default_fresh_seconds")]
    pub fresh_seconds: u64,
    /// How long past freshness a stale entry may still be served
    #[serde(default = "default_stale_seconds")]
    pub stale_seconds: u64,
    /// Entry cap for the in-process backend
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            ttl_seconds: default_ttl(),
            fresh_seconds: default_fresh_seconds(),
            stale_seconds: default_stale_seconds(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_fresh_seconds() -> u64 {
    60
}

fn default_stale_seconds() -> u64 {
    300
}

fn default_max_entries() -> u64 {
    10_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    #[default]
    Memory,
    Redis,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum image size in bytes (default: 5MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Maximum resume size in bytes (default: 10MB)
    #[serde(default = "default_max_resume_size")]
    pub max_resume_size: u64,
    #[serde(default = "default_allowed_image_types")]
    pub allowed_image_types: Vec<String>,
    #[serde(default = "default_allowed_resume_types")]
    pub allowed_resume_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            max_resume_size: default_max_resume_size(),
            allowed_image_types: default_allowed_image_types(),
            allowed_resume_types: default_allowed_resume_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}

fn default_max_resume_size() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_image_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

fn default_allowed_resume_types() -> Vec<String> {
    vec![
        "application/pdf".to_string(),
        "application/msword".to_string(),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
    ]
}

/// Kind of file accepted by an upload endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Resume,
}

impl UploadConfig {
    pub fn is_type_allowed(&self, kind: UploadKind, mime_type: &str) -> bool {
        let allowed = match kind {
            UploadKind::Image => &self.allowed_image_types,
            UploadKind::Resume => &self.allowed_resume_types,
        };
        allowed.iter().any(|t| t == mime_type)
    }

    pub fn max_size(&self, kind: UploadKind) -> u64 {
        match kind {
            UploadKind::Image => self.max_file_size,
            UploadKind::Resume => self.max_resume_size,
        }
    }

    /// Get file extension for a MIME type
    pub fn get_extension(mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "application/pdf" => "pdf",
            "application/msword" => "doc",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
            _ => "bin",
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for issued tokens. Generated per process when absent.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    /// PKCS#8 PEM private key used to decrypt client-encrypted credentials
    #[serde(default = "default_private_key_path")]
    pub private_key_path: PathBuf,
    /// SPKI PEM public key handed out to clients
    #[serde(default = "default_public_key_path")]
    pub public_key_path: PathBuf,
    /// Sniff ciphertext in password fields when the client sends no
    /// `encrypted` flag
    #[serde(default = "default_true")]
    pub encryption_heuristic: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_hours: default_token_ttl_hours(),
            private_key_path: default_private_key_path(),
            public_key_path: default_public_key_path(),
            encryption_heuristic: true,
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    24 * 7
}

fn default_private_key_path() -> PathBuf {
    PathBuf::from("keys/private.pem")
}

fn default_public_key_path() -> PathBuf {
    PathBuf::from("keys/public.pem")
}

fn default_true() -> bool {
    true
}

pub const MIN_JWT_SECRET_LEN: usize = 32;

impl AuthConfig {
    /// Configured secret, or a random one that lives as long as the process.
    pub fn jwt_secret_or_generate(&self) -> String {
        match &self.jwt_secret {
            Some(secret) => secret.clone(),
            None => {
                tracing::warn!(
                    "auth.jwt_secret is not set; generated a random secret, tokens will not survive a restart"
                );
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(64)
                    .map(char::from)
                    .collect()
            }
        }
    }
}

/// Notification stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Number of notifications returned by the list endpoint
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
    #[serde(default = "default_keepalive_seconds")]
    pub keepalive_seconds: u64,
    /// Per-user broadcast buffer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            keepalive_seconds: default_keepalive_seconds(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_history_limit() -> i64 {
    20
}

fn default_keepalive_seconds() -> u64 {
    15
}

fn default_channel_capacity() -> usize {
    64
}

/// Subscription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Open jobs an employer without a paid plan may have
    #[serde(default = "default_free_job_post_limit")]
    pub free_job_post_limit: i64,
    #[serde(default = "default_expiry_check_interval")]
    pub expiry_check_interval_seconds: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            free_job_post_limit: default_free_job_post_limit(),
            expiry_check_interval_seconds: default_expiry_check_interval(),
        }
    }
}

fn default_free_job_post_limit() -> i64 {
    3
}

fn default_expiry_check_interval() -> u64 {
    600
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the defaults; invalid YAML is an error
    /// carrying line and column.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        Ok(Self::load_from_str(&content, &path.display().to_string())?)
    }

    /// Parse configuration from a YAML string. `origin` names the source in errors.
    pub fn load_from_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: origin.to_string(),
            message: format_yaml_error(&e),
        })
    }

    /// Load from file, apply `JOBBOARD_*` overrides and validate.
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("JOBBOARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("JOBBOARD_PORT") {
            self.server.port = port;
        }
        if let Ok(origin) = std::env::var("JOBBOARD_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }
        if let Some(trusted) = env_parse::<bool>("JOBBOARD_TRUSTED_PROXY") {
            self.server.trusted_proxy = trusted;
        }

        if let Ok(driver) = std::env::var("JOBBOARD_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("JOBBOARD_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(driver) = std::env::var("JOBBOARD_CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "redis" => self.cache.driver = CacheDriver::Redis,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("JOBBOARD_REDIS_URL") {
            self.cache.redis_url = Some(url);
        }
        if let Some(ttl) = env_parse::<u64>("JOBBOARD_CACHE_TTL_SECONDS") {
            self.cache.ttl_seconds = ttl;
        }

        if let Ok(path) = std::env::var("JOBBOARD_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }

        if let Ok(secret) = std::env::var("JOBBOARD_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(hours) = env_parse::<i64>("JOBBOARD_TOKEN_TTL_HOURS") {
            self.auth.token_ttl_hours = hours;
        }
        if let Ok(path) = std::env::var("JOBBOARD_PRIVATE_KEY_PATH") {
            self.auth.private_key_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("JOBBOARD_PUBLIC_KEY_PATH") {
            self.auth.public_key_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }
        if self.cache.driver == CacheDriver::Redis
            && self.cache.redis_url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(
                "cache.redis_url is required when cache.driver is redis".to_string(),
            ));
        }
        if let Some(secret) = &self.auth.jwt_secret {
            if secret.len() < MIN_JWT_SECRET_LEN {
                return Err(ConfigError::ValidationError(format!(
                    "auth.jwt_secret must be at least {} bytes",
                    MIN_JWT_SECRET_LEN
                )));
            }
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.token_ttl_hours must be positive".to_string(),
            ));
        }
        if self.notifications.history_limit <= 0 || self.notifications.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "notifications.history_limit and channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// `--config <path>` (or `--config=<path>`) wins over `JOBBOARD_CONFIG`,
/// which wins over `config.yml`.
pub fn resolve_config_path<I>(args: I) -> PathBuf
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return PathBuf::from(path);
        }
    }

    std::env::var("JOBBOARD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches JOBBOARD_* variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "JOBBOARD_HOST",
    "JOBBOARD_PORT",
    "JOBBOARD_CORS_ORIGIN",
    "JOBBOARD_TRUSTED_PROXY",
    "JOBBOARD_DATABASE_DRIVER",
    "JOBBOARD_DATABASE_URL",
    "JOBBOARD_CACHE_DRIVER",
    "JOBBOARD_REDIS_URL",
    "JOBBOARD_CACHE_TTL_SECONDS",
    "JOBBOARD_UPLOAD_PATH",
    "JOBBOARD_JWT_SECRET",
    "JOBBOARD_TOKEN_TTL_HOURS",
    "JOBBOARD_PRIVATE_KEY_PATH",
    "JOBBOARD_PUBLIC_KEY_PATH",
    "JOBBOARD_CONFIG",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            "[a-z][a-z0-9]{0,10}",
            1u16..=65535,
            prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
            "[a-z][a-z0-9_/]{0,20}\\.db",
            1u64..=86400,
            1i64..=100,
        )
            .prop_map(|(host, port, driver, url, ttl, history)| {
                let mut config = Config::default();
                config.server.host = host;
                config.server.port = port;
                config.database = DatabaseConfig { driver, url };
                config.cache.ttl_seconds = ttl;
                config.notifications.history_limit = history;
                config
            })
    }

    fn malformed_yaml_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("server:\n  port: not_a_number".to_string()),
            Just("server:\n  port: 99999999999999999999".to_string()),
            Just("cache:\n  ttl_seconds: -100".to_string()),
            Just("database:\n  driver: postgres".to_string()),
            Just("cache:\n  driver: memcached".to_string()),
            Just("auth:\n  token_ttl_hours: soon".to_string()),
            Just("notifications: [1, 2]".to_string()),
            Just("server: 12345".to_string()),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn serialized_config_parses_back(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).unwrap();
            let parsed = Config::load_from_str(&yaml, "roundtrip").unwrap();

            prop_assert_eq!(config.server.host, parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(config.database.driver, parsed.database.driver);
            prop_assert_eq!(config.database.url, parsed.database.url);
            prop_assert_eq!(config.cache.ttl_seconds, parsed.cache.ttl_seconds);
            prop_assert_eq!(config.notifications.history_limit, parsed.notifications.history_limit);
        }

        #[test]
        fn malformed_yaml_is_rejected(yaml in malformed_yaml_strategy()) {
            let result = Config::load_from_str(&yaml, "bad.yml");
            let rejected = matches!(result, Err(ConfigError::ParseError { .. }));
            prop_assert!(rejected);
        }

        #[test]
        fn env_port_takes_precedence(file_port in 1u16..=65535, env_port in 1u16..=65535) {
            let _guard = lock_env();
            super::clear_env();

            let mut config = Config::load_from_str(&format!("server:\n  port: {}\n", file_port), "p").unwrap();
            std::env::set_var("JOBBOARD_PORT", env_port.to_string());
            config.apply_env_overrides();
            super::clear_env();

            prop_assert_eq!(config.server.port, env_port);
        }
    }
}
