//! FlowRunner configuration system.
//!
//! Every setting is sourced from environment variables per §6 of the
//! runtime contract (`APP_ENV, HOST, PORT, ORG_ID, LOKI_URL,
//! MONGO_{USERNAME,PASSWORD,HOST,PORT,AUTH_SOURCE}, DEBUG,
//! DELAY_TICK_SECONDS`) — there is no authoring surface for this config and
//! no TOML file to merge on top of it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("environment variable error: {0}")]
    Env(String),
}

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// `APP_ENV` — e.g. "development", "staging", "production".
    pub app_env: String,
    pub http: HttpConfig,
    pub mongodb: MongoConfig,
    pub scheduler: SchedulerConfig,
    /// `ORG_ID` — brand/tenant scoping for this deployment, when the
    /// engine runs single-tenant.
    pub org_id: Option<String>,
    /// `LOKI_URL` — centralized log sink, consumed by the logging layer
    /// rather than this crate directly (kept here so it round-trips
    /// through one config load).
    pub loki_url: Option<String>,
    pub debug: bool,
    /// `WEBHOOK_SECRET` — shared secret channel connectors present as
    /// `X-Webhook-Secret`. `None` means inbound webhooks are unauthenticated,
    /// matching §6 ("channel-specific schemes are out of scope, but the hook
    /// point is real"). Global rather than per-channel-account: this engine
    /// has no config surface for per-account secrets yet.
    pub webhook_secret: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_env: "development".to_string(),
            http: HttpConfig::default(),
            mongodb: MongoConfig::default(),
            scheduler: SchedulerConfig::default(),
            org_id: None,
            loki_url: None,
            debug: false,
            webhook_secret: None,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8018 }
    }
}

/// MongoDB configuration, assembled from the discrete `MONGO_*` variables
/// rather than a single URI — matches how the runtime contract names them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub auth_source: String,
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            host: "localhost".to_string(),
            port: 27017,
            auth_source: "admin".to_string(),
            database: "flowrunner".to_string(),
        }
    }
}

impl MongoConfig {
    /// Assembles a `mongodb://` connection URI from the discrete fields.
    /// Credentials are percent-encoding-free here — operators supplying
    /// usernames/passwords with reserved characters must pre-encode them.
    pub fn uri(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("mongodb://{user}:{pass}@{}:{}/?authSource={}", self.host, self.port, self.auth_source)
            }
            _ => format!("mongodb://{}:{}/", self.host, self.port),
        }
    }
}

/// Delay Scheduler configuration (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// `DELAY_TICK_SECONDS`, default 20.
    pub tick_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_seconds: 20 }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }
}
