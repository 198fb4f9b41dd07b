//! # cx-config
//!
//! Layered runtime settings. Sources, lowest precedence first:
//! built-in defaults, `config/default.toml` (optional), then `CINEDEX__*`
//! environment variables (a `.env` file is loaded into the environment first).
//!
//! ex) `CINEDEX__AUTH__ACCESS_TOKEN_SECRET=...` sets `auth.access_token_secret`.

use std::path::PathBuf;

use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "CINEDEX";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub cache: CacheSettings,
    pub media: MediaSettings,
    pub log_format: LogFormat,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Deserialize)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    /// TTL of the recency view, in milliseconds
    pub recent_ttl_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct MediaSettings {
    pub temp_dir: PathBuf,
    pub movie_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

impl Settings {
    /// Loads `.env`, `config/default.toml` and the process environment.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_sources(Some("config/default"), Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    /// Builds settings from an optional file stem and an environment source.
    pub fn from_sources(file: Option<&str>, env: Environment) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.url", "sqlite://cinedex.db")?
            .set_default("database.max_connections", 5)?
            .set_default("auth.access_token_ttl_secs", 300)?
            .set_default("auth.refresh_token_ttl_secs", 86_400)?
            .set_default("cache.backend", "memory")?
            .set_default("cache.recent_ttl_ms", 3_000)?
            .set_default("media.temp_dir", "public/temp")?
            .set_default("media.movie_dir", "public/movie")?
            .set_default("log_format", "plain")?;

        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let access = self.auth.access_token_secret.expose_secret();
        let refresh = self.auth.refresh_token_secret.expose_secret();

        if access.is_empty() || refresh.is_empty() {
            return Err(SettingsError::Invalid("token secrets must not be empty".into()));
        }
        if access == refresh {
            return Err(SettingsError::Invalid("access and refresh secrets must differ".into()));
        }
        if self.auth.access_token_ttl_secs <= 0 || self.auth.refresh_token_ttl_secs <= 0 {
            return Err(SettingsError::Invalid("token lifetimes must be positive".into()));
        }
        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            return Err(SettingsError::Invalid("cache.redis_url is required for the redis backend".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
