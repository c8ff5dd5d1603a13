//! Configuration types, built from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Default pub/sub channel carrying canonical messages.
pub const DEFAULT_CHANNEL: &str = "whatsapp_messages";

/// Fixed delay between reconnect attempts of the subscriber loop.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Read an env var and parse it, falling back to `default` when unset or unparsable.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Read an env var, treating empty strings as unset.
fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("WA_RELAY_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind = raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: "WA_RELAY_BIND".into(),
            message: format!("{raw}: {e}"),
        })?;
        Ok(Self { bind })
    }
}

/// Redis pub/sub configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<SecretString>,
    /// Full connection URL; overrides host/port/db/password when set.
    pub url: Option<SecretString>,
    pub channel: String,
    pub reconnect_delay: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            url: None,
            channel: DEFAULT_CHANNEL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl RedisConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_nonempty("REDIS_HOST").unwrap_or(defaults.host),
            port: env_or("REDIS_PORT", defaults.port),
            db: env_or("REDIS_DB", defaults.db),
            password: env_nonempty("REDIS_PASSWORD").map(SecretString::from),
            url: env_nonempty("REDIS_URL").map(SecretString::from),
            channel: env_nonempty("REDIS_CHANNEL").unwrap_or(defaults.channel),
            reconnect_delay: Duration::from_secs(env_or(
                "REDIS_RECONNECT_DELAY_SECS",
                defaults.reconnect_delay.as_secs(),
            )),
        }
    }

    /// Connection URL for the redis client.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.expose_secret().to_string();
        }
        match &self.password {
            Some(pw) => format!(
                "redis://:{}@{}:{}/{}",
                pw.expose_secret(),
                self.host,
                self.port,
                self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Address for log lines (never includes credentials).
    pub fn display_target(&self) -> String {
        if self.url.is_some() {
            "REDIS_URL".to_string()
        } else {
            format!("{}:{}/{}", self.host, self.port, self.db)
        }
    }
}

/// Outbound SMTP configuration for the notification processor.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub to_address: String,
}

impl SmtpConfig {
    pub fn from_env() -> Self {
        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let from_address = env_nonempty("EMAIL_FROM").unwrap_or_else(|| username.clone());
        Self {
            host: env_nonempty("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port: env_or("SMTP_PORT", 587),
            username,
            password: SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default()),
            from_address,
            to_address: std::env::var("EMAIL_TO").unwrap_or_default(),
        }
    }

    /// Credentials and a recipient are all present.
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty()
            && !self.password.expose_secret().is_empty()
            && !self.to_address.is_empty()
    }
}

/// Durable storage configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            path: std::env::var("WA_RELAY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/whatsapp.db")),
        }
    }
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub smtp: SmtpConfig,
    pub database: DatabaseConfig,
    /// Base URL of the home-automation API; the processor is disabled when unset.
    pub home_automation_url: Option<String>,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            redis: RedisConfig::from_env(),
            smtp: SmtpConfig::from_env(),
            database: DatabaseConfig::from_env(),
            home_automation_url: env_nonempty("HOME_AUTOMATION_API_URL"),
        })
    }
}
