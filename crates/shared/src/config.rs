use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config_env::{optional_trimmed_env, parse_u32_env, parse_u64_env, require_env};
use crate::llm::prompts::DEFAULT_SYSTEM_PROMPT;

const DEFAULT_REDIS_KEY_PREFIX: &str = "chat:session:v1";
const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_PERSIST_MAX_RETRIES: u32 = 2;
const DEFAULT_PERSIST_RETRY_BACKOFF_MS: u64 = 100;
const DEFAULT_MAX_MESSAGE_CHARS: usize = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Redis,
    Memory,
}

impl StoreBackend {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "SESSION_STORE_BACKEND must be postgres, redis or memory, got '{other}'"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Result<Self, ConfigError> {
        match optional_trimmed_env("LOG_FORMAT").map(|raw| raw.to_ascii_lowercase()) {
            None => Ok(Self::Text),
            Some(raw) if raw == "text" => Ok(Self::Text),
            Some(raw) if raw == "json" => Ok(Self::Json),
            Some(raw) => Err(ConfigError::InvalidConfiguration(format!(
                "LOG_FORMAT must be text or json, got '{raw}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub migrations_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub redis_url: String,
    pub key_prefix: String,
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgres(PostgresStoreConfig),
    Redis(RedisStoreConfig),
    Memory,
}

impl StoreConfig {
    pub fn backend(&self) -> StoreBackend {
        match self {
            Self::Postgres(_) => StoreBackend::Postgres,
            Self::Redis(_) => StoreBackend::Redis,
            Self::Memory => StoreBackend::Memory,
        }
    }
}

/// Tunables for the per-session actors.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub backend_timeout: Duration,
    pub persist_max_retries: u32,
    pub persist_retry_backoff: Duration,
    pub max_message_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            backend_timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
            persist_max_retries: DEFAULT_PERSIST_MAX_RETRIES,
            persist_retry_backoff: Duration::from_millis(DEFAULT_PERSIST_RETRY_BACKOFF_MS),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub log_format: LogFormat,
    pub store: StoreConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid number in env var {0}")]
    ParseInt(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match optional_trimmed_env("SESSION_STORE_BACKEND") {
            Some(raw) => StoreBackend::parse(&raw)?,
            None => StoreBackend::Postgres,
        };

        let store = match backend {
            StoreBackend::Postgres => StoreConfig::Postgres(PostgresStoreConfig {
                database_url: require_env("DATABASE_URL")?,
                max_connections: parse_u32_env("DATABASE_MAX_CONNECTIONS", 10)?,
                migrations_dir: env::var("MIGRATIONS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../db/migrations")
                    }),
            }),
            StoreBackend::Redis => StoreConfig::Redis(RedisStoreConfig {
                redis_url: require_env("REDIS_URL")?,
                key_prefix: optional_trimmed_env("REDIS_KEY_PREFIX")
                    .unwrap_or_else(|| DEFAULT_REDIS_KEY_PREFIX.to_string()),
            }),
            StoreBackend::Memory => StoreConfig::Memory,
        };

        let max_message_chars =
            parse_u64_env("MAX_MESSAGE_CHARS", DEFAULT_MAX_MESSAGE_CHARS as u64)?;
        if max_message_chars == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "MAX_MESSAGE_CHARS must be > 0".to_string(),
            ));
        }

        let backend_timeout_ms =
            parse_u64_env("CHAT_BACKEND_TIMEOUT_MS", DEFAULT_BACKEND_TIMEOUT_MS)?;
        if backend_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "CHAT_BACKEND_TIMEOUT_MS must be > 0".to_string(),
            ));
        }

        Ok(Self {
            bind_addr: env::var("API_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            log_format: LogFormat::from_env()?,
            store,
            session: SessionConfig {
                system_prompt: optional_trimmed_env("CHAT_SYSTEM_PROMPT")
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
                backend_timeout: Duration::from_millis(backend_timeout_ms),
                persist_max_retries: parse_u32_env(
                    "STORE_PERSIST_MAX_RETRIES",
                    DEFAULT_PERSIST_MAX_RETRIES,
                )?,
                persist_retry_backoff: Duration::from_millis(parse_u64_env(
                    "STORE_PERSIST_RETRY_BACKOFF_MS",
                    DEFAULT_PERSIST_RETRY_BACKOFF_MS,
                )?),
                max_message_chars: usize::try_from(max_message_chars).map_err(|_| {
                    ConfigError::InvalidConfiguration("MAX_MESSAGE_CHARS is too large".to_string())
                })?,
            },
        })
    }
}
