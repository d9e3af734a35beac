use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub security: SecurityConfig,
    pub pagination: PaginationConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub password_min_length: usize,
    pub admin_username: Option<String>,
    #[serde(skip_serializing)]
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Apply per-viewer post visibility to the news feed. Off by default: the feed
    /// has always been served unfiltered.
    pub privacy_filter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/connectly.db".to_string(),
                max_connections: 5,
                acquire_timeout_ms: 3000,
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            cache: CacheConfig {
                capacity: 1000,
                ttl_secs: 300,
                op_timeout_ms: 250,
            },
            security: SecurityConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                token_ttl_secs: 24 * 3600,
                password_min_length: 8,
                admin_username: None,
                admin_password: None,
            },
            pagination: PaginationConfig {
                default_page_size: 10,
                max_page_size: 100,
            },
            feed: FeedConfig {
                privacy_filter: false,
            },
        }
    }
}

/// Signing secret of `Config::default()`. Only tests and local tooling may run with it.
pub const DEV_JWT_SECRET: &str = "connectly-dev-secret";

fn parsed_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from a key lookup. `JWT_SECRET` is mandatory and may not be the dev secret.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set"))?;
        if jwt_secret == DEV_JWT_SECRET {
            anyhow::bail!("JWT_SECRET must not be the built-in development secret");
        }

        let config = Self {
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parsed_or(
                    &lookup,
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                ),
                acquire_timeout_ms: parsed_or(
                    &lookup,
                    "DATABASE_ACQUIRE_TIMEOUT_MS",
                    defaults.database.acquire_timeout_ms,
                ),
            },
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parsed_or(&lookup, "SERVER_PORT", defaults.server.port),
            },
            cache: CacheConfig {
                capacity: parsed_or(&lookup, "CACHE_CAPACITY", defaults.cache.capacity),
                ttl_secs: parsed_or(&lookup, "CACHE_TTL_SECS", defaults.cache.ttl_secs),
                op_timeout_ms: parsed_or(
                    &lookup,
                    "CACHE_OP_TIMEOUT_MS",
                    defaults.cache.op_timeout_ms,
                ),
            },
            security: SecurityConfig {
                jwt_secret,
                token_ttl_secs: parsed_or(
                    &lookup,
                    "TOKEN_TTL_SECS",
                    defaults.security.token_ttl_secs,
                ),
                password_min_length: parsed_or(
                    &lookup,
                    "PASSWORD_MIN_LENGTH",
                    defaults.security.password_min_length,
                ),
                admin_username: lookup("ADMIN_USERNAME"),
                admin_password: lookup("ADMIN_PASSWORD"),
            },
            pagination: PaginationConfig {
                default_page_size: parsed_or(
                    &lookup,
                    "PAGE_SIZE",
                    defaults.pagination.default_page_size,
                ),
                max_page_size: parsed_or(
                    &lookup,
                    "MAX_PAGE_SIZE",
                    defaults.pagination.max_page_size,
                ),
            },
            feed: FeedConfig {
                privacy_filter: parsed_or(
                    &lookup,
                    "NEWSFEED_PRIVACY_FILTER",
                    defaults.feed.privacy_filter,
                ),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache.capacity == 0 {
            anyhow::bail!("CACHE_CAPACITY must be greater than zero");
        }
        if self.pagination.default_page_size == 0
            || self.pagination.default_page_size > self.pagination.max_page_size
        {
            anyhow::bail!("PAGE_SIZE must be between 1 and MAX_PAGE_SIZE");
        }
        if self.security.jwt_secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn cache_op_timeout(&self) -> Duration {
        Duration::from_millis(self.cache.op_timeout_ms)
    }
}
