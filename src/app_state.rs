use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::entities::{NewUser, Role};
use crate::error::AppResult;
use crate::infrastructure::{
    CacheStore, EntityStore, LocalCache, ResponseCache, SecurityService, SqliteDatabase,
};
use crate::pagination::Paginator;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub cache: ResponseCache,
    pub security: Arc<SecurityService>,
    pub paginator: Paginator,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let database = SqliteDatabase::connect(&config.database).await?;
        let cache = LocalCache::new(config.cache.capacity);

        let state = Self::with_backends(config, Arc::new(database), Arc::new(cache));
        state.bootstrap_admin().await?;
        Ok(state)
    }

    /// Assemble state over explicit store and cache backends.
    pub fn with_backends(
        config: Config,
        store: Arc<dyn EntityStore>,
        cache_store: Arc<dyn CacheStore>,
    ) -> Self {
        let cache = ResponseCache::new(cache_store, config.cache_ttl(), config.cache_op_timeout());
        Self {
            store,
            cache,
            security: Arc::new(SecurityService::new(&config.security)),
            paginator: Paginator::new(&config.pagination),
            config: Arc::new(config),
        }
    }

    /// Create the configured admin account if it does not exist yet.
    pub async fn bootstrap_admin(&self) -> AppResult<()> {
        let (Some(username), Some(password)) = (
            self.config.security.admin_username.as_deref(),
            self.config.security.admin_password.as_deref(),
        ) else {
            return Ok(());
        };

        if self.store.find_user_by_username(username).await?.is_some() {
            return Ok(());
        }

        let password_hash = self.security.hash_password(password)?;
        let admin = self
            .store
            .create_user(NewUser {
                username: username.to_string(),
                email: String::new(),
                password_hash,
                role: Role::Admin,
            })
            .await?;
        info!("Bootstrapped admin account {} ({})", admin.username, admin.id);
        Ok(())
    }
}
