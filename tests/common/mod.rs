#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use connectly::entities::{NewUser, Role, User};
use connectly::infrastructure::{CacheStore, LocalCache, SqliteDatabase};
use connectly::{create_router, AppError, AppResult, AppState, Config};

pub const PASSWORD: &str = "correct-horse-42";

/// Cache backend whose every call fails.
pub struct BrokenCache;

#[async_trait]
impl CacheStore for BrokenCache {
    async fn get(&self, _key: &str) -> AppResult<Option<Vec<u8>>> {
        Err(AppError::Internal("cache unreachable".to_string()))
    }

    async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> AppResult<()> {
        Err(AppError::Internal("cache unreachable".to_string()))
    }

    async fn delete(&self, _key: &str) -> AppResult<()> {
        Err(AppError::Internal("cache unreachable".to_string()))
    }

    async fn invalidate_prefix(&self, _prefix: &str) -> AppResult<u64> {
        Err(AppError::Internal("cache unreachable".to_string()))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub cache: Arc<LocalCache>,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub x_cache: Option<String>,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let cache = Arc::new(LocalCache::new(config.cache.capacity));
        let store = SqliteDatabase::new_in_memory().await.unwrap();
        let state = AppState::with_backends(config, Arc::new(store), cache.clone());
        let router = create_router(state.clone());
        Self {
            state,
            cache,
            router,
        }
    }

    /// App whose cache backend fails on every call.
    pub async fn with_broken_cache() -> Self {
        let config = Config::default();
        let store = SqliteDatabase::new_in_memory().await.unwrap();
        let state =
            AppState::with_backends(config.clone(), Arc::new(store), Arc::new(BrokenCache));
        let router = create_router(state.clone());
        Self {
            state,
            cache: Arc::new(LocalCache::new(config.cache.capacity)),
            router,
        }
    }

    /// User whose password is `PASSWORD`, for tests that log in.
    pub async fn create_user(&self, username: &str, role: Role) -> User {
        let password_hash = self.state.security.hash_password(PASSWORD).unwrap();
        self.insert_user(username, role, password_hash).await
    }

    async fn insert_user(&self, username: &str, role: Role, password_hash: String) -> User {
        self.state
            .store
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password_hash,
                role,
            })
            .await
            .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        self.state.security.issue_token(user).unwrap().token
    }

    /// Create a token-only user. Skips password hashing, so password login fails.
    pub async fn login_as(&self, username: &str, role: Role) -> (User, String) {
        let user = self.insert_user(username, role, "!".to_string()).await;
        let token = self.token_for(&user);
        (user, token)
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response: Response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let x_cache = response
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            x_cache,
            bytes: bytes.to_vec(),
        }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.send(Method::DELETE, uri, Some(token), None).await
    }
}
