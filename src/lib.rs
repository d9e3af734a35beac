// Connectly - social networking REST backend

pub mod app_state;
pub mod cache_policy;
pub mod config;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod infrastructure;
pub mod pagination;
pub mod permissions;
pub mod routes;

pub use app_state::AppState;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::create_router;
