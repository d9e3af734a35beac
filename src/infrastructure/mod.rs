// Infrastructure: storage, response cache, security and request viewer plumbing
pub mod cache; // In-process LRU cache backend
pub mod cache_layer; // Response cache over a CacheStore
pub mod database; // Repository traits
pub mod middleware; // ViewerContext middleware and extractor
pub mod security; // Password hashing and tokens
pub mod sqlite_database; // SQLite repositories
pub mod viewer; // Viewer context

pub use cache::{CacheEntry, LocalCache};
pub use cache_layer::{CacheStore, ResponseCache};
pub use database::{
    CommentRepository, EntityStore, FriendshipRepository, LikeRepository, PostRepository,
    PrivacyRepository, UserRepository, Window,
};
pub use middleware::Vc;
pub use security::{Claims, IssuedToken, SecurityService};
pub use sqlite_database::SqliteDatabase;
pub use viewer::ViewerContext;
