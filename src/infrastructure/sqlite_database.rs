use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::DatabaseConfig;
use crate::entities::{
    Comment, FollowOutcome, Like, NewComment, NewPost, NewUser, Post, PostEngagement,
    PostFilter, PrivacySettings, Role, UnfollowOutcome, User, ALREADY_LIKED,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{
    current_time_millis, from_millis, CommentRepository, FriendshipRepository, LikeRepository,
    PostRepository, PrivacyRepository, UserRepository, Window,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL DEFAULT '',
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'USER',
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_groups (
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        group_name TEXT NOT NULL,
        PRIMARY KEY (user_id, group_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_permissions (
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        codename TEXT NOT NULL,
        PRIMARY KEY (user_id, codename)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS privacy_settings (
        user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
        profile_visibility TEXT NOT NULL DEFAULT 'PUBLIC',
        post_default TEXT NOT NULL DEFAULT 'PUBLIC'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        post_type TEXT NOT NULL DEFAULT 'text',
        metadata TEXT NOT NULL DEFAULT '{}',
        author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL,
        privacy TEXT NOT NULL DEFAULT 'PUBLIC'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS likes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL,
        UNIQUE (post_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS friendships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        to_user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        accepted INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        UNIQUE (from_user_id, to_user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id)",
    "CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id)",
    "CREATE INDEX IF NOT EXISTS idx_friendships_to ON friendships(to_user_id)",
];

const POST_COLUMNS: &str =
    "SELECT id, title, content, post_type, metadata, author_id, created_at, privacy FROM posts";

/// SQLite implementation of every repository trait
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| {
                AppError::ConfigurationError(format!("Invalid DATABASE_URL {}: {}", config.url, e))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(config.acquire_timeout_ms));

        if let Some(parent) = database_directory(&config.url) {
            tokio::fs::create_dir_all(&parent).await.map_err(|e| {
                AppError::ConfigurationError(format!(
                    "Failed to create database directory {}: {}",
                    parent, e
                ))
            })?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to {}: {}", config.url, e))
            })?;

        info!("Connected to SQLite database at {}", config.url);
        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Single-connection in-memory database. The connection is never recycled,
    /// since closing it would drop the data.
    pub async fn new_in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::ConfigurationError(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn initialize(&self) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to create schema: {}", e)))?;
        }
        Ok(())
    }

    async fn hydrate_user(&self, row: SqliteRow) -> AppResult<User> {
        let id: i64 = row.try_get("id")?;
        let role: String = row.try_get("role")?;

        let groups = sqlx::query("SELECT group_name FROM user_groups WHERE user_id = ? ORDER BY group_name")
            .bind(id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| r.try_get::<String, _>("group_name"))
            .collect::<Result<Vec<_>, _>>()?;

        let permissions = sqlx::query("SELECT codename FROM user_permissions WHERE user_id = ? ORDER BY codename")
            .bind(id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| r.try_get::<String, _>("codename"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(User {
            id,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role: role.parse()?,
            groups,
            permissions,
            created_at: from_millis(row.try_get("created_at")?),
        })
    }
}

/// Directory that must exist for a file-backed SQLite URL.
fn database_directory(url: &str) -> Option<String> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    std::path::Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn post_from_row(row: &SqliteRow) -> AppResult<Post> {
    let post_type: String = row.try_get("post_type")?;
    let privacy: String = row.try_get("privacy")?;
    let metadata: String = row.try_get("metadata")?;

    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        post_type: post_type.parse()?,
        metadata: serde_json::from_str::<Map<String, Value>>(&metadata)?,
        author_id: row.try_get("author_id")?,
        created_at: from_millis(row.try_get("created_at")?),
        privacy: privacy.parse()?,
    })
}

fn comment_from_row(row: &SqliteRow) -> AppResult<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        author_id: row.try_get("author_id")?,
        post_id: row.try_get("post_id")?,
        created_at: from_millis(row.try_get("created_at")?),
    })
}

fn like_from_row(row: &SqliteRow) -> AppResult<Like> {
    Ok(Like {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        post_id: row.try_get("post_id")?,
        created_at: from_millis(row.try_get("created_at")?),
    })
}

fn push_post_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(author_id) = filter.author_id {
        qb.push(" AND author_id = ");
        qb.push_bind(author_id);
    }
    if let Some(post_type) = filter.post_type {
        qb.push(" AND post_type = ");
        qb.push_bind(post_type.as_str());
    }
}

#[async_trait]
impl UserRepository for SqliteDatabase {
    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let now = current_time_millis();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict(
                    "User with this username already exists.".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let settings = PrivacySettings::defaults_for(id);
        sqlx::query(
            "INSERT INTO privacy_settings (user_id, profile_visibility, post_default) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(settings.profile_visibility.as_str())
        .bind(settings.post_default.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO user_groups (user_id, group_name) VALUES (?, ?)")
            .bind(id)
            .bind(user.role.group_name())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Created user {} with id {}", user.username, id);

        Ok(User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            groups: vec![user.role.group_name().to_string()],
            permissions: Vec::new(),
            created_at: from_millis(now),
        })
    }

    async fn find_user(&self, id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, role, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_user(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, role, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_user(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, username, email, password_hash, role, created_at FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(self.hydrate_user(row).await?);
        }
        Ok(users)
    }

    #[instrument(skip(self))]
    async fn set_role(&self, user_id: i64, role: Role) -> AppResult<Option<User>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("DELETE FROM user_groups WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO user_groups (user_id, group_name) VALUES (?, ?)")
            .bind(user_id)
            .bind(role.group_name())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.find_user(user_id).await
    }

    async fn grant_permission(&self, user_id: i64, codename: &str) -> AppResult<()> {
        sqlx::query("INSERT OR IGNORE INTO user_permissions (user_id, codename) VALUES (?, ?)")
            .bind(user_id)
            .bind(codename)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, user_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PrivacyRepository for SqliteDatabase {
    async fn privacy_settings(&self, user_id: i64) -> AppResult<Option<PrivacySettings>> {
        let row = sqlx::query(
            "SELECT user_id, profile_visibility, post_default FROM privacy_settings WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let visibility: String = row.try_get("profile_visibility")?;
                let post_default: String = row.try_get("post_default")?;
                Ok(Some(PrivacySettings {
                    user_id: row.try_get("user_id")?,
                    profile_visibility: visibility.parse()?,
                    post_default: post_default.parse()?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_privacy_settings(&self, settings: &PrivacySettings) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO privacy_settings (user_id, profile_visibility, post_default) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                profile_visibility = excluded.profile_visibility,
                post_default = excluded.post_default",
        )
        .bind(settings.user_id)
        .bind(settings.profile_visibility.as_str())
        .bind(settings.post_default.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PostRepository for SqliteDatabase {
    #[instrument(skip(self, post), fields(author_id = post.author_id))]
    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let now = current_time_millis();
        let metadata = serde_json::to_string(&post.metadata)?;

        let result = sqlx::query(
            "INSERT INTO posts (title, content, post_type, metadata, author_id, created_at, privacy)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.post_type.as_str())
        .bind(&metadata)
        .bind(post.author_id)
        .bind(now)
        .bind(post.privacy.as_str())
        .execute(&self.pool)
        .await?;

        Ok(Post {
            id: result.last_insert_rowid(),
            title: post.title,
            content: post.content,
            post_type: post.post_type,
            metadata: post.metadata,
            author_id: post.author_id,
            created_at: from_millis(now),
            privacy: post.privacy,
        })
    }

    async fn find_post(&self, id: i64) -> AppResult<Option<Post>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn count_posts(&self, filter: &PostFilter) -> AppResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM posts");
        push_post_filter(&mut qb, filter);
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("total")?)
    }

    async fn list_posts(&self, filter: &PostFilter, window: Window) -> AppResult<Vec<Post>> {
        let mut qb = QueryBuilder::<Sqlite>::new(POST_COLUMNS);
        push_post_filter(&mut qb, filter);
        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(window.limit);
        qb.push(" OFFSET ");
        qb.push_bind(window.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(post_from_row).collect()
    }

    async fn newsfeed_posts(&self) -> AppResult<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "{} ORDER BY created_at DESC, id DESC",
            POST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(post_from_row).collect()
    }

    async fn post_engagement(&self, post: &Post) -> AppResult<PostEngagement> {
        let author_username: String = sqlx::query("SELECT username FROM users WHERE id = ?")
            .bind(post.author_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.try_get("username"))
            .transpose()?
            .unwrap_or_default();

        let commenters = sqlx::query(
            "SELECT u.username FROM comments c JOIN users u ON u.id = c.author_id
             WHERE c.post_id = ? ORDER BY c.id",
        )
        .bind(post.id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.try_get::<String, _>("username"))
        .collect::<Result<Vec<_>, _>>()?;

        let likers = sqlx::query(
            "SELECT u.username FROM likes l JOIN users u ON u.id = l.user_id
             WHERE l.post_id = ? ORDER BY l.id",
        )
        .bind(post.id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.try_get::<String, _>("username"))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(PostEngagement {
            author_username,
            commenters,
            likers,
        })
    }

    #[instrument(skip(self))]
    async fn delete_post(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CommentRepository for SqliteDatabase {
    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let now = current_time_millis();
        let result = sqlx::query(
            "INSERT INTO comments (text, author_id, post_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&comment.text)
        .bind(comment.author_id)
        .bind(comment.post_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            text: comment.text,
            author_id: comment.author_id,
            post_id: comment.post_id,
            created_at: from_millis(now),
        })
    }

    async fn count_comments(&self, post_id: Option<i64>) -> AppResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM comments");
        if let Some(post_id) = post_id {
            qb.push(" WHERE post_id = ");
            qb.push_bind(post_id);
        }
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("total")?)
    }

    async fn list_comments(&self, post_id: Option<i64>, window: Window) -> AppResult<Vec<Comment>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, text, author_id, post_id, created_at FROM comments",
        );
        if let Some(post_id) = post_id {
            qb.push(" WHERE post_id = ");
            qb.push_bind(post_id);
        }
        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(window.limit);
        qb.push(" OFFSET ");
        qb.push_bind(window.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn find_comments_by_post(&self, post_id: i64) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT id, text, author_id, post_id, created_at FROM comments WHERE post_id = ? ORDER BY id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(comment_from_row).collect()
    }
}

#[async_trait]
impl LikeRepository for SqliteDatabase {
    #[instrument(skip(self))]
    async fn create_like(&self, user_id: i64, post_id: i64) -> AppResult<Like> {
        let now = current_time_millis();
        let result = sqlx::query("INSERT INTO likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(Like {
                id: done.last_insert_rowid(),
                user_id,
                post_id,
                created_at: from_millis(now),
            }),
            Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(ALREADY_LIKED.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_like(&self, id: i64) -> AppResult<Option<Like>> {
        let row = sqlx::query("SELECT id, user_id, post_id, created_at FROM likes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(like_from_row).transpose()
    }

    async fn list_likes(&self) -> AppResult<Vec<Like>> {
        let rows = sqlx::query("SELECT id, user_id, post_id, created_at FROM likes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(like_from_row).collect()
    }

    async fn count_likes_for_post(&self, post_id: i64) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM likes WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    async fn delete_like(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM likes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FriendshipRepository for SqliteDatabase {
    #[instrument(skip(self))]
    async fn follow(&self, from_user_id: i64, to_user_id: i64) -> AppResult<FollowOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM friendships WHERE from_user_id = ? AND to_user_id = ?")
            .bind(from_user_id)
            .bind(to_user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Ok(FollowOutcome::AlreadyFollowing);
        }

        let reverse = sqlx::query("SELECT id FROM friendships WHERE from_user_id = ? AND to_user_id = ?")
            .bind(to_user_id)
            .bind(from_user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let mutual = reverse.is_some();

        let inserted = sqlx::query(
            "INSERT INTO friendships (from_user_id, to_user_id, accepted, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(from_user_id)
        .bind(to_user_id)
        .bind(mutual)
        .bind(current_time_millis())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(FollowOutcome::AlreadyFollowing),
            Err(e) => return Err(e.into()),
        }

        if mutual {
            sqlx::query("UPDATE friendships SET accepted = 1 WHERE from_user_id = ? AND to_user_id = ?")
                .bind(to_user_id)
                .bind(from_user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(FollowOutcome::Followed { mutual })
    }

    #[instrument(skip(self))]
    async fn unfollow(&self, from_user_id: i64, to_user_id: i64) -> AppResult<UnfollowOutcome> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM friendships WHERE from_user_id = ? AND to_user_id = ?")
            .bind(from_user_id)
            .bind(to_user_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Ok(UnfollowOutcome::NotFollowing);
        }

        sqlx::query("UPDATE friendships SET accepted = 0 WHERE from_user_id = ? AND to_user_id = ?")
            .bind(to_user_id)
            .bind(from_user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(UnfollowOutcome::Unfollowed)
    }

    async fn friends_of(&self, user_id: i64) -> AppResult<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT to_user_id AS friend_id FROM friendships WHERE from_user_id = ? AND accepted = 1
             UNION
             SELECT from_user_id AS friend_id FROM friendships WHERE to_user_id = ? AND accepted = 1
             ORDER BY friend_id",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("friend_id").map_err(AppError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PostType, PrivacyLevel};

    async fn store_with_users() -> (SqliteDatabase, User, User) {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let alice = db
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "x".to_string(),
                role: Role::Editor,
            })
            .await
            .unwrap();
        let bob = db
            .create_user(NewUser {
                username: "bob".to_string(),
                email: String::new(),
                password_hash: "x".to_string(),
                role: Role::User,
            })
            .await
            .unwrap();
        (db, alice, bob)
    }

    fn text_post(author_id: i64, title: &str) -> NewPost {
        NewPost {
            title: title.to_string(),
            content: String::new(),
            post_type: PostType::Text,
            metadata: Map::new(),
            author_id,
            privacy: PrivacyLevel::Public,
        }
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let (db, _, _) = store_with_users().await;
        let err = db
            .create_user(NewUser {
                username: "alice".to_string(),
                email: String::new(),
                password_hash: "y".to_string(),
                role: Role::User,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn every_user_gets_privacy_settings_and_a_group() {
        let (db, alice, _) = store_with_users().await;
        let settings = db.privacy_settings(alice.id).await.unwrap().unwrap();
        assert_eq!(settings.post_default, PrivacyLevel::Public);

        let loaded = db.find_user(alice.id).await.unwrap().unwrap();
        assert_eq!(loaded.groups, vec!["Editor".to_string()]);
    }

    #[tokio::test]
    async fn set_role_replaces_group_membership() {
        let (db, _, bob) = store_with_users().await;
        let updated = db.set_role(bob.id, Role::Admin).await.unwrap().unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.groups, vec!["Admin".to_string()]);
        assert!(db.set_role(9999, Role::Admin).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_like_is_rejected_and_count_unchanged() {
        let (db, alice, bob) = store_with_users().await;
        let post = db.create_post(text_post(alice.id, "hello")).await.unwrap();

        db.create_like(bob.id, post.id).await.unwrap();
        let err = db.create_like(bob.id, post.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref msg) if msg == ALREADY_LIKED));
        assert_eq!(db.count_likes_for_post(post.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn deleting_a_post_cascades_to_comments_and_likes() {
        let (db, alice, bob) = store_with_users().await;
        let post = db.create_post(text_post(alice.id, "hello")).await.unwrap();
        db.create_comment(NewComment {
            text: "nice".to_string(),
            author_id: bob.id,
            post_id: post.id,
        })
        .await
        .unwrap();
        db.create_like(bob.id, post.id).await.unwrap();

        assert!(db.delete_post(post.id).await.unwrap());
        assert!(db.find_comments_by_post(post.id).await.unwrap().is_empty());
        assert_eq!(db.count_likes_for_post(post.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn newsfeed_is_newest_first() {
        let (db, alice, _) = store_with_users().await;
        for i in 0..3 {
            db.create_post(text_post(alice.id, &format!("post {}", i)))
                .await
                .unwrap();
        }
        let titles: Vec<String> = db
            .newsfeed_posts()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["post 2", "post 1", "post 0"]);
    }

    #[tokio::test]
    async fn mutual_follow_makes_friends_and_unfollow_breaks_it() {
        let (db, alice, bob) = store_with_users().await;

        assert_eq!(
            db.follow(alice.id, bob.id).await.unwrap(),
            FollowOutcome::Followed { mutual: false }
        );
        assert!(db.friends_of(alice.id).await.unwrap().is_empty());
        assert_eq!(
            db.follow(alice.id, bob.id).await.unwrap(),
            FollowOutcome::AlreadyFollowing
        );

        assert_eq!(
            db.follow(bob.id, alice.id).await.unwrap(),
            FollowOutcome::Followed { mutual: true }
        );
        assert_eq!(db.friends_of(alice.id).await.unwrap(), vec![bob.id]);
        assert_eq!(db.friends_of(bob.id).await.unwrap(), vec![alice.id]);

        assert_eq!(
            db.unfollow(bob.id, alice.id).await.unwrap(),
            UnfollowOutcome::Unfollowed
        );
        assert!(db.friends_of(alice.id).await.unwrap().is_empty());
        assert_eq!(
            db.unfollow(bob.id, alice.id).await.unwrap(),
            UnfollowOutcome::NotFollowing
        );
    }

    #[tokio::test]
    async fn post_filters_apply_to_count_and_list() {
        let (db, alice, bob) = store_with_users().await;
        db.create_post(text_post(alice.id, "a1")).await.unwrap();
        db.create_post(text_post(bob.id, "b1")).await.unwrap();
        db.create_post(text_post(alice.id, "a2")).await.unwrap();

        let filter = PostFilter {
            author_id: Some(alice.id),
            post_type: None,
        };
        assert_eq!(db.count_posts(&filter).await.unwrap(), 2);
        let page = db
            .list_posts(&filter, Window { limit: 1, offset: 1 })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "a2");
    }

    #[test]
    fn file_urls_need_their_directory() {
        assert_eq!(
            database_directory("sqlite:data/connectly.db"),
            Some("data".to_string())
        );
        assert_eq!(database_directory("sqlite::memory:"), None);
        assert_eq!(database_directory("sqlite:connectly.db"), None);
    }

    #[tokio::test]
    async fn file_backed_database_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("connectly.db");
        let config = DatabaseConfig {
            url: format!("sqlite:{}", path.display()),
            max_connections: 2,
            acquire_timeout_ms: 1000,
        };

        let db = SqliteDatabase::connect(&config).await.unwrap();
        db.create_user(NewUser {
            username: "alice".to_string(),
            email: String::new(),
            password_hash: "x".to_string(),
            role: Role::User,
        })
        .await
        .unwrap();
        drop(db);

        let reopened = SqliteDatabase::connect(&config).await.unwrap();
        let alice = reopened.find_user_by_username("alice").await.unwrap();
        assert_eq!(alice.map(|u| u.role), Some(Role::User));
    }
}
