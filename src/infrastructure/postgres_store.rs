// PostgreSQL comment store - materialized paths stored as ltree
// Descendant lookups go through the GiST-indexed containment operator (<@)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::cache::Cache;
use crate::infrastructure::comment_store::CommentStore;
use crate::models::{Comment, CommentId, CommentPath, NewComment, NewPost, Post, PostId};

const POST_COLUMNS: &str = "id, title, content, author, are_comments_allowed, created_at";

const COMMENT_COLUMNS: &str =
    "c.id, c.post_id, c.parent_comment_id, c.path::text AS path, c.author, c.content, c.created_at";

/// Open a connection pool sized from configuration
pub async fn connect_pool(config: &DatabaseConfig) -> AppResult<PgPool> {
    let url = config.url.as_deref().ok_or_else(|| {
        AppError::ConfigurationError("database url is required for postgres storage".to_string())
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(600)) // 10 minutes idle timeout
        .max_lifetime(Duration::from_secs(1800)) // 30 minutes max connection lifetime
        .test_before_acquire(true)
        .connect(url)
        .await
        .map_err(|e| AppError::Persistence(format!("Failed to connect to database: {}", e)))?;

    info!(
        "Database pool ready (max {}, min {}, acquire timeout {}s)",
        config.max_connections, config.min_connections, config.acquire_timeout_secs
    );
    Ok(pool)
}

/// PostgreSQL implementation of the comment store.
///
/// Posts never change once written, so lookups by id are served from an LRU
/// cache in front of the pool.
pub struct PostgresCommentStore {
    pool: PgPool,
    post_cache: Mutex<Cache<PostId, Post>>,
}

impl PostgresCommentStore {
    pub fn new(pool: PgPool, post_cache_capacity: usize) -> Self {
        Self {
            pool,
            post_cache: Mutex::new(Cache::new(post_cache_capacity)),
        }
    }

    /// Create the ltree extension, tables and indexes if they are missing
    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS ltree")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to enable ltree: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id BIGSERIAL PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                author TEXT NOT NULL,
                are_comments_allowed BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(format!("Failed to create posts table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id BIGSERIAL PRIMARY KEY,
                post_id BIGINT NOT NULL REFERENCES posts(id),
                parent_comment_id BIGINT REFERENCES comments(id),
                path LTREE NOT NULL,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(format!("Failed to create comments table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_path ON comments USING GIST (path)")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::Persistence(format!("Failed to create comments path index: {}", e))
            })?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_comments_post_roots ON comments(post_id, created_at) WHERE parent_comment_id IS NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::Persistence(format!("Failed to create root comments index: {}", e))
        })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::Persistence(format!("Failed to create posts created_at index: {}", e))
            })?;

        info!("Discussion tables initialized (ltree paths, GiST path index)");
        Ok(())
    }
}

fn post_from_row(row: &PgRow) -> AppResult<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        author: row.try_get("author")?,
        are_comments_allowed: row.try_get("are_comments_allowed")?,
        created_at: row.try_get("created_at")?,
    })
}

fn comment_from_row(row: &PgRow) -> AppResult<Comment> {
    let raw_path: String = row.try_get("path")?;
    let path: CommentPath = raw_path.parse().map_err(|e| {
        AppError::Persistence(format!("Stored comment path '{}' is corrupt: {}", raw_path, e))
    })?;

    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        parent_comment_id: row.try_get("parent_comment_id")?,
        path,
        author: row.try_get("author")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl CommentStore for PostgresCommentStore {
    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(format!("Database unreachable: {}", e)))?;
        Ok(())
    }

    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let row = sqlx::query(
            "INSERT INTO posts (title, content, author, are_comments_allowed) VALUES ($1, $2, $3, $4) RETURNING id, created_at",
        )
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.author)
        .bind(post.are_comments_allowed)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(format!("Failed to create post: {}", e)))?;

        let id: PostId = row.try_get("id")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let post = post.into_post(id, created_at);

        self.post_cache.lock().await.insert(id, post.clone());
        debug!("Created post {}", id);
        Ok(post)
    }

    async fn get_all_posts(&self) -> AppResult<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts ORDER BY created_at DESC, id DESC",
            POST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(format!("Failed to list posts: {}", e)))?;

        rows.iter().map(post_from_row).collect()
    }

    async fn get_post_by_id(&self, id: PostId) -> AppResult<Post> {
        if let Some(post) = self.post_cache.lock().await.get(&id) {
            return Ok(post);
        }

        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to get post {}: {}", id, e)))?;

        match row {
            Some(row) => {
                let post = post_from_row(&row)?;
                self.post_cache.lock().await.insert(id, post.clone());
                Ok(post)
            }
            None => Err(AppError::NotFound(format!("post {} not found", id))),
        }
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        // Everything below runs in one transaction; an early return rolls it back on drop
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to begin transaction: {}", e)))?;

        let post_exists = sqlx::query("SELECT 1 FROM posts WHERE id = $1")
            .bind(comment.post_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                AppError::Persistence(format!("Failed to check post {}: {}", comment.post_id, e))
            })?
            .is_some();
        if !post_exists {
            return Err(AppError::NotFound(format!(
                "post {} not found",
                comment.post_id
            )));
        }

        let parent_path = match comment.parent_comment_id {
            Some(parent_id) => {
                let raw: Option<String> =
                    sqlx::query_scalar("SELECT path::text FROM comments WHERE id = $1")
                        .bind(parent_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| {
                            AppError::Persistence(format!(
                                "Failed to load parent comment {}: {}",
                                parent_id, e
                            ))
                        })?;
                match raw {
                    Some(raw) => Some(raw.parse::<CommentPath>().map_err(|e| {
                        AppError::Persistence(format!(
                            "Stored comment path '{}' is corrupt: {}",
                            raw, e
                        ))
                    })?),
                    None => {
                        return Err(AppError::NotFound(format!(
                            "parent comment {} not found",
                            parent_id
                        )))
                    }
                }
            }
            None => None,
        };

        // Reserve the id first so the full path can be written in the same insert
        let id: CommentId =
            sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('comments', 'id'))")
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::Persistence(format!("Failed to allocate comment id: {}", e))
                })?;

        let path = match parent_path {
            Some(parent_path) => parent_path.child(id),
            None => CommentPath::root(id),
        };

        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO comments (id, post_id, parent_comment_id, path, author, content)
            VALUES ($1, $2, $3, text2ltree($4), $5, $6)
            RETURNING created_at
        "#,
        )
        .bind(id)
        .bind(comment.post_id)
        .bind(comment.parent_comment_id)
        .bind(path.to_string())
        .bind(&comment.author)
        .bind(&comment.content)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::Persistence(format!("Failed to insert comment {}: {}", id, e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to commit transaction: {}", e)))?;

        debug!("Created comment {} at path {}", id, path);
        Ok(comment.into_comment(path, created_at))
    }

    async fn get_root_comments(
        &self,
        post_id: PostId,
        limit: u32,
        offset: u32,
    ) -> AppResult<(Vec<Comment>, u64)> {
        // Page and total come from one snapshot so a concurrent insert cannot split them
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::Persistence(format!("Failed to set snapshot isolation: {}", e))
            })?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM comments AS c
            WHERE c.post_id = $1 AND c.parent_comment_id IS NULL
            ORDER BY c.created_at ASC, c.id ASC
            LIMIT $2 OFFSET $3
        "#,
            COMMENT_COLUMNS
        ))
        .bind(post_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            AppError::Persistence(format!(
                "Failed to get root comments for post {}: {}",
                post_id, e
            ))
        })?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE post_id = $1 AND parent_comment_id IS NULL",
        )
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::Persistence(format!(
                "Failed to count root comments for post {}: {}",
                post_id, e
            ))
        })?;

        tx.commit()
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to commit transaction: {}", e)))?;

        let comments = rows.iter().map(comment_from_row).collect::<AppResult<Vec<_>>>()?;
        Ok((comments, total.max(0) as u64))
    }

    async fn get_subtree(&self, comment_id: CommentId) -> AppResult<Vec<Comment>> {
        // ltree orders labels as text ("10" < "9"), so sort on the numeric segments instead
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM comments AS ancestor
            JOIN comments AS c ON c.path <@ ancestor.path AND c.id <> ancestor.id
            WHERE ancestor.id = $1
            ORDER BY string_to_array(c.path::text, '.')::bigint[]
        "#,
            COMMENT_COLUMNS
        ))
        .bind(comment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::Persistence(format!(
                "Failed to get replies of comment {}: {}",
                comment_id, e
            ))
        })?;

        if rows.is_empty() {
            let exists = sqlx::query("SELECT 1 FROM comments WHERE id = $1")
                .bind(comment_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::Persistence(format!(
                        "Failed to check comment {}: {}",
                        comment_id, e
                    ))
                })?
                .is_some();
            if !exists {
                return Err(AppError::NotFound(format!(
                    "comment {} not found",
                    comment_id
                )));
            }
        }

        rows.iter().map(comment_from_row).collect()
    }
}
