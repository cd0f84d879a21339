// Comment store interface - posts plus the materialized-path comment tree
// Both the in-process and the PostgreSQL substrate implement this contract

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{Comment, CommentId, NewComment, NewPost, Post, PostId};

/// Storage contract shared by every backing substrate.
///
/// Implementations own id allocation, timestamps and path computation.
/// Observable ordering, pagination and error kinds are identical across substrates:
/// * posts list newest first
/// * root comments list oldest first
/// * subtrees list in ascending numeric path order (pre-order, siblings by id)
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Fails with `Persistence` when the backing substrate cannot be reached
    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }

    /// Assign id and creation time, persist, and return the stored post
    async fn create_post(&self, post: NewPost) -> AppResult<Post>;

    /// All posts ordered by creation time, newest first
    async fn get_all_posts(&self) -> AppResult<Vec<Post>>;

    /// Fails with `NotFound` when the id is unknown
    async fn get_post_by_id(&self, id: PostId) -> AppResult<Post>;

    /// Persist a comment atomically with its id and path.
    ///
    /// Fails with `NotFound` when the post does not exist, or when a parent id is
    /// given that does not resolve to a comment. The parent is not required to
    /// belong to the same post.
    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment>;

    /// A page of the post's root comments, oldest first, with the total root count.
    /// An offset past the end yields an empty page.
    async fn get_root_comments(
        &self,
        post_id: PostId,
        limit: u32,
        offset: u32,
    ) -> AppResult<(Vec<Comment>, u64)>;

    /// Every descendant of the comment, excluding the comment itself, flattened in
    /// ascending numeric path order. Fails with `NotFound` for an unknown id.
    async fn get_subtree(&self, comment_id: CommentId) -> AppResult<Vec<Comment>>;
}
