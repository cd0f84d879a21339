// In-process comment store - id-indexed maps guarded by a single writer lock

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::infrastructure::comment_store::CommentStore;
use crate::models::{Comment, CommentId, CommentPath, NewComment, NewPost, Post, PostId};

/// Creation timestamps at the precision TIMESTAMPTZ stores
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[derive(Debug)]
struct MemoryState {
    posts: HashMap<PostId, Post>,
    /// Post ids in creation order
    posts_by_created_at: Vec<PostId>,
    comments: HashMap<CommentId, Comment>,
    /// Root comment ids per post, in creation order
    roots_by_post: HashMap<PostId, Vec<CommentId>>,
    /// Direct reply ids per comment, in creation (ascending id) order
    replies: HashMap<CommentId, Vec<CommentId>>,
    next_post_id: PostId,
    next_comment_id: CommentId,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            posts: HashMap::new(),
            posts_by_created_at: Vec::new(),
            comments: HashMap::new(),
            roots_by_post: HashMap::new(),
            replies: HashMap::new(),
            next_post_id: 1,
            next_comment_id: 1,
        }
    }
}

/// Comment store living entirely in process memory.
///
/// Writes take the lock exclusively, so id allocation, path computation and
/// insertion form one indivisible step; reads share the lock.
#[derive(Debug, Default)]
pub struct InMemoryCommentStore {
    state: RwLock<MemoryState>,
}

impl InMemoryCommentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommentStore for InMemoryCommentStore {
    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let mut state = self.state.write().await;

        let id = state.next_post_id;
        state.next_post_id += 1;

        let post = post.into_post(id, now());
        state.posts.insert(id, post.clone());
        state.posts_by_created_at.push(id);

        debug!("Created post {}", id);
        Ok(post)
    }

    async fn get_all_posts(&self) -> AppResult<Vec<Post>> {
        let state = self.state.read().await;

        Ok(state
            .posts_by_created_at
            .iter()
            .rev()
            .filter_map(|id| state.posts.get(id).cloned())
            .collect())
    }

    async fn get_post_by_id(&self, id: PostId) -> AppResult<Post> {
        let state = self.state.read().await;

        state
            .posts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("post {} not found", id)))
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let mut state = self.state.write().await;

        if !state.posts.contains_key(&comment.post_id) {
            return Err(AppError::NotFound(format!(
                "post {} not found",
                comment.post_id
            )));
        }

        // Resolve the parent before allocating so a failed create never burns an id
        let parent_path = match comment.parent_comment_id {
            Some(parent_id) => match state.comments.get(&parent_id) {
                Some(parent) => Some(parent.path.clone()),
                None => {
                    return Err(AppError::NotFound(format!(
                        "parent comment {} not found",
                        parent_id
                    )))
                }
            },
            None => None,
        };

        let id = state.next_comment_id;
        state.next_comment_id += 1;

        let path = match parent_path {
            Some(parent_path) => parent_path.child(id),
            None => CommentPath::root(id),
        };

        let comment = comment.into_comment(path, now());
        match comment.parent_comment_id {
            Some(parent_id) => state.replies.entry(parent_id).or_default().push(id),
            None => state.roots_by_post.entry(comment.post_id).or_default().push(id),
        }
        state.comments.insert(id, comment.clone());

        debug!("Created comment {} at path {}", id, comment.path);
        Ok(comment)
    }

    async fn get_root_comments(
        &self,
        post_id: PostId,
        limit: u32,
        offset: u32,
    ) -> AppResult<(Vec<Comment>, u64)> {
        let state = self.state.read().await;

        let roots = state
            .roots_by_post
            .get(&post_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let total = roots.len() as u64;

        let page = roots
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|id| state.comments.get(id).cloned())
            .collect();

        Ok((page, total))
    }

    async fn get_subtree(&self, comment_id: CommentId) -> AppResult<Vec<Comment>> {
        let state = self.state.read().await;

        if !state.comments.contains_key(&comment_id) {
            return Err(AppError::NotFound(format!(
                "comment {} not found",
                comment_id
            )));
        }

        // Explicit-stack pre-order walk; children are pushed in reverse so the
        // smallest id is visited first and each branch is exhausted before its sibling.
        let mut result = Vec::new();
        let mut stack: Vec<CommentId> = Vec::new();
        if let Some(children) = state.replies.get(&comment_id) {
            stack.extend(children.iter().rev());
        }

        while let Some(current) = stack.pop() {
            if let Some(comment) = state.comments.get(&current) {
                result.push(comment.clone());
            }
            if let Some(children) = state.replies.get(&current) {
                stack.extend(children.iter().rev());
            }
        }

        Ok(result)
    }
}
