// PostService - validated access to the post registry

use std::sync::Arc;
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    infrastructure::CommentStore,
    models::{NewPost, Post, PostId},
};

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn CommentStore>,
}

impl PostService {
    pub fn new(store: Arc<dyn CommentStore>) -> Self {
        Self { store }
    }

    pub async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        if post.title.is_empty() {
            return Err(AppError::Validation("post title must not be empty".to_string()));
        }
        if post.content.is_empty() {
            return Err(AppError::Validation("post content must not be empty".to_string()));
        }
        if post.author.is_empty() {
            return Err(AppError::Validation("author name must not be empty".to_string()));
        }

        let post = self.store.create_post(post).await?;
        info!("Post {} created by {}", post.id, post.author);
        Ok(post)
    }

    /// Newest first
    pub async fn get_all_posts(&self) -> AppResult<Vec<Post>> {
        self.store.get_all_posts().await
    }

    pub async fn get_post_by_id(&self, id: PostId) -> AppResult<Post> {
        self.store.get_post_by_id(id).await
    }
}
