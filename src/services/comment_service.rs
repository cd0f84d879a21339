// CommentService - validation, persistence and best-effort notification
// Persisting a comment and notifying watchers are deliberately not atomic:
// a failed publish is reported but the comment stays stored.

use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    infrastructure::{CommentStore, NotificationBus, Subscription},
    models::{Comment, CommentId, NewComment, Post, PostId, RootCommentPage, MAX_COMMENT_CHARS},
};

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn CommentStore>,
    bus: Arc<dyn NotificationBus>,
}

impl CommentService {
    pub fn new(store: Arc<dyn CommentStore>, bus: Arc<dyn NotificationBus>) -> Self {
        Self { store, bus }
    }

    /// Validate, persist, then publish the stored comment to the post's watchers.
    ///
    /// Returns `Notification` when publishing fails; the comment is already
    /// persisted at that point and is not rolled back.
    pub async fn submit_comment(&self, comment: NewComment) -> AppResult<Comment> {
        validate_comment(&comment)?;

        let post = self.store.get_post_by_id(comment.post_id).await?;
        if !post.are_comments_allowed {
            return Err(AppError::Validation(format!(
                "comments are disabled for post {}",
                post.id
            )));
        }

        let comment = self.store.create_comment(comment).await?;
        info!(
            "Comment {} added to post {} at path {}",
            comment.id, comment.post_id, comment.path
        );

        if let Err(e) = self.bus.publish(comment.post_id, &comment).await {
            warn!("Comment {} stored but not delivered: {}", comment.id, e);
            return Err(AppError::Notification(format!(
                "comment {} was saved but watchers were not notified: {}",
                comment.id, e
            )));
        }

        Ok(comment)
    }

    pub async fn get_post_by_id(&self, id: PostId) -> AppResult<Post> {
        self.store.get_post_by_id(id).await
    }

    /// Oldest-first page of root comments with total and page count
    pub async fn list_root_comments(
        &self,
        post_id: PostId,
        limit: u32,
        offset: u32,
    ) -> AppResult<RootCommentPage> {
        if limit == 0 {
            return Err(AppError::Validation("limit must be at least 1".to_string()));
        }

        let (comments, total) = self.store.get_root_comments(post_id, limit, offset).await?;
        Ok(RootCommentPage::new(comments, total, limit))
    }

    /// Whole reply tree under a comment, flattened in path order
    pub async fn get_replies(&self, comment_id: CommentId) -> AppResult<Vec<Comment>> {
        self.store.get_subtree(comment_id).await
    }

    pub async fn subscribe(&self, post_id: PostId) -> AppResult<Subscription> {
        self.bus.subscribe(post_id).await
    }
}

fn validate_comment(comment: &NewComment) -> AppResult<()> {
    if comment.author.is_empty() {
        return Err(AppError::Validation("author name must not be empty".to_string()));
    }
    if comment.content.is_empty() {
        return Err(AppError::Validation("comment must not be empty".to_string()));
    }
    if comment.content.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "comment must not exceed {} characters",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{InMemoryCommentStore, LocalNotificationBus};
    use crate::models::NewPost;
    use async_trait::async_trait;

    /// Bus whose publish always fails
    struct BrokenBus;

    #[async_trait]
    impl NotificationBus for BrokenBus {
        async fn subscribe(&self, _post_id: PostId) -> AppResult<Subscription> {
            Err(AppError::Notification("bus unavailable".to_string()))
        }

        async fn publish(&self, _post_id: PostId, _comment: &Comment) -> AppResult<()> {
            Err(AppError::Notification("bus unavailable".to_string()))
        }

        async fn close(&self) -> AppResult<()> {
            Ok(())
        }
    }

    async fn setup(
        bus: Arc<dyn NotificationBus>,
        allowed: bool,
    ) -> (CommentService, Arc<InMemoryCommentStore>, Post) {
        let store = Arc::new(InMemoryCommentStore::new());
        let post = store
            .create_post(NewPost {
                title: "Title".to_string(),
                content: "Content".to_string(),
                author: "Author".to_string(),
                are_comments_allowed: allowed,
            })
            .await
            .unwrap();
        (CommentService::new(store.clone(), bus), store, post)
    }

    #[tokio::test]
    async fn test_rejects_empty_author_and_content() {
        let (service, _, post) = setup(Arc::new(LocalNotificationBus::default()), true).await;

        let err = service
            .submit_comment(NewComment::root(post.id, "", "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .submit_comment(NewComment::root(post.id, "Author", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_length_limit_counts_characters() {
        let (service, store, post) = setup(Arc::new(LocalNotificationBus::default()), true).await;

        // 2000 multi-byte characters are within the limit even though they exceed 2000 bytes
        let at_limit = "я".repeat(MAX_COMMENT_CHARS);
        service
            .submit_comment(NewComment::root(post.id, "Author", at_limit))
            .await
            .unwrap();

        let too_long = "a".repeat(MAX_COMMENT_CHARS + 1);
        let err = service
            .submit_comment(NewComment::root(post.id, "Author", too_long))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let (_, total) = store.get_root_comments(post.id, 10, 0).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_comments_disabled() {
        let (service, store, post) = setup(Arc::new(LocalNotificationBus::default()), false).await;

        let err = service
            .submit_comment(NewComment::root(post.id, "Author", "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let (_, total) = store.get_root_comments(post.id, 10, 0).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_missing_post_and_parent() {
        let (service, _, post) = setup(Arc::new(LocalNotificationBus::default()), true).await;

        let err = service
            .submit_comment(NewComment::root(post.id + 1, "Author", "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = service
            .submit_comment(NewComment::reply(post.id, 77, "Author", "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_submitted_comment_reaches_subscriber() {
        let (service, _, post) = setup(Arc::new(LocalNotificationBus::default()), true).await;
        let mut subscription = service.subscribe(post.id).await.unwrap();

        let created = service
            .submit_comment(NewComment::root(post.id, "Author", "hello"))
            .await
            .unwrap();

        assert_eq!(subscription.recv().await, Some(created));
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_comment() {
        let (service, store, post) = setup(Arc::new(BrokenBus), true).await;

        let err = service
            .submit_comment(NewComment::root(post.id, "Author", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Notification(_)));

        let (comments, total) = store.get_root_comments(post.id, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(comments[0].content, "hello");
    }

    #[tokio::test]
    async fn test_root_page_counts_pages() {
        let (service, _, post) = setup(Arc::new(LocalNotificationBus::default()), true).await;
        for i in 0..5 {
            service
                .submit_comment(NewComment::root(post.id, "Author", format!("c{}", i)))
                .await
                .unwrap();
        }

        let page = service.list_root_comments(post.id, 2, 1).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        let contents: Vec<&str> = page.comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["c1", "c2"]);

        assert!(matches!(
            service.list_root_comments(post.id, 0, 0).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_replies_follow_thread_order() {
        let (service, _, post) = setup(Arc::new(LocalNotificationBus::default()), true).await;
        let a = service
            .submit_comment(NewComment::root(post.id, "u", "A"))
            .await
            .unwrap();
        let b = service
            .submit_comment(NewComment::reply(post.id, a.id, "u", "B"))
            .await
            .unwrap();
        let c = service
            .submit_comment(NewComment::reply(post.id, b.id, "u", "C"))
            .await
            .unwrap();
        let d = service
            .submit_comment(NewComment::reply(post.id, a.id, "u", "D"))
            .await
            .unwrap();

        let replies = service.get_replies(a.id).await.unwrap();
        assert_eq!(replies, vec![b, c, d]);
    }
}
