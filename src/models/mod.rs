// Discussion records - posts and their threaded comments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::core::{CommentId, CommentPath};

pub type PostId = i64;

/// Maximum comment length, counted in characters
pub const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub author: String,
    pub are_comments_allowed: bool,
    pub created_at: DateTime<Utc>,
}

/// Post fields supplied by the caller; id and timestamp are assigned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author: String,
    #[serde(default)]
    pub are_comments_allowed: bool,
}

impl NewPost {
    pub fn into_post(self, id: PostId, created_at: DateTime<Utc>) -> Post {
        Post {
            id,
            title: self.title,
            content: self.content,
            author: self.author,
            are_comments_allowed: self.are_comments_allowed,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<CommentId>,
    pub path: CommentPath,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_comment_id.is_none()
    }

    pub fn depth(&self) -> usize {
        self.path.depth()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: PostId,
    #[serde(default)]
    pub parent_comment_id: Option<CommentId>,
    pub author: String,
    pub content: String,
}

impl NewComment {
    pub fn root(post_id: PostId, author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            post_id,
            parent_comment_id: None,
            author: author.into(),
            content: content.into(),
        }
    }

    pub fn reply(
        post_id: PostId,
        parent_comment_id: CommentId,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            post_id,
            parent_comment_id: Some(parent_comment_id),
            author: author.into(),
            content: content.into(),
        }
    }

    /// Build the stored record once the store has allocated id, path and timestamp
    pub fn into_comment(self, path: CommentPath, created_at: DateTime<Utc>) -> Comment {
        Comment {
            id: path.id(),
            post_id: self.post_id,
            parent_comment_id: self.parent_comment_id,
            path,
            author: self.author,
            content: self.content,
            created_at,
        }
    }
}

/// One page of root comments plus what a client needs to render pagination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCommentPage {
    pub comments: Vec<Comment>,
    pub total: u64,
    pub total_pages: u64,
}

impl RootCommentPage {
    pub fn new(comments: Vec<Comment>, total: u64, limit: u32) -> Self {
        let limit = u64::from(limit.max(1));
        Self {
            comments,
            total,
            total_pages: total.div_ceil(limit),
        }
    }
}
