// Core types and primitives
pub mod comment_path;

pub use comment_path::{CommentId, CommentPath};
