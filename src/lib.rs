// Threaded Discussion - posts, materialized-path comment threads and live notifications

// Core types and primitives
pub mod core;

// Posts, comments and page records
pub mod models;

// Storage, caching and notification infrastructure
pub mod infrastructure;

// Validation and orchestration on top of the infrastructure
pub mod services;

// HTTP surface
pub mod app_state;
pub mod discussion_interface;

// Common utilities
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
