// Core infrastructure modules
pub mod cache;                 // Bounded LRU cache
pub mod comment_store;         // Store interface shared by all substrates
pub mod memory_store;          // In-process store
pub mod postgres_store;        // PostgreSQL store with ltree paths
pub mod notification;          // Per-post publish/subscribe

// Re-export core infrastructure components
pub use comment_store::CommentStore;
pub use memory_store::InMemoryCommentStore;
pub use postgres_store::{connect_pool, PostgresCommentStore};
pub use notification::{LocalNotificationBus, NotificationBus, PgNotificationBus, Subscription};
