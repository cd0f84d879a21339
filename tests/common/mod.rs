// Shared fixtures for the integration suites
#![allow(dead_code)]

use std::sync::Arc;

use threaded_discussion::{
    config::{Config, DatabaseConfig},
    infrastructure::{connect_pool, CommentStore, InMemoryCommentStore, PostgresCommentStore},
    models::{NewPost, Post},
};

/// Postgres suites only run when this points at a disposable database with ltree available
pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

pub fn test_database_url() -> Option<String> {
    std::env::var(TEST_DATABASE_URL).ok().filter(|url| !url.is_empty())
}

pub fn memory_config() -> Config {
    Config::from_lookup(|key| match key {
        "STORAGE_TYPE" => Some("memory".to_string()),
        "SHUTDOWN_TIMEOUT_SECS" => Some("1".to_string()),
        _ => None,
    })
    .unwrap()
}

pub fn memory_store() -> Arc<dyn CommentStore> {
    Arc::new(InMemoryCommentStore::new())
}

pub async fn postgres_store(url: &str) -> Arc<dyn CommentStore> {
    let pool = connect_pool(&DatabaseConfig {
        url: Some(url.to_string()),
        max_connections: 5,
        min_connections: 1,
        acquire_timeout_secs: 5,
    })
    .await
    .unwrap();

    let store = PostgresCommentStore::new(pool, 16);
    // Suites run in parallel and may race on creating the schema; the loser retries
    if store.initialize().await.is_err() {
        store.initialize().await.unwrap();
    }
    Arc::new(store)
}

pub fn new_post(title: &str, are_comments_allowed: bool) -> NewPost {
    NewPost {
        title: title.to_string(),
        content: format!("{} body", title),
        author: "dasha".to_string(),
        are_comments_allowed,
    }
}

pub async fn fresh_post(store: &Arc<dyn CommentStore>) -> Post {
    store.create_post(new_post("Thread", true)).await.unwrap()
}
