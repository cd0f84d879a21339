use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    config::{Config, StorageType},
    error::{AppError, AppResult},
    infrastructure::{
        connect_pool, CommentStore, InMemoryCommentStore, LocalNotificationBus, NotificationBus,
        PgNotificationBus, PostgresCommentStore,
    },
    services::{CommentService, PostService},
};

#[derive(Clone)]
pub struct AppState {
    pub posts: PostService,
    pub comments: CommentService,
    pub store: Arc<dyn CommentStore>,
    pub bus: Arc<dyn NotificationBus>,
    pub config: Config,
    pool: Option<sqlx::PgPool>,
}

impl AppState {
    /// Wire store and bus for the configured substrate
    pub async fn new(config: Config) -> AppResult<Self> {
        match config.storage {
            StorageType::Memory => {
                info!("Using in-memory storage");
                Ok(Self::in_memory(config))
            }
            StorageType::Postgres => {
                let url = config.database.url.clone().ok_or_else(|| {
                    AppError::ConfigurationError("database url is not configured".to_string())
                })?;

                let pool = connect_pool(&config.database).await?;
                let store = PostgresCommentStore::new(pool.clone(), config.cache.post_capacity);
                store.initialize().await?;
                let bus = PgNotificationBus::new(pool.clone(), url, &config.notifications);

                info!("Using postgres storage");
                let mut state = Self::with_backends(config, Arc::new(store), Arc::new(bus));
                state.pool = Some(pool);
                Ok(state)
            }
        }
    }

    pub fn in_memory(config: Config) -> Self {
        let bus = LocalNotificationBus::new(&config.notifications);
        Self::with_backends(config, Arc::new(InMemoryCommentStore::new()), Arc::new(bus))
    }

    pub fn with_backends(
        config: Config,
        store: Arc<dyn CommentStore>,
        bus: Arc<dyn NotificationBus>,
    ) -> Self {
        Self {
            posts: PostService::new(store.clone()),
            comments: CommentService::new(store.clone(), bus.clone()),
            store,
            bus,
            config,
            pool: None,
        }
    }

    /// End every live subscription, bounded by the configured shutdown timeout
    pub async fn close_subscriptions(&self) {
        match tokio::time::timeout(self.config.shutdown_timeout(), self.bus.close()).await {
            Ok(Ok(())) => info!("Subscriptions closed"),
            Ok(Err(e)) => warn!("Failed to close notification bus: {}", e),
            Err(_) => warn!(
                "Notification bus did not close within {:?}",
                self.config.shutdown_timeout()
            ),
        }
    }

    /// Release database connections once no request can use them any more
    pub async fn close_database(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            info!("Database pool closed");
        }
    }
}
