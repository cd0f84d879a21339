// PostgreSQL LISTEN/NOTIFY bus
// One channel per post ("post_<id>"), JSON-encoded comment as the payload.
// Every subscription owns a dedicated listening connection, released when the
// subscription is cancelled or the bus is closed.

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::NotificationConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::notification::{NotificationBus, Subscription};
use crate::models::{Comment, PostId};

/// Notify channel carrying new comments for one post
pub fn channel_name(post_id: PostId) -> String {
    format!("post_{}", post_id)
}

pub struct PgNotificationBus {
    pool: PgPool,
    database_url: String,
    listeners: TaskTracker,
    shutdown: CancellationToken,
    buffer: usize,
}

impl PgNotificationBus {
    /// `database_url` is used to open one dedicated connection per subscription,
    /// outside the shared pool that serves NOTIFY.
    pub fn new(pool: PgPool, database_url: impl Into<String>, config: &NotificationConfig) -> Self {
        Self {
            pool,
            database_url: database_url.into(),
            listeners: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            buffer: config.subscriber_buffer.max(1),
        }
    }

    /// Listening connections still open
    pub fn active_listeners(&self) -> usize {
        self.listeners.len()
    }
}

async fn listen_loop(
    mut listener: PgListener,
    sender: mpsc::Sender<Comment>,
    cancel: CancellationToken,
    post_id: PostId,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            notification = listener.recv() => match notification {
                Ok(notification) => match serde_json::from_str::<Comment>(notification.payload()) {
                    Ok(comment) => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            sent = sender.send(comment) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => warn!(
                        "Skipping undecodable notification on {}: {}",
                        notification.channel(),
                        e
                    ),
                },
                Err(e) => {
                    error!("Listener for post {} failed: {}", post_id, e);
                    break;
                }
            },
        }
    }

    if let Err(e) = listener.unlisten_all().await {
        debug!("UNLISTEN for post {} failed during teardown: {}", post_id, e);
    }
    debug!("Listener for post {} stopped", post_id);
}

#[async_trait]
impl NotificationBus for PgNotificationBus {
    async fn subscribe(&self, post_id: PostId) -> AppResult<Subscription> {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let cancel = self.shutdown.child_token();

        if self.shutdown.is_cancelled() {
            debug!("Bus closed, subscription to post {} ends immediately", post_id);
            return Ok(Subscription::new(post_id, receiver, cancel));
        }

        let channel = channel_name(post_id);
        let mut listener = PgListener::connect(&self.database_url).await.map_err(|e| {
            AppError::Notification(format!("Failed to open listening connection: {}", e))
        })?;
        // LISTEN is in place before the handle is returned, so nothing published
        // after subscribe() returns can be missed.
        listener.listen(&channel).await.map_err(|e| {
            AppError::Notification(format!("Failed to LISTEN on {}: {}", channel, e))
        })?;

        self.listeners
            .spawn(listen_loop(listener, sender, cancel.clone(), post_id));

        debug!("Listening on {}", channel);
        Ok(Subscription::new(post_id, receiver, cancel))
    }

    async fn publish(&self, post_id: PostId, comment: &Comment) -> AppResult<()> {
        let payload = serde_json::to_string(comment)?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel_name(post_id))
            .bind(&payload)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::Notification(format!(
                    "Failed to notify {}: {}",
                    channel_name(post_id),
                    e
                ))
            })?;

        debug!("Notified {} of comment {}", channel_name(post_id), comment.id);
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.shutdown.cancel();
        self.listeners.close();

        let open = self.listeners.len();
        self.listeners.wait().await;

        if open > 0 {
            info!("Notification bus closed, {} listener(s) released", open);
        }
        Ok(())
    }
}
