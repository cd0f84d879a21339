// In-process fan-out bus
// Registry of per-post subscribers behind a read/write lock; every publish spawns
// one tracked delivery task per subscriber so a stalled reader cannot block anyone.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::error::AppResult;
use crate::infrastructure::notification::{NotificationBus, Subscription};
use crate::models::{Comment, PostId};

#[derive(Debug, Clone)]
struct Subscriber {
    sender: mpsc::Sender<Comment>,
    cancel: CancellationToken,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.sender.is_closed()
    }
}

/// Local fan-out substrate, owned by whoever constructs it.
#[derive(Debug)]
pub struct LocalNotificationBus {
    subscribers: RwLock<HashMap<PostId, Vec<Subscriber>>>,
    dispatches: TaskTracker,
    shutdown: CancellationToken,
    buffer: usize,
    delivery_timeout: Duration,
}

impl Default for LocalNotificationBus {
    fn default() -> Self {
        Self::new(&NotificationConfig::default())
    }
}

impl LocalNotificationBus {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            dispatches: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            buffer: config.subscriber_buffer.max(1),
            delivery_timeout: config.delivery_timeout(),
        }
    }

    /// Number of live subscriptions for a post
    pub async fn subscriber_count(&self, post_id: PostId) -> usize {
        self.subscribers
            .read()
            .await
            .get(&post_id)
            .map(|subs| subs.iter().filter(|s| s.is_live()).count())
            .unwrap_or(0)
    }

    /// Delivery tasks still in flight
    pub fn pending_dispatches(&self) -> usize {
        self.dispatches.len()
    }
}

async fn deliver(subscriber: Subscriber, comment: Comment, timeout: Duration) {
    let comment_id = comment.id;

    tokio::select! {
        biased;
        _ = subscriber.cancel.cancelled() => {
            debug!("Subscription cancelled before comment {} was delivered", comment_id);
        }
        result = tokio::time::timeout(timeout, subscriber.sender.send(comment)) => match result {
            Ok(Ok(())) => debug!("Delivered comment {}", comment_id),
            Ok(Err(_)) => debug!("Subscriber gone, comment {} dropped", comment_id),
            Err(_) => warn!(
                "Subscriber did not accept comment {} within {:?}, dropping it",
                comment_id, timeout
            ),
        },
    }
}

/// Drop dead handles everywhere and forget posts nobody watches any more
fn prune(subscribers: &mut HashMap<PostId, Vec<Subscriber>>) {
    subscribers.retain(|_, subs| {
        subs.retain(Subscriber::is_live);
        !subs.is_empty()
    });
}

#[async_trait]
impl NotificationBus for LocalNotificationBus {
    async fn subscribe(&self, post_id: PostId) -> AppResult<Subscription> {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let cancel = self.shutdown.child_token();

        let mut subscribers = self.subscribers.write().await;
        // Checked under the lock so a concurrent close cannot miss this subscriber
        if self.shutdown.is_cancelled() {
            debug!("Bus closed, subscription to post {} ends immediately", post_id);
            return Ok(Subscription::new(post_id, receiver, cancel));
        }

        prune(&mut subscribers);
        let entry = subscribers.entry(post_id).or_default();
        entry.push(Subscriber {
            sender,
            cancel: cancel.clone(),
        });

        debug!(
            "New subscription to post {} ({} active)",
            post_id,
            entry.len()
        );
        Ok(Subscription::new(post_id, receiver, cancel))
    }

    async fn publish(&self, post_id: PostId, comment: &Comment) -> AppResult<()> {
        let (delivered, stale) = {
            let subscribers = self.subscribers.read().await;
            // Spawned under the lock: close() cannot clear the registry until these
            // tasks are on the tracker it joins.
            if self.shutdown.is_cancelled() {
                return Ok(());
            }

            let Some(subs) = subscribers.get(&post_id) else {
                return Ok(());
            };

            let mut delivered = 0;
            for subscriber in subs.iter().filter(|s| s.is_live()) {
                self.dispatches.spawn(deliver(
                    subscriber.clone(),
                    comment.clone(),
                    self.delivery_timeout,
                ));
                delivered += 1;
            }
            (delivered, subs.len() - delivered)
        };

        if stale > 0 {
            let mut subscribers = self.subscribers.write().await;
            if let Some(subs) = subscribers.get_mut(&post_id) {
                subs.retain(Subscriber::is_live);
                if subs.is_empty() {
                    subscribers.remove(&post_id);
                }
            }
            debug!("Pruned {} closed subscription(s) of post {}", stale, post_id);
        }

        debug!(
            "Published comment {} to {} subscriber(s) of post {}",
            comment.id, delivered, post_id
        );
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        self.shutdown.cancel();

        let terminated: usize = {
            let mut subscribers = self.subscribers.write().await;
            let count = subscribers.values().map(Vec::len).sum();
            subscribers.clear();
            count
        };

        // Every sender clone lives in the registry or a dispatch task; once both are
        // gone each receiver observes end of stream.
        self.dispatches.close();
        self.dispatches.wait().await;

        if terminated > 0 {
            info!("Notification bus closed, {} subscription(s) terminated", terminated);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentPath, NewComment};
    use chrono::Utc;

    fn comment(post_id: PostId, id: i64) -> Comment {
        NewComment::root(post_id, "sasha", "new comment")
            .into_comment(CommentPath::root(id), Utc::now())
    }

    fn fast_bus() -> LocalNotificationBus {
        LocalNotificationBus::new(&NotificationConfig {
            subscriber_buffer: 1,
            delivery_timeout_ms: 50,
        })
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let bus = LocalNotificationBus::default();
        let mut subscription = bus.subscribe(1).await.unwrap();

        let sent = comment(1, 1);
        bus.publish(1, &sent).await.unwrap();

        assert_eq!(subscription.recv().await, Some(sent));
    }

    #[tokio::test]
    async fn test_many_subscribers_receive_same_comment() {
        let bus = LocalNotificationBus::default();
        let mut first = bus.subscribe(1).await.unwrap();
        let mut second = bus.subscribe(1).await.unwrap();

        let sent = comment(1, 3);
        bus.publish(1, &sent).await.unwrap();

        assert_eq!(first.recv().await, Some(sent.clone()));
        assert_eq!(second.recv().await, Some(sent));
    }

    #[tokio::test]
    async fn test_posts_are_isolated() {
        let bus = LocalNotificationBus::default();
        let mut one = bus.subscribe(1).await.unwrap();
        let mut two = bus.subscribe(2).await.unwrap();

        bus.publish(1, &comment(1, 1)).await.unwrap();
        bus.publish(2, &comment(2, 2)).await.unwrap();

        assert_eq!(one.recv().await.map(|c| c.id), Some(1));
        assert_eq!(two.recv().await.map(|c| c.id), Some(2));

        bus.close().await.unwrap();
        assert_eq!(one.recv().await, None);
        assert_eq!(two.recv().await, None);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = LocalNotificationBus::default();
        bus.publish(42, &comment(42, 1)).await.unwrap();
        assert_eq!(bus.pending_dispatches(), 0);
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscriber() {
        let bus = LocalNotificationBus::default();
        bus.publish(1, &comment(1, 1)).await.unwrap();

        let mut late = bus.subscribe(1).await.unwrap();
        bus.close().await.unwrap();
        assert_eq!(late.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_ends_every_stream_and_is_idempotent() {
        let bus = LocalNotificationBus::default();
        let mut first = bus.subscribe(1).await.unwrap();
        let mut second = bus.subscribe(5).await.unwrap();

        bus.close().await.unwrap();
        bus.close().await.unwrap();

        assert_eq!(first.recv().await, None);
        assert_eq!(second.recv().await, None);
        assert_eq!(bus.subscriber_count(1).await, 0);

        // Nothing to deliver to once closed
        bus.publish(1, &comment(1, 9)).await.unwrap();
        let mut after = bus.subscribe(1).await.unwrap();
        assert!(after.is_closed());
        assert_eq!(after.recv().await, None);
    }

    #[tokio::test]
    async fn test_stalled_subscriber_does_not_block_others() {
        let bus = fast_bus();
        let _stalled = bus.subscribe(1).await.unwrap();
        let mut active = bus.subscribe(1).await.unwrap();

        // The stalled handle never reads; its single buffer slot fills up
        for id in 1..=3 {
            bus.publish(1, &comment(1, id)).await.unwrap();
            assert_eq!(active.recv().await.map(|c| c.id), Some(id));
        }

        // Close waits for the timed-out deliveries and returns promptly
        tokio::time::timeout(Duration::from_secs(2), bus.close())
            .await
            .expect("close should not hang on a stalled subscriber")
            .unwrap();
        assert_eq!(bus.pending_dispatches(), 0);
    }

    #[tokio::test]
    async fn test_closed_handle_is_skipped_and_pruned() {
        let bus = LocalNotificationBus::default();
        let mut gone = bus.subscribe(1).await.unwrap();
        let dropped = bus.subscribe(1).await.unwrap();
        let mut kept = bus.subscribe(1).await.unwrap();

        gone.close();
        drop(dropped);
        assert_eq!(bus.subscriber_count(1).await, 1);

        bus.publish(1, &comment(1, 1)).await.unwrap();
        assert_eq!(kept.recv().await.map(|c| c.id), Some(1));
        assert_eq!(gone.recv().await, None);

        let _fresh = bus.subscribe(1).await.unwrap();
        assert_eq!(bus.subscribers.read().await.get(&1).map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_registry_shrinks_after_dropped_handles() {
        let bus = LocalNotificationBus::default();

        for _ in 0..100 {
            drop(bus.subscribe(1).await.unwrap());
        }
        for id in 1..=10 {
            bus.publish(1, &comment(1, id)).await.unwrap();
        }
        assert!(bus.subscribers.read().await.get(&1).is_none());

        for post_id in 2..=1001 {
            drop(bus.subscribe(post_id).await.unwrap());
        }
        let mut last = bus.subscribe(5000).await.unwrap();
        assert_eq!(bus.subscribers.read().await.len(), 1);

        bus.publish(5000, &comment(5000, 1)).await.unwrap();
        assert_eq!(last.recv().await.map(|c| c.id), Some(1));
    }

    #[tokio::test]
    async fn test_publish_after_close_spawns_nothing() {
        let bus = LocalNotificationBus::default();
        let mut subscription = bus.subscribe(1).await.unwrap();

        bus.close().await.unwrap();
        bus.publish(1, &comment(1, 1)).await.unwrap();

        assert_eq!(bus.pending_dispatches(), 0);
        assert_eq!(subscription.recv().await, None);
    }
}
