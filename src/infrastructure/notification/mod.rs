// Per-post publish/subscribe for newly created comments
// Two substrates: in-process fan-out and PostgreSQL LISTEN/NOTIFY

pub mod local;
pub mod postgres;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::models::{Comment, PostId};

pub use local::LocalNotificationBus;
pub use postgres::PgNotificationBus;

/// Live delivery of new comments to watchers of a post.
///
/// Delivery is best-effort and at-most-once: nothing published before a
/// subscription exists is replayed, and a subscriber that is gone or stalled
/// simply misses the event.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// Open a handle receiving every comment published for `post_id` from now on
    async fn subscribe(&self, post_id: PostId) -> AppResult<Subscription>;

    /// Deliver `comment` to every current subscriber of `post_id`.
    /// Having no subscribers is not an error.
    async fn publish(&self, post_id: PostId, comment: &Comment) -> AppResult<()>;

    /// End every open subscription and forget all subscribers. Idempotent.
    async fn close(&self) -> AppResult<()>;
}

/// Receiving end of a subscription.
///
/// Yields `None` once the handle is closed, the bus is closed, or the
/// underlying listener stops. Dropping the handle cancels it.
#[derive(Debug)]
pub struct Subscription {
    post_id: PostId,
    receiver: mpsc::Receiver<Comment>,
    cancel: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(
        post_id: PostId,
        receiver: mpsc::Receiver<Comment>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            post_id,
            receiver,
            cancel,
        }
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    /// Next published comment, or `None` at end of stream
    pub async fn recv(&mut self) -> Option<Comment> {
        self.receiver.recv().await
    }

    /// Stop receiving; comments already buffered can still be drained
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.receiver.close();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for Subscription {
    type Item = Comment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Comment>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
