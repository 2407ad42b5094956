//! Change notifications for downstream consumers.
//!
//! Delivery is at-least-once: every committed update leaves a row in the
//! change outbox, the service publishes inline, and [`OutboxRelay`] redelivers
//! whatever was not acknowledged. Consumers may see the same id twice.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::{debug, info, warn};

use crate::error::{with_deadline, UserError, UserResult};
use crate::users::repo::UserStore;

#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Appends `user_id` to the tail of the change queue.
    async fn publish(&self, user_id: i64) -> UserResult<()>;
}

/// Pushes ids onto a Redis list named after the topic.
#[derive(Clone)]
pub struct RedisNotifier {
    conn: ConnectionManager,
    topic: String,
    timeout: Duration,
}

impl RedisNotifier {
    pub async fn connect(redis_url: &str, topic: &str, timeout: Duration) -> anyhow::Result<Self> {
        info!(topic, "connecting to redis");
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            topic: topic.to_owned(),
            timeout,
        })
    }
}

#[async_trait]
impl ChangeNotifier for RedisNotifier {
    async fn publish(&self, user_id: i64) -> UserResult<()> {
        let mut conn = self.conn.clone();
        with_deadline(self.timeout, "publish change", async {
            let depth = conn
                .rpush::<_, _, i64>(&self.topic, user_id)
                .await
                .map_err(UserError::Notification)?;
            debug!(user_id, topic = %self.topic, depth, "change published");
            Ok(())
        })
        .await
    }
}

/// Redelivers change events that were committed but never acknowledged.
#[derive(Clone)]
pub struct OutboxRelay {
    store: Arc<dyn UserStore>,
    notifier: Arc<dyn ChangeNotifier>,
    batch_size: i64,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn UserStore>, notifier: Arc<dyn ChangeNotifier>, batch_size: i64) -> Self {
        Self {
            store,
            notifier,
            batch_size,
        }
    }

    /// Publishes one batch in event order and returns how many were delivered.
    /// Stops at the first publish failure so later events never overtake it.
    pub async fn drain_once(&self) -> UserResult<usize> {
        let pending = self.store.pending_changes(self.batch_size).await?;
        let mut delivered = 0;
        for event in pending {
            self.notifier.publish(event.user_id).await?;
            self.store.ack_change(event.id).await?;
            delivered += 1;
        }
        Ok(delivered)
    }

    pub async fn run(self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.drain_once().await {
                Ok(0) => {}
                Ok(n) => info!(delivered = n, "outbox drained"),
                Err(e) => warn!(error = %e, "outbox relay failed; retrying next tick"),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingNotifier, StalledNotifier};
    use super::*;
    use crate::users::repo::testing::MemoryStore;
    use crate::users::repo_types::UserPatch;

    async fn store_with_pending(updates: &[i64]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        for id in updates {
            store.seed(*id, &format!("user{id}"), &format!("user{id}@mail.io"));
        }
        for id in updates {
            let patch = UserPatch {
                first_name: Some(format!("renamed{id}")),
                ..UserPatch::new(*id)
            };
            store.update_by_id(&patch).await.expect("update");
        }
        store
    }

    #[tokio::test]
    async fn drain_delivers_in_event_order_and_acks() {
        let store = store_with_pending(&[3, 1, 2]).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let relay = OutboxRelay::new(store.clone(), notifier.clone(), 10);

        assert_eq!(relay.drain_once().await.unwrap(), 3);
        assert_eq!(notifier.published(), vec![3, 1, 2]);
        assert!(store.pending_changes(10).await.unwrap().is_empty());
        assert_eq!(store.outbox_len(), 0);
        assert_eq!(relay.drain_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn drain_respects_batch_size() {
        let store = store_with_pending(&[1, 2, 3]).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let relay = OutboxRelay::new(store.clone(), notifier.clone(), 2);

        assert_eq!(relay.drain_once().await.unwrap(), 2);
        assert_eq!(store.pending_changes(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_publish_leaves_events_pending() {
        let store = store_with_pending(&[1, 2]).await;
        let notifier = Arc::new(RecordingNotifier::failing());
        let relay = OutboxRelay::new(store.clone(), notifier.clone(), 10);

        let err = relay.drain_once().await.unwrap_err();
        assert!(matches!(err, UserError::Notification(_)));
        assert_eq!(store.pending_changes(10).await.unwrap().len(), 2);

        *notifier.fail.lock().unwrap() = false;
        assert_eq!(relay.drain_once().await.unwrap(), 2);
        assert_eq!(notifier.published(), vec![1, 2]);
    }

    #[tokio::test]
    async fn stalled_queue_times_out_and_keeps_events() {
        let store = store_with_pending(&[4, 5]).await;
        let notifier = Arc::new(StalledNotifier {
            timeout: Duration::from_millis(20),
        });
        let relay = OutboxRelay::new(store.clone(), notifier, 10);

        let err = relay.drain_once().await.unwrap_err();
        assert!(matches!(err, UserError::Timeout("publish change")));
        assert_eq!(store.outbox_len(), 2);
    }
}
