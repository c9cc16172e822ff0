//! Live change channels.
//!
//! A [`Subscription`] is the handle for one open channel. Its lifetime is the
//! channel's lifetime: dropping or closing the handle stops the feeding task
//! immediately, so a view that owns the handle cannot leak a listener.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Buffered rows per channel before the feeder waits for the consumer.
pub const CHANNEL_CAPACITY: usize = 64;

/// How far behind the newest delivered row each poll looks again.
///
/// Insert timestamps are taken at transaction start, so a row can commit
/// after a newer one was already delivered.
pub const POLL_OVERLAP_SECS: i64 = 30;

/// Polling position for an insert channel.
///
/// Each poll asks for rows at or after [`floor`](Self::floor); rows already
/// delivered inside that window are recognised by key and skipped.
#[derive(Debug)]
pub struct InsertCursor<K> {
    newest: DateTime<Utc>,
    delivered: HashMap<K, DateTime<Utc>>,
}

impl<K: Eq + Hash> InsertCursor<K> {
    #[must_use]
    pub fn new(since: DateTime<Utc>) -> Self {
        Self {
            newest: since,
            delivered: HashMap::new(),
        }
    }

    /// Inclusive lower bound on `created_at` for the next poll.
    #[must_use]
    pub fn floor(&self) -> DateTime<Utc> {
        self.newest - TimeDelta::seconds(POLL_OVERLAP_SECS)
    }

    /// Record a polled row. Returns `false` if it was delivered before.
    pub fn admit(&mut self, key: K, created_at: DateTime<Utc>) -> bool {
        if self.delivered.contains_key(&key) {
            return false;
        }
        self.newest = self.newest.max(created_at);
        self.delivered.insert(key, created_at);

        // Rows below the floor are never polled again
        let floor = self.floor();
        self.delivered.retain(|_, at| *at >= floor);
        true
    }
}

/// Handle to an open live channel delivering rows of type `T`.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::Receiver<T>,
    feeder: JoinHandle<()>,
}

impl<T> Subscription<T> {
    /// Assemble a subscription from a receiver and the task feeding it.
    ///
    /// The task is aborted when the subscription is dropped.
    #[must_use]
    pub const fn new(receiver: mpsc::Receiver<T>, feeder: JoinHandle<()>) -> Self {
        Self { receiver, feeder }
    }

    /// Wait for the next row. Returns `None` once the channel has ended.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take the next row if one is already waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Whether the feeding task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.feeder.is_finished()
    }

    /// Close the channel. Equivalent to dropping the handle.
    pub fn close(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.feeder.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_790_000_000 + secs, 0).unwrap_or_default()
    }

    #[test]
    fn test_cursor_admits_row_stamped_at_cursor() {
        let mut cursor = InsertCursor::new(at(100));
        assert!(cursor.floor() <= at(100));
        assert!(cursor.admit("m2", at(100)));
        assert!(!cursor.admit("m2", at(100)));
    }

    #[test]
    fn test_cursor_admits_late_commit_behind_newest() {
        let mut cursor = InsertCursor::new(at(0));
        assert!(cursor.admit("newer", at(50)));

        // Committed after "newer" but stamped earlier
        assert!(cursor.floor() <= at(45));
        assert!(cursor.admit("older", at(45)));
        assert!(!cursor.admit("newer", at(50)));
    }

    #[test]
    fn test_cursor_forgets_rows_below_floor() {
        let mut cursor = InsertCursor::new(at(0));
        assert!(cursor.admit("a", at(0)));
        assert!(cursor.admit("b", at(POLL_OVERLAP_SECS + 10)));
        assert_eq!(cursor.delivered.len(), 1);
        assert_eq!(cursor.floor(), at(10));
    }

    #[tokio::test]
    async fn test_rows_arrive_in_order() {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let feeder = tokio::spawn(async move {
            for i in 0..3 {
                if tx.send(i).await.is_err() {
                    return;
                }
            }
        });

        let mut sub = Subscription::new(rx, feeder);
        assert_eq!(sub.recv().await, Some(0));
        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, Some(2));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_aborts_feeder() {
        let (tx, rx) = mpsc::channel::<u32>(CHANNEL_CAPACITY);
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
        let feeder = tokio::spawn(async move {
            // Holds `done_tx` until aborted
            let _done = done_tx;
            let _tx = tx;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let sub = Subscription::new(rx, feeder);
        assert!(sub.is_active());
        sub.close();

        // The aborted task drops its sender, closing the channel
        assert_eq!(done_rx.recv().await, None);
    }
}
