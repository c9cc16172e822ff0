//! Last-write-wins debouncing for input streams.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Emits a pushed value once no newer value arrived for `delay`.
///
/// Each [`push`](Self::push) cancels the pending timer, so only the last value
/// of a burst is ever emitted.
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
    tx: mpsc::Sender<T>,
    rx: mpsc::Receiver<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            delay,
            pending: None,
            tx,
            rx,
        }
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending value with `value` and restart the timer.
    pub fn push(&mut self, value: T) {
        self.cancel();
        let tx = self.tx.clone();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(value).await;
        }));
    }

    /// Drop the pending value, if any.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        // A value that settled but wasn't consumed is stale too
        while self.rx.try_recv().is_ok() {}
    }

    /// Wait for the next settled value.
    ///
    /// Pends until a value settles; callers typically `select!` this against
    /// other work.
    pub async fn settled(&mut self) -> Option<T> {
        let value = self.rx.recv().await;
        self.pending = None;
        value
    }

    /// Whether a value is waiting out its delay.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| !p.is_finished())
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}
