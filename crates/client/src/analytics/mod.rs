//! Consent-gated analytics buffering.
//!
//! One [`AnalyticsService`] is constructed by the application root and handed
//! to whatever needs to record telemetry. It owns:
//!
//! - the consent flag and device fingerprint (persisted in a [`LocalStore`])
//! - an in-memory event buffer capped at `max_buffer` (oldest dropped first)
//! - a lazily created backend session, only ever created with consent
//! - a flush timer and a heartbeat timer, running only with consent
//!
//! Without consent nothing is buffered and nothing touches the network.
//! Error events skip the timer and flush immediately. A failed flush puts the
//! batch back ahead of anything recorded meanwhile and retries on the next tick.

mod event;
mod sink;

pub use event::{AnalyticsEvent, metadata};
pub use sink::AnalyticsSink;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use lullwave_core::{AnalyticsEventType, AnalyticsSessionId};

use crate::config::AnalyticsConfig;
use crate::storage::{LocalStore, keys};

/// Result of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to do: no consent, no session, or an empty buffer.
    Skipped,
    /// The batch was delivered.
    Sent(usize),
    /// Delivery failed and the batch went back into the buffer.
    Requeued(usize),
}

/// Analytics service handle. Clones share the same buffer and session.
pub struct AnalyticsService<S: AnalyticsSink> {
    inner: Arc<Inner<S>>,
}

impl<S: AnalyticsSink> Clone for AnalyticsService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S> {
    sink: S,
    store: Arc<dyn LocalStore>,
    config: AnalyticsConfig,
    fingerprint: String,
    state: Mutex<State>,
    // Serialises session creation so concurrent callers share one session
    session_gate: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct State {
    consent: bool,
    buffer: VecDeque<AnalyticsEvent>,
    session_id: Option<AnalyticsSessionId>,
    current_path: String,
    timers: Vec<JoinHandle<()>>,
}

impl<S: AnalyticsSink> AnalyticsService<S> {
    /// Create the service, restoring consent and the device fingerprint.
    ///
    /// A fingerprint is generated and persisted on first use. No network
    /// activity happens until [`start`](Self::start) or
    /// [`set_consent`](Self::set_consent).
    pub fn new(sink: S, store: Arc<dyn LocalStore>, config: AnalyticsConfig) -> Self {
        let consent = store.get(keys::ANALYTICS_CONSENT).as_deref() == Some("true");

        let fingerprint = store.get(keys::ANALYTICS_FINGERPRINT).unwrap_or_else(|| {
            let generated = uuid::Uuid::new_v4().to_string();
            if let Err(e) = store.set(keys::ANALYTICS_FINGERPRINT, &generated) {
                warn!(error = %e, "Failed to persist analytics fingerprint");
            }
            generated
        });

        Self {
            inner: Arc::new(Inner {
                sink,
                store,
                config,
                fingerprint,
                state: Mutex::new(State {
                    consent,
                    current_path: "/".to_string(),
                    ..State::default()
                }),
                session_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the user has granted analytics consent.
    #[must_use]
    pub fn has_consent(&self) -> bool {
        self.state().consent
    }

    /// The persisted per-device fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    /// The backend session, once created.
    #[must_use]
    pub fn session_id(&self) -> Option<AnalyticsSessionId> {
        self.state().session_id
    }

    /// Number of events waiting to be flushed.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.state().buffer.len()
    }

    /// Snapshot of the buffered events, oldest first.
    #[must_use]
    pub fn buffered_events(&self) -> Vec<AnalyticsEvent> {
        self.state().buffer.iter().cloned().collect()
    }

    /// Bring the service online: with prior consent, create the session and
    /// start the timers. Without consent this does nothing.
    pub async fn start(&self) {
        if !self.has_consent() {
            debug!("Analytics consent not granted; staying offline");
            return;
        }
        self.ensure_session().await;
        self.start_timers();
    }

    /// Record the user's consent choice.
    ///
    /// Granting creates a session if none exists and starts the timers.
    /// Revoking clears the buffer and stops the timers before returning.
    #[instrument(skip(self))]
    pub async fn set_consent(&self, granted: bool) {
        if let Err(e) = self
            .inner
            .store
            .set(keys::ANALYTICS_CONSENT, if granted { "true" } else { "false" })
        {
            warn!(error = %e, "Failed to persist analytics consent");
        }

        {
            let mut state = self.state();
            state.consent = granted;
            if !granted {
                let dropped = state.buffer.len();
                state.buffer.clear();
                for timer in state.timers.drain(..) {
                    timer.abort();
                }
                info!(dropped, "Analytics consent revoked");
            }
        }

        if granted {
            info!("Analytics consent granted");
            self.ensure_session().await;
            self.start_timers();
            self.track_event(
                AnalyticsEventType::Consent,
                None,
                Some(metadata([("granted", true)])),
            )
            .await;
        }
    }

    /// Update the path attached to subsequent events.
    pub fn set_current_path(&self, path: &str) {
        path.clone_into(&mut self.state().current_path);
    }

    /// Navigation helper: update the current path and record a view.
    pub async fn page_view(&self, path: &str) {
        self.set_current_path(path);
        self.track_event(AnalyticsEventType::View, Some(path), None)
            .await;
    }

    /// Record an event.
    ///
    /// No-op without consent. Metadata is enriched with the current `path`
    /// and, when set, the active `experiment` tag. Error events trigger an
    /// immediate flush.
    pub async fn track_event(
        &self,
        event_type: AnalyticsEventType,
        feature_name: Option<&str>,
        metadata: Option<Map<String, Value>>,
    ) {
        if self.record(event_type, feature_name, metadata) && event_type.is_urgent() {
            self.flush().await;
        }
    }

    /// Buffer an event without flushing. Returns whether it was recorded.
    fn record(
        &self,
        event_type: AnalyticsEventType,
        feature_name: Option<&str>,
        metadata: Option<Map<String, Value>>,
    ) -> bool {
        let experiment = self.inner.store.get(keys::ACTIVE_EXPERIMENT);
        let mut state = self.state();
        if !state.consent {
            return false;
        }

        let mut metadata = metadata.unwrap_or_default();
        metadata
            .entry("path")
            .or_insert_with(|| Value::String(state.current_path.clone()));
        if let Some(experiment) = experiment {
            metadata
                .entry("experiment")
                .or_insert(Value::String(experiment));
        }

        state.buffer.push_back(AnalyticsEvent::new(
            event_type,
            feature_name.map(str::to_owned),
            metadata,
        ));
        trim_oldest(&mut state.buffer, self.inner.config.max_buffer);
        true
    }

    /// Record an error event (e.g., a failed operation surfaced to the user).
    pub async fn report_error(&self, message: &str, source: Option<&str>) {
        let mut bag = metadata([("message", message)]);
        if let Some(source) = source {
            bag.insert("source".to_string(), Value::from(source));
        }
        self.track_event(AnalyticsEventType::Error, None, Some(bag))
            .await;
    }

    /// Record how long the initial load took.
    pub async fn report_page_load(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.track_event(
            AnalyticsEventType::Performance,
            Some("page_load"),
            Some(metadata([("load_ms", millis)])),
        )
        .await;
    }

    /// Deliver the buffered events.
    ///
    /// No-op without consent, without a session, or with an empty buffer.
    /// On failure the batch is re-queued ahead of newer events, capped at
    /// `max_buffer`.
    pub async fn flush(&self) -> FlushOutcome {
        let batch = {
            let mut state = self.state();
            if !state.consent || state.buffer.is_empty() {
                return FlushOutcome::Skipped;
            }
            let Some(session_id) = state.session_id else {
                return FlushOutcome::Skipped;
            };
            state
                .buffer
                .drain(..)
                .map(|mut event| {
                    event.session_id = Some(session_id);
                    event
                })
                .collect::<Vec<_>>()
        };

        let count = batch.len();
        match self.inner.sink.send_events(&batch).await {
            Ok(()) => {
                debug!(count, "Flushed analytics events");
                FlushOutcome::Sent(count)
            }
            Err(e) => {
                warn!(error = %e, count, "Analytics flush failed; re-queueing");
                let mut state = self.state();
                if state.consent {
                    let newer = std::mem::take(&mut state.buffer);
                    let mut merged: VecDeque<AnalyticsEvent> = batch.into();
                    merged.extend(newer);
                    trim_oldest(&mut merged, self.inner.config.max_buffer);
                    state.buffer = merged;
                }
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// Stop the timers and make a final best-effort flush.
    pub async fn shutdown(&self) {
        for timer in self.state().timers.drain(..) {
            timer.abort();
        }
        self.flush().await;
    }

    /// Report panics as error events.
    ///
    /// Chains onto the previously installed hook. The flush is spawned on the
    /// current tokio runtime when there is one.
    pub fn install_panic_hook(&self) {
        let service = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let message = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            let mut bag = metadata([("message", message)]);
            if let Some(location) = info.location() {
                bag.insert(
                    "source".to_string(),
                    Value::from(format!("{}:{}", location.file(), location.line())),
                );
            }

            if service.record(AnalyticsEventType::Error, None, Some(bag))
                && let Ok(handle) = tokio::runtime::Handle::try_current()
            {
                let service = service.clone();
                handle.spawn(async move {
                    service.flush().await;
                });
            }

            previous(info);
        }));
    }

    async fn ensure_session(&self) {
        let _gate = self.inner.session_gate.lock().await;
        {
            let state = self.state();
            if !state.consent || state.session_id.is_some() {
                return;
            }
        }

        match self.inner.sink.create_session(&self.inner.fingerprint).await {
            Ok(session_id) => {
                info!(session_id = %session_id, "Analytics session created");
                let mut state = self.state();
                if state.consent {
                    state.session_id = Some(session_id);
                }
            }
            Err(e) => warn!(error = %e, "Failed to create analytics session"),
        }
    }

    fn start_timers(&self) {
        let mut state = self.state();
        if !state.consent || !state.timers.is_empty() {
            return;
        }

        let flush = spawn_ticker(
            Arc::downgrade(&self.inner),
            self.inner.config.flush_interval,
            |service| async move {
                service.flush().await;
            },
        );
        let heartbeat = spawn_ticker(
            Arc::downgrade(&self.inner),
            self.inner.config.heartbeat_interval,
            |service| async move {
                // A session that failed to open at consent time is retried here
                service.ensure_session().await;
                service
                    .track_event(AnalyticsEventType::Heartbeat, None, None)
                    .await;
            },
        );
        state.timers.extend([flush, heartbeat]);
    }
}

/// Run `tick` every `period` until the service is dropped or the task aborted.
///
/// Holds only a weak reference so the timer never keeps the service alive.
fn spawn_ticker<S, F, Fut>(inner: Weak<Inner<S>>, period: Duration, tick: F) -> JoinHandle<()>
where
    S: AnalyticsSink,
    F: Fn(AnalyticsService<S>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            tick(AnalyticsService { inner }).await;
        }
    })
}

fn trim_oldest(buffer: &mut VecDeque<AnalyticsEvent>, max: usize) {
    while buffer.len() > max {
        buffer.pop_front();
    }
}
