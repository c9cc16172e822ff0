//! Where analytics batches are delivered.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use lullwave_core::{AnalyticsEventType, AnalyticsSessionId};

use super::event::AnalyticsEvent;
use crate::backend::{BackendClient, BackendError};

/// Backend sink for analytics sessions and event batches.
pub trait AnalyticsSink: Send + Sync + 'static {
    /// Register a new session for this device.
    fn create_session(
        &self,
        fingerprint: &str,
    ) -> impl Future<Output = Result<AnalyticsSessionId, BackendError>> + Send;

    /// Deliver a batch of events stamped with their session.
    fn send_events(
        &self,
        events: &[AnalyticsEvent],
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

#[derive(Serialize)]
struct NewSessionRow<'a> {
    fingerprint: &'a str,
    started_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct SessionRow {
    id: AnalyticsSessionId,
}

#[derive(Serialize)]
struct EventRow<'a> {
    session_id: Option<AnalyticsSessionId>,
    event_type: AnalyticsEventType,
    feature_name: Option<&'a str>,
    metadata: &'a Map<String, Value>,
    created_at: DateTime<Utc>,
}

impl AnalyticsSink for BackendClient {
    async fn create_session(&self, fingerprint: &str) -> Result<AnalyticsSessionId, BackendError> {
        let row: SessionRow = self
            .insert(
                "analytics_sessions",
                &NewSessionRow {
                    fingerprint,
                    started_at: Utc::now(),
                },
            )
            .await?;
        Ok(row.id)
    }

    async fn send_events(&self, events: &[AnalyticsEvent]) -> Result<(), BackendError> {
        let rows: Vec<EventRow<'_>> = events
            .iter()
            .map(|e| EventRow {
                session_id: e.session_id,
                event_type: e.event_type,
                feature_name: e.feature_name.as_deref(),
                metadata: &e.metadata,
                created_at: e.created_at,
            })
            .collect();
        self.insert_batch("analytics_events", &rows).await
    }
}
