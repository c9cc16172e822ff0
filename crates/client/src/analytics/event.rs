//! Analytics event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use lullwave_core::{AnalyticsEventType, AnalyticsSessionId};

/// A single telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_type: AnalyticsEventType,
    /// Feature the event concerns (e.g., `"vault"`, `"/sounds"`).
    pub feature_name: Option<String>,
    /// Free-form attributes; always a JSON object.
    pub metadata: Map<String, Value>,
    /// Stamped when the event is flushed; `None` while buffered.
    pub session_id: Option<AnalyticsSessionId>,
    pub created_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    /// Create an unsent event timestamped now.
    #[must_use]
    pub fn new(
        event_type: AnalyticsEventType,
        feature_name: Option<String>,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            event_type,
            feature_name,
            metadata,
            session_id: None,
            created_at: Utc::now(),
        }
    }

    /// Read a string attribute from the metadata bag.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Build a metadata bag from key/value pairs.
#[must_use]
pub fn metadata<I, K, V>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_type_in_snake_case() {
        let event = AnalyticsEvent::new(
            AnalyticsEventType::Conversion,
            Some("merch".to_string()),
            metadata([("product", "hoodie")]),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "conversion");
        assert_eq!(json["feature_name"], "merch");
        assert_eq!(json["metadata"]["product"], "hoodie");
        assert!(json["session_id"].is_null());
    }

    #[test]
    fn test_metadata_str() {
        let event = AnalyticsEvent::new(
            AnalyticsEventType::View,
            None,
            metadata([("path", Value::from("/vault")), ("count", Value::from(2))]),
        );
        assert_eq!(event.metadata_str("path"), Some("/vault"));
        assert_eq!(event.metadata_str("count"), None);
        assert_eq!(event.metadata_str("missing"), None);
    }
}
