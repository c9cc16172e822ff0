//! In-memory [`SubscriberStore`] for tests and local runs without Postgres.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use lullwave_core::{Email, SubscriberId};

use super::{RepositoryError, Subscriber, SubscriberStore, generate_unsubscribe_token};

#[derive(Default)]
struct State {
    subscribers: Vec<Subscriber>,
    settings: HashMap<String, String>,
    unavailable: bool,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RepositoryError> {
        let state = self
            .state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))?;
        if state.unavailable {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }
        Ok(state)
    }

    /// Make every subsequent operation fail, or recover.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = unavailable;
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.settings.insert(key.to_string(), value.to_string());
        }
    }

    /// The subscriber row for `email`, if any.
    #[must_use]
    pub fn find(&self, email: &str) -> Option<Subscriber> {
        let state = self.state.lock().ok()?;
        state
            .subscribers
            .iter()
            .find(|s| s.email.as_str() == email)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().map_or(0, |s| s.subscribers.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubscriberStore for MemoryStore {
    async fn upsert_subscriber(
        &self,
        email: &Email,
        source: &str,
    ) -> Result<Subscriber, RepositoryError> {
        let mut state = self.lock()?;
        let now = Utc::now();

        if let Some(existing) = state.subscribers.iter_mut().find(|s| &s.email == email) {
            existing.is_active = true;
            existing
                .unsubscribe_token
                .get_or_insert_with(generate_unsubscribe_token);
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let subscriber = Subscriber {
            id: SubscriberId::new(),
            email: email.clone(),
            is_active: true,
            unsubscribe_token: Some(generate_unsubscribe_token()),
            source: source.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.subscribers.push(subscriber.clone());
        Ok(subscriber)
    }

    async fn unsubscribe(&self, token: &str) -> Result<Option<Subscriber>, RepositoryError> {
        let mut state = self.lock()?;
        let Some(subscriber) = state
            .subscribers
            .iter_mut()
            .find(|s| s.unsubscribe_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };
        subscriber.is_active = false;
        subscriber.unsubscribe_token = None;
        subscriber.updated_at = Utc::now();
        Ok(Some(subscriber.clone()))
    }

    async fn setting(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self.lock()?.settings.get(key).cloned())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_reactivates_and_keeps_token() {
        let store = MemoryStore::new();
        let email = Email::parse("calm@example.com").unwrap();

        let first = store.upsert_subscriber(&email, "landing").await.unwrap();
        let token = first.unsubscribe_token.clone().unwrap();
        store.unsubscribe(&token).await.unwrap();

        let again = store.upsert_subscriber(&email, "landing").await.unwrap();
        assert!(again.is_active);
        assert_eq!(again.id, first.id);
        assert!(again.unsubscribe_token.is_some());
        assert_ne!(again.unsubscribe_token.as_deref(), Some(token.as_str()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let store = MemoryStore::new();
        let email = Email::parse("calm@example.com").unwrap();
        let token = store
            .upsert_subscriber(&email, "landing")
            .await
            .unwrap()
            .unsubscribe_token
            .unwrap();

        let first = store.unsubscribe(&token).await.unwrap().unwrap();
        assert!(!first.is_active);
        assert!(store.unsubscribe(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(store.ping().await.is_err());
        let email = Email::parse("calm@example.com").unwrap();
        assert!(store.upsert_subscriber(&email, "landing").await.is_err());
    }
}
