//! Sound library search.
//!
//! [`SoundSearch`] sits behind the search box: keystrokes are debounced and
//! only the settled query hits the backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use lullwave_core::SoundId;

use crate::backend::{BackendClient, BackendError, Order, Query};
use crate::debounce::Debouncer;

/// Default cap on returned sounds.
pub const DEFAULT_LIMIT: usize = 50;

/// Delay between the last keystroke and the search request.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sound {
    pub id: SoundId,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub audio_url: String,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub is_premium: bool,
}

/// Search criteria. Empty fields don't filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundQuery {
    /// Case-insensitive title substring.
    pub text: String,
    /// Match sounds sharing at least one tag.
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub limit: usize,
}

impl Default for SoundQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            tags: Vec::new(),
            category: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SoundQuery {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Backend filter for this query.
    #[must_use]
    pub fn to_query(&self) -> Query {
        let mut query = Query::new();
        let text = self.text.trim();
        if !text.is_empty() {
            query = query.ilike("title", text);
        }
        if !self.tags.is_empty() {
            query = query.overlaps("tags", &self.tags);
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            query = query.eq("category", category);
        }
        query.order("title", Order::Asc).limit(self.limit)
    }
}

pub trait SoundLibrary: Send + Sync {
    fn search(
        &self,
        query: &SoundQuery,
    ) -> impl Future<Output = Result<Vec<Sound>, BackendError>> + Send;
}

impl SoundLibrary for BackendClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &SoundQuery) -> Result<Vec<Sound>, BackendError> {
        self.select("sounds", &query.to_query()).await
    }
}

/// Debounced search-as-you-type.
pub struct SoundSearch<L: SoundLibrary> {
    library: L,
    input: Debouncer<SoundQuery>,
    last_query: Option<SoundQuery>,
    results: Vec<Sound>,
}

impl<L: SoundLibrary> SoundSearch<L> {
    pub fn new(library: L) -> Self {
        Self::with_delay(library, SEARCH_DEBOUNCE)
    }

    pub fn with_delay(library: L, delay: Duration) -> Self {
        Self {
            library,
            input: Debouncer::new(delay),
            last_query: None,
            results: Vec::new(),
        }
    }

    /// Feed the latest input. Supersedes any query still waiting.
    pub fn on_input(&mut self, query: SoundQuery) {
        self.input.push(query);
    }

    #[must_use]
    pub fn results(&self) -> &[Sound] {
        &self.results
    }

    /// Wait for input to settle, run the search, and return the results.
    ///
    /// A settled query identical to the previous one is not re-sent. A failed
    /// search keeps the previous results.
    ///
    /// # Errors
    ///
    /// Returns the backend error from the search request.
    pub async fn next_results(&mut self) -> Result<&[Sound], BackendError> {
        let Some(query) = self.input.settled().await else {
            return Ok(&self.results);
        };
        if self.last_query.as_ref() == Some(&query) {
            return Ok(&self.results);
        }

        match self.library.search(&query).await {
            Ok(sounds) => {
                debug!(count = sounds.len(), text = %query.text, "Sound search finished");
                self.results = sounds;
                self.last_query = Some(query);
                Ok(&self.results)
            }
            Err(e) => {
                warn!(error = %e, "Sound search failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use url::Url;

    use super::*;

    fn sound(title: &str, tags: &[&str]) -> Sound {
        Sound {
            id: SoundId::new(),
            title: title.to_string(),
            category: Some("nature".to_string()),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            audio_url: format!("https://cdn.test/{title}.mp3"),
            duration_secs: Some(600),
            is_premium: false,
        }
    }

    #[derive(Clone, Default)]
    struct FakeLibrary {
        sounds: Vec<Sound>,
        queries: Arc<Mutex<Vec<SoundQuery>>>,
    }

    impl SoundLibrary for FakeLibrary {
        async fn search(&self, query: &SoundQuery) -> Result<Vec<Sound>, BackendError> {
            self.queries.lock().unwrap().push(query.clone());
            let needle = query.text.to_lowercase();
            Ok(self
                .sounds
                .iter()
                .filter(|s| s.title.to_lowercase().contains(&needle))
                .filter(|s| query.tags.is_empty() || s.tags.iter().any(|t| query.tags.contains(t)))
                .take(query.limit)
                .cloned()
                .collect())
        }
    }

    fn decoded(query: &Query) -> Vec<(String, String)> {
        let mut url = Url::parse("https://backend.test/rest/v1/sounds").unwrap();
        query.apply(&mut url);
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_query_encoding() {
        let query = SoundQuery {
            text: "  rain ".to_string(),
            tags: vec!["sleep".to_string(), "focus".to_string()],
            category: Some("nature".to_string()),
            limit: 10,
        };
        let pairs = decoded(&query.to_query());
        assert!(pairs.contains(&("title".to_string(), "ilike.*rain*".to_string())));
        assert!(pairs.contains(&("tags".to_string(), "ov.{\"sleep\",\"focus\"}".to_string())));
        assert!(pairs.contains(&("category".to_string(), "eq.nature".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "10".to_string())));
    }

    #[test]
    fn test_empty_query_only_orders_and_limits() {
        let pairs = decoded(&SoundQuery::default().to_query());
        let keys: Vec<_> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["order", "limit"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_burst_sends_one_search() {
        let library = FakeLibrary {
            sounds: vec![sound("Rain on tin", &["sleep"]), sound("Forest", &["focus"])],
            ..FakeLibrary::default()
        };
        let mut search = SoundSearch::new(library.clone());

        search.on_input(SoundQuery::text("r"));
        search.on_input(SoundQuery::text("ra"));
        search.on_input(SoundQuery::text("rain"));

        let results = search.next_results().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Rain on tin");

        let sent = library.queries.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "rain");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_query_is_not_resent() {
        let library = FakeLibrary::default();
        let mut search = SoundSearch::with_delay(library.clone(), Duration::from_millis(10));

        search.on_input(SoundQuery::text("wind"));
        search.next_results().await.unwrap();
        search.on_input(SoundQuery::text("wind"));
        search.next_results().await.unwrap();

        assert_eq!(library.queries.lock().unwrap().len(), 1);
    }
}
