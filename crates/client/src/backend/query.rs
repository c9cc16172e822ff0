//! Row filter builder for table queries.
//!
//! Filters are encoded as `column=operator.value` query parameters, ordering
//! as `order=column.asc,other.desc`, and row caps as `limit=n`.

use std::fmt::Display;

use url::Url;

/// Sort direction for [`Query::order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// A table query: projection, filters, ordering, and limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Vec<String>,
    limit: Option<usize>,
}

impl Query {
    /// An unfiltered query selecting every column.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the returned columns (e.g., `"id,title"`).
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_owned());
        self
    }

    /// Equality filter.
    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.filters.push((column.to_owned(), format!("eq.{value}")));
        self
    }

    /// Greater-than-or-equal filter.
    #[must_use]
    pub fn gte(mut self, column: &str, value: impl Display) -> Self {
        self.filters.push((column.to_owned(), format!("gte.{value}")));
        self
    }

    /// Set-overlap filter: the array column shares at least one element with `values`.
    #[must_use]
    pub fn overlaps<S: AsRef<str>>(mut self, column: &str, values: &[S]) -> Self {
        let items = values
            .iter()
            .map(|v| format!("\"{}\"", v.as_ref().replace('\\', "\\\\").replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(",");
        self.filters.push((column.to_owned(), format!("ov.{{{items}}}")));
        self
    }

    /// Case-insensitive substring match.
    #[must_use]
    pub fn ilike(mut self, column: &str, needle: &str) -> Self {
        // `*` is the wildcard in query-string patterns; strip any the user typed
        let needle = needle.replace('*', "");
        self.filters
            .push((column.to_owned(), format!("ilike.*{needle}*")));
        self
    }

    /// Append a sort key. Keys apply in the order they are added.
    #[must_use]
    pub fn order(mut self, column: &str, direction: Order) -> Self {
        let dir = match direction {
            Order::Asc => "asc",
            Order::Desc => "desc",
        };
        self.order.push(format!("{column}.{dir}"));
        self
    }

    /// Cap the number of returned rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether any row filter is present.
    #[must_use]
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Encode this query onto `url`'s query string.
    pub fn apply(&self, url: &mut Url) {
        let mut pairs = url.query_pairs_mut();
        if let Some(select) = &self.select {
            pairs.append_pair("select", select);
        }
        for (column, filter) in &self.filters {
            pairs.append_pair(column, filter);
        }
        if !self.order.is_empty() {
            pairs.append_pair("order", &self.order.join(","));
        }
        if let Some(limit) = self.limit {
            pairs.append_pair("limit", &limit.to_string());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encoded(query: &Query) -> String {
        let mut url = Url::parse("https://backend.test/rest/v1/sounds").unwrap();
        query.apply(&mut url);
        url.query().unwrap_or_default().to_string()
    }

    fn decoded(query: &Query) -> Vec<(String, String)> {
        let mut url = Url::parse("https://backend.test/rest/v1/sounds").unwrap();
        query.apply(&mut url);
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_empty_query_adds_nothing() {
        assert_eq!(encoded(&Query::new()), "");
    }

    #[test]
    fn test_filters_order_and_limit() {
        let query = Query::new()
            .select("id,title")
            .eq("is_active", true)
            .order("is_hero", Order::Desc)
            .order("name", Order::Asc)
            .limit(20);

        assert_eq!(
            decoded(&query),
            vec![
                ("select".to_string(), "id,title".to_string()),
                ("is_active".to_string(), "eq.true".to_string()),
                ("order".to_string(), "is_hero.desc,name.asc".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn test_overlaps_quotes_values() {
        let query = Query::new().overlaps("tags", &["rain", "soft \"whisper\""]);
        assert_eq!(
            decoded(&query),
            vec![(
                "tags".to_string(),
                "ov.{\"rain\",\"soft \\\"whisper\\\"\"}".to_string()
            )]
        );
    }

    #[test]
    fn test_ilike_wraps_wildcards() {
        let query = Query::new().ilike("title", "ra*in");
        assert_eq!(
            decoded(&query),
            vec![("title".to_string(), "ilike.*rain*".to_string())]
        );
    }

    #[test]
    fn test_timestamps_are_percent_encoded() {
        let query = Query::new().gte("created_at", "2026-01-01T00:00:00+00:00");
        assert!(encoded(&query).contains("created_at=gte.2026-01-01T00%3A00%3A00%2B00%3A00"));
    }
}
