//! Query string accessor.

use std::str::FromStr;

/// Decoded query string parameters.
///
/// Values are kept in the order they appeared. Invalid numbers are never an
/// error: [`get_number`](Self::get_number) returns `None` and
/// [`get_number_or`](Self::get_number_or) falls back to the default.
///
/// # Example
///
/// ```
/// use kanto_core::Query;
///
/// let query = Query::parse("page=2&limit=abc&holo=1&type=fire&type=water");
///
/// assert_eq!(query.get_number_or("page", 1_u32), 2);
/// assert_eq!(query.get_number_or("limit", 20_u32), 20);
/// assert!(query.get_bool("holo"));
/// assert_eq!(query.get_all("type"), vec!["fire", "water"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Parses a raw query string (without the leading `?`).
    ///
    /// A query string that cannot be decoded yields an empty accessor.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(raw).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "ignoring undecodable query string");
            Vec::new()
        });
        Self { pairs }
    }

    /// Returns the first value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first value for `key`, or `default`.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parses the first value for `key` as a number.
    #[must_use]
    pub fn get_number<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Parses the first value for `key`, falling back to `default`.
    #[must_use]
    pub fn get_number_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get_number(key).unwrap_or(default)
    }

    /// Returns `true` only for the values `true` and `1`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true" | "1"))
    }

    /// Returns every value for `key`.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns `true` if `key` is present, even with an empty value.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Returns `true` if the query string had no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns an iterator over `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
