//! Path parameter storage.
//!
//! Parameters are kept in a small vector so that the common case of a
//! handful of parameters never touches the heap for the container itself.

use smallvec::SmallVec;

/// Maximum number of parameters stored inline.
const INLINE_PARAMS: usize = 4;

/// Parameters extracted from a matched path, in declaration order.
///
/// `Params` is read-only once built: handlers can look values up but cannot
/// change what the matcher produced.
///
/// # Example
///
/// ```rust
/// use kanto_router::Params;
///
/// let params: Params = vec![("id".to_string(), "abc123".to_string())]
///     .into_iter()
///     .collect();
///
/// assert_eq!(params.get("id"), Some("abc123"));
/// assert_eq!(params.get("unknown"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if a parameter with this name was extracted.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(n, _)| n == name)
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns an iterator over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, String)>,
        fn(&'a (String, String)) -> (&'a str, &'a str),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_params_empty() {
        let params = Params::new();
        assert!(params.is_empty());
        assert_eq!(params.len(), 0);
        assert_eq!(params.get("id"), None);
    }

    #[test]
    fn test_params_lookup() {
        let params = params(&[("set", "base1"), ("id", "4")]);
        assert_eq!(params.get("set"), Some("base1"));
        assert_eq!(params.get("id"), Some("4"));
        assert!(params.contains("id"));
        assert!(!params.contains("name"));
    }

    #[test]
    fn test_params_keep_order() {
        let params = params(&[("b", "2"), ("a", "1")]);
        let names: Vec<_> = (&params).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_params_spill_to_heap() {
        let params: Params = (0..10)
            .map(|i| (format!("key{i}"), format!("value{i}")))
            .collect();
        assert_eq!(params.len(), 10);
        assert_eq!(params.get("key7"), Some("value7"));
    }
}
