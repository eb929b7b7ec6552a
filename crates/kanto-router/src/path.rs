//! Path normalisation.

/// Normalises a request or route path.
///
/// Repeated slashes collapse into one, the result always starts with a
/// single `/`, and a trailing slash is removed unless the path is the root.
/// The empty string normalises to `/`. The function is idempotent.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }

    if out.is_empty() {
        out.push('/');
    }
    out
}
