//! The small header map threaded through a [`crate::http::response::ResponseTriple`].
//!
//! Trimmed to exactly what a response's header field needs: append, a
//! case-insensitive lookup for the `Content-Length`/`Transfer-Encoding`
//! framing checks in [`crate::http::response::write_response_chunked`], and
//! ordered iteration for writing the header block to the wire.

/// A case-insensitive, insertion-ordered, multi-value header list.
///
/// # Examples
///
/// ```
/// use wharf::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "text/html; charset=utf-8");
///
/// assert_eq!(headers.get("content-type"), Some("text/html; charset=utf-8"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(h.get("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn contains() {
        let mut h = Headers::new();
        h.insert("Authorization", "Bearer token");
        assert!(h.contains("authorization"));
        assert!(!h.contains("x-missing"));
    }

    #[test]
    fn iter_preserves_insertion_order() {
        let mut h = Headers::new();
        h.insert("X-First", "1");
        h.insert("X-Second", "2");
        let pairs: Vec<_> = h.iter().collect();
        assert_eq!(pairs, vec![("X-First", "1"), ("X-Second", "2")]);
    }
}
