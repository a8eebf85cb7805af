//! The per-request environment — a canonical key/value map describing one request.
//!
//! Modeled as a mapping whose value is a small tagged union rather than a
//! single stringly-typed map, since required keys span strings, integers,
//! byte buffers, and (for `adapter.input`) a readable stream handle.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;

/// A heterogeneous environment value.
pub enum EnvValue {
    Text(String),
    Int(i64),
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + Send>),
    /// A decoded key/value mapping, e.g. `adapter.get` / `adapter.post`.
    /// Values are kept as an ordered list since a query string or form body
    /// may repeat a key.
    Map(HashMap<String, Vec<String>>),
}

impl fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Map(m) => f.debug_tuple("Map").field(m).finish(),
        }
    }
}

impl EnvValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Vec<String>>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<HashMap<String, Vec<String>>> for EnvValue {
    fn from(m: HashMap<String, Vec<String>>) -> Self {
        Self::Map(m)
    }
}

impl From<String> for EnvValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for EnvValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<i64> for EnvValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

/// The per-request environment: a canonical key/value map built by the
/// request parser, normalized by the worker, and threaded through the
/// middleware pipeline.
///
/// Backed by an insertion-ordered `(String, EnvValue)` list rather than a
/// `HashMap` — a key re-inserted via [`Environment::insert`] overwrites its
/// existing slot in place, matching `IndexMap`'s insert semantics, so two
/// requests built from the same fields always iterate in the same order.
/// Mirrors [`crate::http::headers::Headers`]'s `Vec`-backed map.
#[derive(Default)]
pub struct Environment {
    inner: Vec<(String, EnvValue)>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.inner.iter().map(|(k, v)| (k.as_str(), v)))
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<EnvValue>) {
        let key = key.into();
        match self.inner.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value.into(),
            None => self.inner.push((key, value.into())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&EnvValue> {
        self.inner.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(EnvValue::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(EnvValue::as_int)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<EnvValue> {
        let index = self.inner.iter().position(|(k, _)| k == key)?;
        Some(self.inner.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnvValue)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Converts a received header name into its `HTTP_*` environment key:
/// uppercased, with `-` translated to `_`, prefixed with `HTTP_`.
///
/// `Content-Length` and `Content-Type` are the two documented exceptions —
/// callers needing the CGI exception behavior should check for those names
/// before calling this function (see [`promote_content_headers`]).
pub fn header_env_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 5);
    key.push_str("HTTP_");
    for c in name.chars() {
        if c == '-' {
            key.push('_');
        } else {
            key.push(c.to_ascii_uppercase());
        }
    }
    key
}

/// Post-parse normalization step (§4.2): moves `HTTP_CONTENT_LENGTH` /
/// `HTTP_CONTENT_TYPE` to their CGI-style names without the `HTTP_` prefix.
pub fn promote_content_headers(env: &mut Environment) {
    if let Some(EnvValue::Text(value)) = env.remove("HTTP_CONTENT_LENGTH") {
        if let Ok(len) = value.trim().parse::<i64>() {
            env.insert("CONTENT_LENGTH", len);
        }
    }
    if let Some(value) = env.remove("HTTP_CONTENT_TYPE") {
        env.insert("CONTENT_TYPE", value);
    }
}

/// Percent-decodes and splits a `k=v&k=v` query string into an ordered
/// multimap, keeping repeated keys as a list (§4.2).
pub fn parse_form_pairs(raw: &str) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    if raw.is_empty() {
        return map;
    }
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let key = percent_decode(parts.next().unwrap_or(""));
        let value = percent_decode(parts.next().unwrap_or(""));
        map.entry(key).or_default().push(value);
    }
    map
}

/// Full post-parse normalization (§4.2): promotes `Content-*` headers, then
/// decodes `QUERY_STRING` into `adapter.get`, and, for an
/// `application/x-www-form-urlencoded` body, decodes `body` into
/// `adapter.post`.
pub fn normalize_environment(env: &mut Environment, body: &[u8]) {
    promote_content_headers(env);

    if let Some(query) = env.get_str("QUERY_STRING") {
        if !query.is_empty() {
            let pairs = parse_form_pairs(query);
            env.insert("adapter.get", pairs);
        }
    }

    let is_form_encoded = env
        .get_str("CONTENT_TYPE")
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"));
    if is_form_encoded {
        if let Ok(text) = std::str::from_utf8(body) {
            let pairs = parse_form_pairs(text);
            env.insert("adapter.post", pairs);
        }
    }
}

/// Minimal percent-decoder for `application/x-www-form-urlencoded` data:
/// `+` becomes a space, `%XX` becomes the decoded byte, invalid escapes are
/// passed through verbatim.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
