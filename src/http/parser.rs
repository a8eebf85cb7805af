//! Hand-written HTTP/1.1 request-line and header parser.
//!
//! This does not build on a general-purpose HTTP parsing crate: the error
//! taxonomy below (400/414/501/505, keyed to specific malformations) does
//! not line up with what a general RFC-7230 parser reports, so the parser
//! is written directly against the wire grammar it needs to support.

use crate::environment::{Environment, header_env_key};

/// Hard cap on the header block, terminator included (§4.2).
pub const MAX_HEADER_BYTES: usize = 4128;

/// The default allowed method set (§6), overridable via [`ParserConfig`].
pub const DEFAULT_METHODS: &[&str] = &[
    "OPTIONS", "GET", "POST", "PUT", "DELETE", "HEAD", "TRACE", "CONNECT",
];

/// Parser configuration: the allowed method set and the header-block cap.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub allowed_methods: Vec<String>,
    pub max_header_bytes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            allowed_methods: DEFAULT_METHODS.iter().map(|s| s.to_string()).collect(),
            max_header_bytes: MAX_HEADER_BYTES,
        }
    }
}

/// Result of a parse attempt over an accumulating byte buffer.
pub enum ParseOutcome {
    /// A complete, valid request environment. Carries the offset in the
    /// input buffer immediately past the `\r\n\r\n` terminator.
    Complete(Environment, usize),
    /// The buffer does not yet contain a full header block; the caller
    /// should read more bytes and try again (unless the cap is reached).
    Incomplete,
    /// The header block is malformed; carries the HTTP status to respond
    /// with.
    Error(u16),
}

/// Finds the offset just past the first `\r\n\r\n` in `buf`, if present.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// Parses a request line and header block from `buf` into an [`Environment`].
///
/// `buf` may be a partial or complete accumulation of bytes read from the
/// connection; see [`ParseOutcome`] for how incompleteness and the
/// oversize cap are reported.
pub fn parse_request(buf: &[u8], config: &ParserConfig) -> ParseOutcome {
    let Some(end) = find_header_end(buf) else {
        return if buf.len() >= config.max_header_bytes {
            ParseOutcome::Error(414)
        } else {
            ParseOutcome::Incomplete
        };
    };

    // Drop the trailing \r\n\r\n before splitting into lines.
    let header_block = &buf[..end - 2];
    let Ok(text) = std::str::from_utf8(header_block) else {
        return ParseOutcome::Error(400);
    };

    let mut lines = text.split("\r\n");
    let Some(request_line) = lines.next() else {
        return ParseOutcome::Error(400);
    };

    let tokens: Vec<&str> = request_line.split(' ').collect();
    if tokens.len() != 3 {
        return ParseOutcome::Error(400);
    }

    let method = tokens[0].to_ascii_uppercase();
    if !config
        .allowed_methods
        .iter()
        .any(|m| m.eq_ignore_ascii_case(&method))
    {
        return ParseOutcome::Error(501);
    }

    let protocol = tokens[2].to_ascii_uppercase();
    if protocol != "HTTP/1.1" {
        return ParseOutcome::Error(505);
    }

    let uri = tokens[1];
    let (path, query) = match uri.find('?') {
        Some(pos) => (&uri[..pos], &uri[pos + 1..]),
        None => (uri, ""),
    };

    let mut env = Environment::new();
    env.insert("REQUEST_METHOD", method);
    env.insert("REQUEST_URI", uri);
    env.insert("PATH_INFO", path);
    env.insert("QUERY_STRING", query);
    env.insert("HTTP_VERSION", "HTTP/1.1");

    // `last_key` tracks the most recently inserted header, for continuation
    // lines; a continuation before any real header is appended to a dummy
    // placeholder and dropped (§4.2, §9 open question).
    let mut last_key: Option<String> = None;
    let mut dummy = String::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            let continuation = line.trim_start_matches([' ', '\t']);
            match &last_key {
                Some(key) => {
                    if let Some(crate::environment::EnvValue::Text(existing)) = env.get(key) {
                        let appended = format!("{existing}{continuation}");
                        env.insert(key.clone(), appended);
                    }
                }
                None => dummy.push_str(continuation),
            }
            continue;
        }

        let Some(colon) = line.find(':') else {
            return ParseOutcome::Error(400);
        };
        let name = &line[..colon];
        let value = line[colon + 1..].trim_start_matches([' ', '\t']);
        let key = header_env_key(name);
        env.insert(key.clone(), value);
        last_key = Some(key);
    }

    if !env.contains_key("HTTP_HOST") {
        return ParseOutcome::Error(400);
    }

    ParseOutcome::Complete(env, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ParserConfig {
        ParserConfig::default()
    }

    fn assert_complete(buf: &[u8]) -> Environment {
        match parse_request(buf, &config()) {
            ParseOutcome::Complete(env, _) => env,
            ParseOutcome::Incomplete => panic!("expected complete parse, got incomplete"),
            ParseOutcome::Error(code) => panic!("expected complete parse, got error {code}"),
        }
    }

    #[test]
    fn parses_simple_get() {
        let env = assert_complete(b"GET /hello HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert_eq!(env.get_str("REQUEST_METHOD"), Some("GET"));
        assert_eq!(env.get_str("PATH_INFO"), Some("/hello"));
        assert_eq!(env.get_str("QUERY_STRING"), Some(""));
        assert_eq!(env.get_str("HTTP_HOST"), Some("example.com"));
        assert_eq!(env.get_str("HTTP_VERSION"), Some("HTTP/1.1"));
    }

    #[test]
    fn splits_query_string() {
        let env = assert_complete(b"GET /search?q=rust&page=2 HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(env.get_str("PATH_INFO"), Some("/search"));
        assert_eq!(env.get_str("QUERY_STRING"), Some("q=rust&page=2"));
    }

    #[test]
    fn lowercase_method_is_normalized() {
        let env = assert_complete(b"get / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(env.get_str("REQUEST_METHOD"), Some("GET"));
    }

    #[test]
    fn header_name_translates_dashes_and_case() {
        let env = assert_complete(b"GET / HTTP/1.1\r\nHost: x\r\nX-Request-Id: abc\r\n\r\n");
        assert_eq!(env.get_str("HTTP_X_REQUEST_ID"), Some("abc"));
    }

    #[test]
    fn continuation_line_is_appended_without_separator() {
        let env = assert_complete(
            b"GET / HTTP/1.1\r\nHost: x\r\nX-Long: ab\r\n cd\r\n\r\n",
        );
        assert_eq!(env.get_str("HTTP_X_LONG"), Some("abcd"));
    }

    #[test]
    fn leading_continuation_is_dropped_but_parsing_continues() {
        let env = assert_complete(b"GET / HTTP/1.1\r\n leading\r\nHost: x\r\n\r\n");
        assert_eq!(env.get_str("HTTP_HOST"), Some("x"));
    }

    #[test]
    fn wrong_token_count_is_bad_request() {
        match parse_request(b"GET /only-two HTTP/1.1 extra\r\nHost: x\r\n\r\n", &config()) {
            ParseOutcome::Error(400) => {}
            other => panic!("expected 400, got {other:?}"),
        }
    }

    #[test]
    fn missing_colon_is_bad_request() {
        match parse_request(b"GET / HTTP/1.1\r\nHost x\r\n\r\n", &config()) {
            ParseOutcome::Error(400) => {}
            other => panic!("expected 400, got {other:?}"),
        }
    }

    #[test]
    fn missing_host_is_bad_request() {
        match parse_request(b"GET / HTTP/1.1\r\nX-Foo: bar\r\n\r\n", &config()) {
            ParseOutcome::Error(400) => {}
            other => panic!("expected 400, got {other:?}"),
        }
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        match parse_request(b"FROB / HTTP/1.1\r\nHost: x\r\n\r\n", &config()) {
            ParseOutcome::Error(501) => {}
            other => panic!("expected 501, got {other:?}"),
        }
    }

    #[test]
    fn old_protocol_is_version_not_supported() {
        match parse_request(b"GET / HTTP/1.0\r\nHost: x\r\n\r\n", &config()) {
            ParseOutcome::Error(505) => {}
            other => panic!("expected 505, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_below_cap_requests_more_data() {
        match parse_request(b"GET / HTTP/1.1\r\nHost: x", &config()) {
            ParseOutcome::Incomplete => {}
            other => panic!("expected incomplete, got {other:?}"),
        }
    }

    #[test]
    fn oversize_without_terminator_is_414() {
        let buf = vec![b'a'; MAX_HEADER_BYTES];
        match parse_request(&buf, &config()) {
            ParseOutcome::Error(414) => {}
            other => panic!("expected 414, got {other:?}"),
        }
    }
}

impl std::fmt::Debug for ParseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(_, offset) => write!(f, "Complete(.., {offset})"),
            Self::Incomplete => write!(f, "Incomplete"),
            Self::Error(code) => write!(f, "Error({code})"),
        }
    }
}
