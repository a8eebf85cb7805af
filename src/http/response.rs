//! HTTP/1.1 response writer.
//!
//! Unlike the teacher's builder-pattern response type, the triple here is
//! produced by application/middleware code as plain data — status, headers,
//! body — and [`write_response`] is the only place that knows how to put it
//! on the wire. This matches the environment-in/triple-out handler contract
//! used by [`crate::pipeline`].

use std::io::{self, Read, Write};

use super::{Headers, reason_phrase};

/// A response body: either a complete in-memory buffer or a stream to be
/// read to exhaustion.
pub enum Body {
    Buffer(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(b) => f.debug_tuple("Buffer").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl Body {
    pub fn empty() -> Self {
        Self::Buffer(Vec::new())
    }

    pub fn is_empty_buffer(&self) -> bool {
        matches!(self, Self::Buffer(b) if b.is_empty())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::Buffer(s.into_bytes())
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Self::Buffer(s.as_bytes().to_vec())
    }
}

/// The `(status, headers, body)` triple produced by a pipeline's handler.
#[derive(Debug)]
pub struct ResponseTriple {
    pub status: u16,
    pub headers: Headers,
    pub body: Body,
}

impl ResponseTriple {
    pub fn new(status: u16, headers: Headers, body: Body) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }
}

/// Size of each chunk read from a stream body in chunked mode.
const CHUNK_BUFFER_SIZE: usize = 8192;

/// Writes a response triple to `out` in HTTP/1.1 wire format (§4.3).
///
/// For a buffer body, sets `Content-Length` unless the caller already set
/// `Content-Length` or `Transfer-Encoding`. For a stream body under the same
/// condition, sets `Transfer-Encoding: chunked` and emits the body as
/// size-prefixed chunks. The stream is consumed to exhaustion and dropped
/// once the terminal chunk has been written.
pub fn write_response<W: Write>(mut triple: ResponseTriple, out: &mut W) -> io::Result<()> {
    write_response_chunked(&mut triple, out, CHUNK_BUFFER_SIZE)
}

/// As [`write_response`], but with an explicit chunk read size — exposed so
/// tests can exercise chunk boundaries deterministically.
pub fn write_response_chunked<W: Write>(
    triple: &mut ResponseTriple,
    out: &mut W,
    chunk_size: usize,
) -> io::Result<()> {
    let has_length = triple.headers.contains("content-length");
    let has_encoding = triple.headers.contains("transfer-encoding");
    let chunked = match &triple.body {
        Body::Buffer(buf) => {
            if !buf.is_empty() && !has_length && !has_encoding {
                triple
                    .headers
                    .insert("Content-Length", buf.len().to_string());
            }
            false
        }
        Body::Stream(_) => {
            if !has_length && !has_encoding {
                triple.headers.insert("Transfer-Encoding", "chunked");
            }
            triple.headers.get("transfer-encoding").is_some()
        }
    };

    let reason = reason_phrase(triple.status);
    out.write_all(format!("HTTP/1.1 {} {reason}\r\n", triple.status).as_bytes())?;
    for (name, value) in triple.headers.iter() {
        out.write_all(format!("{name}: {value}\r\n").as_bytes())?;
    }
    out.write_all(b"\r\n")?;

    match &mut triple.body {
        Body::Buffer(buf) => {
            if !buf.is_empty() {
                out.write_all(buf)?;
            }
        }
        Body::Stream(stream) => {
            let mut buf = vec![0u8; chunk_size.max(1)];
            loop {
                let n = stream.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                if chunked {
                    out.write_all(format!("{n:x}\r\n").as_bytes())?;
                    out.write_all(&buf[..n])?;
                    out.write_all(b"\r\n")?;
                } else {
                    out.write_all(&buf[..n])?;
                }
            }
            if chunked {
                out.write_all(b"0\r\n\r\n")?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn to_string(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn buffer_body_sets_content_length() {
        let triple = ResponseTriple::new(200, Headers::new(), Body::from("Hello"));
        let mut out = Vec::new();
        write_response(triple, &mut out).unwrap();
        let s = to_string(out);
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn existing_content_length_is_not_overwritten() {
        let mut headers = Headers::new();
        headers.insert("Content-Length", "999");
        let triple = ResponseTriple::new(200, headers, Body::from("Hi"));
        let mut out = Vec::new();
        write_response(triple, &mut out).unwrap();
        let s = to_string(out);
        assert!(s.contains("Content-Length: 999\r\n"));
        assert!(!s.contains("Content-Length: 2\r\n"));
    }

    #[test]
    fn parse_error_scenario_renders_505() {
        let triple = ResponseTriple::new(
            505,
            Headers::new(),
            Body::from(reason_phrase(505)),
        );
        let mut out = Vec::new();
        write_response(triple, &mut out).unwrap();
        let s = to_string(out);
        assert!(s.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
        assert!(s.ends_with("HTTP Version Not Supported"));
    }

    #[test]
    fn chunked_stream_matches_spec_scenario() {
        let stream: Box<dyn Read + Send> = Box::new(Cursor::new(b"abcde".to_vec()));
        let mut triple = ResponseTriple::new(200, Headers::new(), Body::Stream(stream));
        let mut out = Vec::new();
        write_response_chunked(&mut triple, &mut out, 3).unwrap();
        let s = to_string(out);
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!s.contains("Content-Length"));
        assert!(s.ends_with("3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n"));
    }

    #[test]
    fn empty_buffer_body_has_no_content_length() {
        let triple = ResponseTriple::new(204, Headers::new(), Body::empty());
        let mut out = Vec::new();
        write_response(triple, &mut out).unwrap();
        let s = to_string(out);
        assert!(!s.contains("Content-Length"));
    }

    #[test]
    fn headers_preserve_insertion_order() {
        let mut headers = Headers::new();
        headers.insert("X-First", "1");
        headers.insert("X-Second", "2");
        let triple = ResponseTriple::new(200, headers, Body::empty());
        let mut out = Vec::new();
        write_response(triple, &mut out).unwrap();
        let s = to_string(out);
        let first = s.find("X-First").unwrap();
        let second = s.find("X-Second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn round_trip_preserves_status_headers_and_body() {
        let mut headers = Headers::new();
        headers.insert("X-Request-Id", "abc-123");
        let triple = ResponseTriple::new(201, headers, Body::from("created"));
        let mut out = Vec::new();
        write_response(triple, &mut out).unwrap();
        let s = to_string(out);

        let mut lines = s.split("\r\n");
        let status_line = lines.next().unwrap();
        assert_eq!(status_line, "HTTP/1.1 201 Created");

        let mut seen_request_id = false;
        let mut seen_content_length = false;
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            if line == "X-Request-Id: abc-123" {
                seen_request_id = true;
            }
            if line == "Content-Length: 7" {
                seen_content_length = true;
            }
        }
        assert!(seen_request_id && seen_content_length);

        let body: String = lines.collect::<Vec<_>>().join("\r\n");
        assert_eq!(body, "created");
    }
}
