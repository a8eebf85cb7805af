//! Message-queue adapter worker (§4.5): pulls framed requests from an
//! upstream proxy over a ZeroMQ `PULL` socket, dispatches them through the
//! pipeline, and publishes framed responses over a `PUSH` socket.

use std::io::Read;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::QueueWorkerConfig;
use crate::environment::{self, EnvValue, Environment, header_env_key};
use crate::error::WharfError;
use crate::http::response::{Body, ResponseTriple, write_response};
use crate::pipeline::Handler;

/// A parsed inbound frame, before the headers JSON has been decoded.
#[derive(Debug, PartialEq, Eq)]
struct InboundFrame {
    uuid: String,
    conn_id: String,
    headers_json: String,
    body: Vec<u8>,
}

/// Parses `<uuid> <conn_id> <path> <hlen>:<headers-json>,<blen>:<body>,`.
///
/// The trailing comma after each length-prefixed payload is checked and
/// enforced (§9 open question: treated as authoritative framing, not the
/// always-false check in the source this was distilled from).
fn parse_inbound_frame(raw: &[u8]) -> Result<InboundFrame, u16> {
    let text = std::str::from_utf8(raw).map_err(|_| 400u16)?;
    let mut parts = text.splitn(4, ' ');
    let uuid = parts.next().ok_or(400u16)?.to_string();
    let conn_id = parts.next().ok_or(400u16)?.to_string();
    let _path = parts.next().ok_or(400u16)?;
    let rest = parts.next().ok_or(400u16)?;

    let (headers_json, remainder) = take_length_prefixed(rest)?;
    let (body, trailer) = take_length_prefixed(remainder)?;
    if !trailer.is_empty() {
        return Err(400u16);
    }

    Ok(InboundFrame {
        uuid,
        conn_id,
        headers_json: headers_json.to_string(),
        body: body.as_bytes().to_vec(),
    })
}

/// Consumes one `<len>:<payload>,` segment from the front of `input`,
/// returning the payload and whatever follows the comma.
fn take_length_prefixed(input: &str) -> Result<(&str, &str), u16> {
    let colon = input.find(':').ok_or(400u16)?;
    let len: usize = input[..colon].parse().map_err(|_| 400u16)?;
    let payload_start = colon + 1;
    let payload_end = payload_start.checked_add(len).ok_or(400u16)?;
    if payload_end >= input.len() {
        return Err(400u16);
    }
    let payload = &input[payload_start..payload_end];
    if input.as_bytes()[payload_end] != b',' {
        return Err(400u16);
    }
    Ok((payload, &input[payload_end + 1..]))
}

/// Builds a request environment from the inbound frame's headers-JSON object
/// (§6). Also reports whether the frame is the identity method or the
/// control path that this release accepts and silently discards (§4.5) —
/// checked against the raw `PATH` field, before it is rewritten into
/// `PATH_INFO` below.
fn environment_from_headers_json(headers_json: &str) -> Result<(Environment, bool), u16> {
    let value: Value = serde_json::from_str(headers_json).map_err(|_| 400u16)?;
    let object = value.as_object().ok_or(400u16)?;

    let mut env = Environment::new();
    let mut path = String::new();
    let mut pattern = String::new();

    for (key, value) in object {
        let Some(text) = value.as_str() else { continue };
        match key.as_str() {
            "METHOD" => env.insert("REQUEST_METHOD", text.to_ascii_uppercase()),
            "PATH" => path = text.to_string(),
            "URI" => env.insert("REQUEST_URI", text),
            "PATTERN" => pattern = text.to_string(),
            "QUERY" => env.insert("QUERY_STRING", text),
            "x-forwarded-for" => env.insert(header_env_key("x-forwarded-for"), text),
            other => env.insert(header_env_key(other), text),
        }
    }

    let is_json_method = env.get_str("REQUEST_METHOD") == Some("JSON");
    let is_control_path = path == "@*";
    let discarded = is_json_method || is_control_path;

    let script_name = if pattern == "/" { String::new() } else { pattern.clone() };
    let path_info = {
        let tail = path.get(pattern.len().min(path.len())..).unwrap_or("");
        format!("/{}", tail.trim_matches('/'))
    };
    env.insert("SCRIPT_NAME", script_name);
    env.insert("PATH_INFO", path_info);
    env.insert("HTTP_VERSION", "HTTP/1.1");

    if !env.contains_key("QUERY_STRING") {
        env.insert("QUERY_STRING", "");
    }

    Ok((env, discarded))
}

fn build_outbound_frame(uuid: &str, conn_id: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = format!("{uuid} {}:{conn_id}, ", conn_id.len()).into_bytes();
    out.extend_from_slice(payload);
    out
}

/// A message-queue adapter worker.
pub struct QueueWorker {
    pull: zmq::Socket,
    push: zmq::Socket,
    config: QueueWorkerConfig,
}

impl QueueWorker {
    pub fn connect(ctx: &zmq::Context, config: QueueWorkerConfig) -> Result<Self, WharfError> {
        let pull = ctx.socket(zmq::PULL).map_err(socket_error(&config.pull_address))?;
        pull.connect(&config.pull_address).map_err(socket_error(&config.pull_address))?;
        let push = ctx.socket(zmq::PUSH).map_err(socket_error(&config.push_address))?;
        push.connect(&config.push_address).map_err(socket_error(&config.push_address))?;
        Ok(Self { pull, push, config })
    }

    /// Runs until the pull socket errors out. Heartbeat is always disabled
    /// for this worker (§4.6): the blocking `recv` cannot be polled cheaply.
    pub fn run(&mut self, app: Handler<Environment, ResponseTriple>) -> Result<(), WharfError> {
        loop {
            let raw = self
                .pull
                .recv_bytes(0)
                .map_err(|e| WharfError::Supervisor(format!("queue recv failed: {e}")))?;

            let frame = match parse_inbound_frame(&raw) {
                Ok(frame) => frame,
                Err(code) => {
                    warn!(code, "malformed queue frame, dropping");
                    continue;
                }
            };

            let (mut env, discarded) = match environment_from_headers_json(&frame.headers_json) {
                Ok(parsed) => parsed,
                Err(code) => {
                    warn!(code, uuid = %frame.uuid, "malformed headers json, dropping");
                    continue;
                }
            };

            if discarded {
                debug!(uuid = %frame.uuid, "discarding identity/control frame");
                continue;
            }

            environment::normalize_environment(&mut env, &frame.body);
            super::stamp_adapter_fields(&mut env, &self.config.server_name, self.config.server_port);
            env.insert(
                "adapter.input",
                EnvValue::Stream(Box::new(std::io::Cursor::new(frame.body.clone())) as Box<dyn Read + Send>),
            );

            let triple = app(env);
            if let Err(e) = self.respond(&frame.uuid, &frame.conn_id, triple) {
                warn!(uuid = %frame.uuid, %e, "failed to publish response");
            }
        }
    }

    fn respond(&mut self, uuid: &str, conn_id: &str, triple: ResponseTriple) -> Result<(), WharfError> {
        match triple.body {
            Body::Stream(_) => self.respond_streaming(uuid, conn_id, triple),
            Body::Buffer(_) => self.respond_buffered(uuid, conn_id, triple),
        }
    }

    fn respond_buffered(&mut self, uuid: &str, conn_id: &str, triple: ResponseTriple) -> Result<(), WharfError> {
        let mut rendered = Vec::new();
        write_response(triple, &mut rendered)
            .map_err(|e| WharfError::Supervisor(format!("response render failed: {e}")))?;
        self.publish(build_outbound_frame(uuid, conn_id, &rendered))
    }

    fn respond_streaming(&mut self, uuid: &str, conn_id: &str, mut triple: ResponseTriple) -> Result<(), WharfError> {
        if !triple.headers.contains("transfer-encoding") {
            triple.headers.insert("Transfer-Encoding", "chunked");
        }
        let mut head = Vec::new();
        head.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", triple.status, crate::http::reason_phrase(triple.status)).as_bytes(),
        );
        for (name, value) in triple.headers.iter() {
            head.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        head.extend_from_slice(b"\r\n");

        let Body::Stream(mut stream) = triple.body else {
            unreachable!("respond_streaming is only called for Body::Stream");
        };

        let mut buf = vec![0u8; 8192];
        let mut first = true;
        loop {
            let n = stream
                .read(&mut buf)
                .map_err(|e| WharfError::Supervisor(format!("body stream read failed: {e}")))?;
            if n == 0 {
                break;
            }
            let mut frame_payload = if first {
                first = false;
                head.clone()
            } else {
                Vec::new()
            };
            frame_payload.extend_from_slice(format!("{n:x}\r\n").as_bytes());
            frame_payload.extend_from_slice(&buf[..n]);
            frame_payload.extend_from_slice(b"\r\n");
            self.publish(build_outbound_frame(uuid, conn_id, &frame_payload))?;
        }

        let mut terminator = if first { head } else { Vec::new() };
        terminator.extend_from_slice(b"0\r\n\r\n");
        self.publish(build_outbound_frame(uuid, conn_id, &terminator))
    }

    fn publish(&mut self, frame: Vec<u8>) -> Result<(), WharfError> {
        self.push
            .send(frame, 0)
            .map_err(|e| WharfError::Supervisor(format!("queue publish failed: {e}")))
    }
}

fn socket_error(address: &str) -> impl Fn(zmq::Error) -> WharfError + '_ {
    move |e| WharfError::SocketUnavailable {
        address: address.to_string(),
        errno: 0,
        message: e.to_string(),
    }
}
