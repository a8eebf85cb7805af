//! HTTP socket worker: the accept/parse/dispatch/respond loop (§4.4).

use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::environment::{self, Environment};
use crate::error::WharfError;
use crate::http::headers::Headers;
use crate::http::parser::{ParseOutcome, ParserConfig, parse_request};
use crate::http::response::{Body, ResponseTriple, write_response_chunked};
use crate::http::reason_phrase;
use crate::pipeline::Handler;
use crate::supervisor::heartbeat::HeartbeatCell;

use super::WorkerState;

/// How long the accept poll sleeps between checks of the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A sequential HTTP/1.1 worker: one connection at a time, no keep-alive.
pub struct HttpWorker {
    listener: TcpListener,
    config: WorkerConfig,
    heartbeat: Option<HeartbeatCell>,
    shutdown: Arc<AtomicBool>,
    state: WorkerState,
}

impl HttpWorker {
    /// Binds a new listening socket. Used when running standalone (no
    /// supervisor to inherit a socket from).
    pub fn bind(config: WorkerConfig, heartbeat: Option<HeartbeatCell>) -> Result<Self, WharfError> {
        let listener =
            TcpListener::bind(&config.bind_address).map_err(|e| WharfError::SocketUnavailable {
                address: config.bind_address.clone(),
                errno: e.raw_os_error().unwrap_or(0),
                message: e.to_string(),
            })?;
        Ok(Self::from_listener(listener, config, heartbeat))
    }

    /// Wraps an already-bound listener, as inherited from the supervisor's
    /// pre-fork phase.
    pub fn from_listener(
        listener: TcpListener,
        config: WorkerConfig,
        heartbeat: Option<HeartbeatCell>,
    ) -> Self {
        Self {
            listener,
            config,
            heartbeat,
            shutdown: Arc::new(AtomicBool::new(false)),
            state: WorkerState::Initializing,
        }
    }

    /// A handle the caller can use to request a graceful shutdown — e.g.
    /// from a signal handler installed by the supervisor in the child
    /// process.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Runs the accept loop until shutdown is requested, dispatching each
    /// request through `app`.
    pub fn run(&mut self, app: Handler<Environment, ResponseTriple>) -> Result<(), WharfError> {
        self.listener.set_nonblocking(true).map_err(|e| WharfError::SocketUnavailable {
            address: self.config.bind_address.clone(),
            errno: e.raw_os_error().unwrap_or(0),
            message: e.to_string(),
        })?;
        self.state = WorkerState::Listening;
        info!(address = %self.config.bind_address, "worker listening");

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    self.state = WorkerState::Serving;
                    self.mark_heartbeat();
                    if let Err(err) = self.serve_one(stream, addr.to_string(), &app) {
                        error!(%err, "unhandled failure serving connection");
                    }
                    self.state = WorkerState::Listening;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!(%e, "accept error");
                }
            }
        }

        self.state = WorkerState::ShuttingDown;
        info!("worker shutting down");
        self.state = WorkerState::Stopped;
        Ok(())
    }

    fn mark_heartbeat(&self) {
        if let Some(cell) = &self.heartbeat {
            cell.beat();
        }
    }

    fn serve_one(
        &self,
        mut stream: TcpStream,
        peer: String,
        app: &Handler<Environment, ResponseTriple>,
    ) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        let parser_config = ParserConfig {
            allowed_methods: self.config.allowed_methods.clone(),
            max_header_bytes: self.config.max_header_bytes,
        };

        let mut buf = Vec::with_capacity(1024);
        let mut chunk = [0u8; 1024];
        let outcome = loop {
            match parse_request(&buf, &parser_config) {
                ParseOutcome::Incomplete => {
                    let n = stream.read(&mut chunk)?;
                    if n == 0 {
                        return Ok(());
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                outcome => break outcome,
            }
        };

        match outcome {
            ParseOutcome::Complete(mut env, consumed) => {
                debug!(%peer, "request parsed");
                let content_length: usize = env
                    .get_str("HTTP_CONTENT_LENGTH")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);

                let mut body = buf[consumed..].to_vec();
                while body.len() < content_length {
                    let n = stream.read(&mut chunk)?;
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..n]);
                }
                if body.len() > content_length {
                    body.truncate(content_length);
                }

                environment::normalize_environment(&mut env, &body);
                super::stamp_adapter_fields(&mut env, &self.config.server_name, self.config.server_port);
                env.insert("REMOTE_ADDR", peer.clone());
                let stream_clone = stream.try_clone()?;
                let input: Box<dyn Read + Send> =
                    Box::new(std::io::Cursor::new(body).chain(stream_clone));
                env.insert("adapter.input", environment::EnvValue::Stream(input));

                let mut triple = app(env);
                write_response_chunked(&mut triple, &mut stream, self.config.chunk_size)
            }
            ParseOutcome::Error(code) => {
                warn!(%peer, code, "parse error");
                let mut headers = Headers::new();
                headers.insert("Connection", "close");
                let mut triple = ResponseTriple::new(code, headers, Body::from(reason_phrase(code)));
                write_response_chunked(&mut triple, &mut stream, self.config.chunk_size)
            }
            ParseOutcome::Incomplete => unreachable!("loop above only breaks on Complete or Error"),
        }
    }
}
