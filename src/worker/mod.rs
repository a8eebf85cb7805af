//! Request-serving workers: the HTTP socket variant and the message-queue
//! adapter variant.
//!
//! Each worker is a sequential accept/parse/dispatch/respond loop running in
//! its own process (or, run standalone, the calling thread). No state is
//! shared between workers; the pipeline handler is built fresh inside each
//! worker's `run`.

pub mod http_worker;
pub mod queue_worker;

use crate::environment::Environment;

/// Lifecycle states for the HTTP socket worker (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Initializing,
    Listening,
    Serving,
    ShuttingDown,
    Stopped,
}

/// Crate version string stamped into `adapter.version` for every request.
pub const ADAPTER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Adapter name stamped into `adapter.name`.
pub const ADAPTER_NAME: &str = "wharf";

/// Populates the worker-owned fields of an environment that are identical
/// across both worker variants: server identity, the adapter
/// self-description, and the URL scheme.
pub fn stamp_adapter_fields(env: &mut Environment, server_name: &str, server_port: u16) {
    env.insert("SERVER_NAME", server_name);
    env.insert("SERVER_PORT", server_port as i64);
    env.insert("adapter.version", ADAPTER_VERSION);
    env.insert("adapter.name", ADAPTER_NAME);
    env.insert("adapter.url_scheme", "http");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_adapter_fields_sets_expected_keys() {
        let mut env = Environment::new();
        stamp_adapter_fields(&mut env, "localhost", 8080);
        assert_eq!(env.get_str("SERVER_NAME"), Some("localhost"));
        assert_eq!(env.get_int("SERVER_PORT"), Some(8080));
        assert_eq!(env.get_str("adapter.name"), Some(ADAPTER_NAME));
        assert_eq!(env.get_str("adapter.url_scheme"), Some("http"));
    }
}
