//! Programmatic configuration surfaces for workers and the supervisor.
//!
//! These are plain structs, not a config-file loader — file/CLI loading
//! remains the embedding application's job. The supervisor and workers only
//! ever see values constructed in-process.

use crate::http::parser::{DEFAULT_METHODS, MAX_HEADER_BYTES};

/// Configuration for a single HTTP socket worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Address the worker binds when run standalone (ignored when the
    /// listening socket is inherited from the supervisor's pre-fork phase).
    pub bind_address: String,
    /// Value copied into `SERVER_NAME` for every request.
    pub server_name: String,
    /// Value copied into `SERVER_PORT` for every request.
    pub server_port: u16,
    /// Methods accepted by the request parser; defaults to §6's set.
    pub allowed_methods: Vec<String>,
    /// Hard cap on the header block, in bytes.
    pub max_header_bytes: usize,
    /// Chunk size used when streaming a response body.
    pub chunk_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            server_name: "localhost".to_string(),
            server_port: 8080,
            allowed_methods: DEFAULT_METHODS.iter().map(|s| s.to_string()).collect(),
            max_header_bytes: MAX_HEADER_BYTES,
            chunk_size: 8192,
        }
    }
}

/// Configuration for a message-queue adapter worker.
#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    /// Address the inbound `PULL` socket connects to.
    pub pull_address: String,
    /// Address the outbound `PUSH` socket connects to.
    pub push_address: String,
    pub server_name: String,
    pub server_port: u16,
}

/// Configuration for the prefork supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Target number of worker slots.
    pub worker_count: usize,
    /// Supervising-loop sleep interval, in seconds. Clamped to a minimum of 1.
    pub interval_secs: u64,
    /// Whether stale-heartbeat detection is active. The message-queue
    /// worker always runs with this `false` (§4.6: its blocking receive
    /// cannot be polled cheaply); the HTTP worker defaults to `true`.
    pub heartbeat_enabled: bool,
}

impl SupervisorConfig {
    /// Returns the configured interval, clamped to the documented minimum
    /// of one second.
    pub fn interval(&self) -> u64 {
        self.interval_secs.max(1)
    }

    /// A heartbeat cell older than this many seconds marks its worker
    /// stalled (`interval / 2`, per §4.6).
    pub fn stall_threshold(&self) -> u64 {
        (self.interval() / 2).max(1)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            interval_secs: 2,
            heartbeat_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_has_minimum_of_one() {
        let config = SupervisorConfig {
            worker_count: 1,
            interval_secs: 0,
            ..SupervisorConfig::default()
        };
        assert_eq!(config.interval(), 1);
    }

    #[test]
    fn stall_threshold_is_half_interval() {
        let config = SupervisorConfig {
            worker_count: 1,
            interval_secs: 4,
            ..SupervisorConfig::default()
        };
        assert_eq!(config.stall_threshold(), 2);
    }

    #[test]
    fn default_worker_config_uses_spec_methods() {
        let config = WorkerConfig::default();
        assert!(config.allowed_methods.iter().any(|m| m == "GET"));
        assert_eq!(config.max_header_bytes, MAX_HEADER_BYTES);
    }
}
