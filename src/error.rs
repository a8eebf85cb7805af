//! Error taxonomy for pipeline construction, transport, and supervisor failures.
//!
//! Parse errors are deliberately **not** part of this enum: per the request
//! parser's contract they are represented as a bare `u16` HTTP status and
//! recovered locally by the worker (an error response is written and the
//! connection closed), never propagated as a typed error.

use thiserror::Error;

/// Errors raised by pipeline construction, workers, and the supervisor.
#[derive(Debug, Error)]
pub enum WharfError {
    /// Raised by [`crate::pipeline::PipelineBuilder::build`] when no endpoint has been set.
    #[error("pipeline has no endpoint set")]
    NoEndpoint,

    /// Reserved for dynamic/reflection-based construction paths (e.g. a
    /// scripting-language embedding) that accept untyped middleware or
    /// endpoint values at runtime. The typed builder API in this crate
    /// rejects such values at compile time, so this variant is not raised
    /// by [`crate::pipeline`] itself.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A worker failed to bind its listening socket. Fatal to the worker;
    /// the supervisor respawns it.
    #[error("failed to bind {address}: {message} (errno {errno})")]
    SocketUnavailable {
        address: String,
        errno: i32,
        message: String,
    },

    /// The prefork supervisor could not fork a child, or another
    /// unrecoverable supervisor-level failure occurred.
    #[error("supervisor failure: {0}")]
    Supervisor(String),
}
