//! # wharf
//!
//! The core of a small web-application server runtime: a middleware
//! pipeline builder, plus a prefork multi-worker daemon that serves
//! requests over a raw HTTP/1.1 socket or a message-queue adapter.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wharf::config::WorkerConfig;
//! use wharf::environment::Environment;
//! use wharf::http::{Body, Headers, ResponseTriple};
//! use wharf::pipeline::PipelineBuilder;
//! use wharf::worker::http_worker::HttpWorker;
//!
//! let mut pipeline: PipelineBuilder<Environment, ResponseTriple> = PipelineBuilder::new();
//! pipeline.set_endpoint(Arc::new(|_env: Environment| {
//!     ResponseTriple::new(200, Headers::new(), Body::from("Hello, World!"))
//! }));
//!
//! let mut worker = HttpWorker::bind(WorkerConfig::default(), None)?;
//! worker.run(pipeline.build()?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod supervisor;
pub mod worker;

pub use config::{QueueWorkerConfig, SupervisorConfig, WorkerConfig};
pub use environment::{EnvValue, Environment};
pub use error::WharfError;
pub use pipeline::{Handler, Layer, PipelineBuilder};
