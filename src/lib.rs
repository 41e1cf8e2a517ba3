//! # streamproc
//!
//! A streaming record processor: a deadline-aware loader/worker pipeline
//! that decodes one source artifact into records, dispatches each record
//! through a user-supplied [`processor::Processor`] under concurrency and
//! deadline limits, and routes outcomes to durable retry/corruption/
//! destination sinks.
//!
//! ## Design Philosophy
//!
//! - **Library-first** — no CLI or binary target, purely a crate for embedding.
//! - **At-least-once, not exactly-once** — progress is encoded in the
//!   retry-fragment of output URLs, not in any persisted checkpoint.
//! - **Deadline-aware** — a loader deadline and a worker deadline, both
//!   derived from one request deadline, bound admission and processing.
//!
//! ## Quick Start
//!
//! ```no_run
//! use streamproc::{Config, Service};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         sink: streamproc::config::SinkConfig {
//!             retry_url: "mem://retry".into(),
//!             failed_url: "mem://failed".into(),
//!             corruption_url: "mem://corrupted".into(),
//!         },
//!         ..Config::default()
//!     };
//!     config.validate()?;
//!     let _service = Service::new(config)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Reference request adapters (mem://, file:// trigger helpers)
pub mod adapter;
/// Metrics HTTP endpoint
pub mod api;
/// Configuration types
pub mod config;
/// Deadline computation (request deadline, loader/worker sub-deadlines)
pub mod deadline;
/// Error types
pub mod error;
/// Streaming line/record loader
pub mod loader;
/// Processor interface (`Process`/`Pre`/`Post`, Handler variant)
pub mod processor;
/// Quorum-merge precondition step
pub mod quorum;
/// Reporter aggregating per-record counters and bounded error log
pub mod reporter;
/// Record representation and row-type registry
pub mod record;
/// Encoded resource string parsing
pub mod resource;
/// Request type
pub mod request;
/// Top-level orchestration (`Service::process`)
pub mod service;
/// Lazy, mutex-serialized sink writer
pub mod sink;
/// Sort/group/batch pre-processor
pub mod sort;
/// Object-store URL resolution helpers
pub mod store;
/// URL template expansion and retry-fragment accounting
pub mod url;
/// Fixed-size concurrent worker pool
pub mod worker;

pub use config::Config;
pub use error::{ApiError, Error, ErrorDetail, ProcessError, Result, ToHttpStatus};
pub use processor::{Handler, PostProcessor, PreProcessor, Processor};
pub use record::{Record, RowTypeRegistry, TypedRecord};
pub use reporter::{ErrorKindBit, Reporter, Response};
pub use request::Request;
pub use service::Service;

/// Helper function to run a [`Service`]'s metrics endpoint with graceful
/// signal handling.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn wait_for_signal() {
    imp::wait_for_signal().await
}

#[cfg(unix)]
mod imp {
    pub async fn wait_for_signal() {
        use tokio::signal::unix::{SignalKind, signal};

        let sigterm_result = signal(SignalKind::terminate());
        let sigint_result = signal(SignalKind::interrupt());

        match (sigterm_result, sigint_result) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("received SIGTERM");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("received SIGINT");
                    }
                }
            }
            (Err(e), _) => {
                tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for SIGINT only");
                if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                    sigint.recv().await;
                    tracing::info!("received SIGINT");
                } else {
                    tokio::signal::ctrl_c().await.ok();
                }
            }
            (_, Err(e)) => {
                tracing::warn!(error = %e, "could not register SIGINT handler, waiting for SIGTERM only");
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("received SIGTERM");
                } else {
                    tokio::signal::ctrl_c().await.ok();
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub async fn wait_for_signal() {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("received Ctrl+C"),
            Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
        }
    }
}
