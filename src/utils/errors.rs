// src/utils/errors.rs
//! Error types for the enumeration engine
//!
//! Search outcomes (invalid programs, evaluation timeouts, exhausted
//! enumeration budgets) are not errors and never show up here. This enum
//! covers configuration problems, backend protocol failures, and worker
//! faults.

use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the enumeration engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The grammar produced a candidate outside the requested window
    #[error(
        "Enumerator returned description length {description_length} outside ({lower_bound}, {upper_bound}]"
    )]
    EnumeratorContract {
        description_length: f64,
        lower_bound: f64,
        upper_bound: f64,
    },

    /// A solver or worker process could not be started
    #[error("Failed to spawn process: {0}")]
    ProcessSpawnFailed(String),

    /// The external solver replied with something other than a valid response
    #[error("Malformed solver response: {0}")]
    MalformedResponse(String),

    /// The external solver returned program text the grammar cannot parse
    #[error("Could not parse solver program '{program}': {reason}")]
    UnparseableProgram { program: String, reason: String },

    /// A worker process exited without producing a reply
    #[error("Worker process {pid} terminated before replying: {status}")]
    WorkerTerminated { pid: u32, status: String },

    /// A worker process reported an error from its own search
    #[error("Worker process failed: {0}")]
    ChildFailed(String),

    /// A worker thread panicked
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Operating system call failed
    #[error("System error: {0}")]
    System(#[from] nix::errno::Errno),

    /// Observability could not be initialised
    #[error("Observability setup failed: {0}")]
    Observability(String),

    /// A worker failed in a way that aborts the whole run
    #[error("Worker for task '{task}' failed: {source}")]
    WorkerFailed {
        task: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Whether a worker failure only invalidates that one search attempt.
    ///
    /// Backend protocol failures are recoverable; everything else points at
    /// a logic defect and aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::MalformedResponse(_)
                | EngineError::UnparseableProgram { .. }
                | EngineError::WorkerTerminated { .. }
        )
    }
}
