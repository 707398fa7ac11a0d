// src/lib.rs
//! Synth Engine Library
//!
//! Budgeted, multi-task enumeration for typed program synthesis: every
//! task gets a wall-clock budget, a growing description-length window and
//! a frontier of the best programs found so far, while a fixed pool of
//! workers is spread over the tasks that have been explored least.
//!
//! # Architecture
//!
//! - **search**: grammar and task interfaces, frontiers, anytime enumeration
//! - **runtime**: scheduler, workers, solver backends, process control
//! - **observability**: tracing and metrics setup
//! - **utils**: errors, configuration, stopwatch
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use synth_engine::search::fixtures::{Literal, LiteralGrammar, LiteralType, PredicateTask};
//! use synth_engine::{multithreaded_enumeration, EngineConfig, Task};
//!
//! let config = EngineConfig::load()?;
//! let tasks: Vec<Arc<dyn Task<LiteralGrammar>>> = vec![Arc::new(
//!     PredicateTask::accepting("seven", LiteralType::Int, vec![Literal::Int(7)]),
//! )];
//! let report = multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &tasks, config.scheduler)?;
//! println!("solved {} tasks", report.solved());
//! # Ok::<(), synth_engine::EngineError>(())
//! ```

// Public module exports
pub mod observability;
pub mod runtime;
pub mod search;
pub mod utils;

// Re-export commonly used types
pub use runtime::scheduler::{multithreaded_enumeration, EnumerationReport, EnumerationScheduler};
pub use runtime::solver::Solver;
pub use search::{Frontier, FrontierEntry, Grammar, Task};
pub use utils::config::{EngineConfig, SchedulerConfig};
pub use utils::errors::{EngineError, Result};
pub use utils::stopwatch::Stopwatch;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
