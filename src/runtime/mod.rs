// src/runtime/mod.rs
//! Search execution runtime
//!
//! This module runs searches and keeps them under control:
//!
//! - **Scheduler**: budgeted multi-task enumeration over a worker pool
//! - **Workers**: one thread per search window, reporting over a channel
//! - **Solvers**: in-process, forked-process and external-executable backends
//! - **Process Manager**: spawning and killing solver process groups
//! - **Resource Limiter**: rlimits for forked workers
//! - **Benchmark / Batching**: synthesis-time benchmark and task batchers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 EnumerationScheduler                    │
//! │   per-task: frontier, stopwatch, lower bound            │
//! │                      ▲                                  │
//! │                      │  Fork / Success / Failure        │
//! │         ┌────────────┼────────────┐                     │
//! │  ┌──────┴───┐  ┌─────┴────┐  ┌────┴─────┐               │
//! │  │ worker 0 │  │ worker 1 │  │ worker 2 │  ... (cpus)   │
//! │  └────┬─────┘  └────┬─────┘  └────┬─────┘               │
//! │       │ in-process  │ fork()      │ ./solver (JSON)     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod batching;
pub mod benchmark;
pub mod cancellation;
pub mod external_solver;
pub mod isolated;
pub mod process_manager;
pub mod resource_limiter;
pub mod scheduler;
pub mod solver;
pub mod worker;

// Re-export commonly used types
pub use batching::{RandomBatcher, SequentialBatcher, ShuffledBatcher, TaskBatcher, UnsolvedBatcher};
pub use benchmark::{benchmark_synthesis_times, BenchmarkSummary, MeanWithError};
pub use cancellation::CancellationToken;
pub use process_manager::{ProcessManager, SpawnConfig};
pub use resource_limiter::ResourceLimits;
pub use scheduler::{
    multithreaded_enumeration, EnumerationReport, EnumerationScheduler, GrammarAssignment,
    TaskSummary,
};
pub use solver::{
    ExternalSolver, InProcessSolver, IsolatedSolver, SolveRequest, SolveResult, Solver,
    SolverBackend,
};
