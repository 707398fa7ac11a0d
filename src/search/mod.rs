// src/search/mod.rs
//! Per-task search
//!
//! - **Grammar**: the consumed term-enumerator interface
//! - **Task**: request type, examples and scoring oracle
//! - **Frontier**: deduplicated, scored solutions of one task
//! - **Enumeration**: the anytime, budget-windowed search for one task
//! - **Fixtures**: a deterministic literal grammar for tests and benchmarks

pub mod enumeration;
pub mod fixtures;
pub mod frontier;
pub mod grammar;
pub mod task;

pub use enumeration::{
    enumerate_for_task, solve_single_task, EnumerationOutcome, EnumerationParams, StopReason,
};
pub use frontier::{Frontier, FrontierEntry};
pub use grammar::{Candidate, Grammar, Production, Term};
pub use task::{Example, Task};
