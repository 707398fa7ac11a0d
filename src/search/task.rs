// src/search/task.rs
//! Synthesis tasks
//!
//! A task is owned by the caller and only read by the engine: a request
//! type, optional input/output examples (forwarded to external solvers),
//! and a scoring oracle. The oracle may be expensive and may not terminate
//! on its own; it receives an evaluation timeout and is expected to honor
//! it by returning an invalid score.

use crate::search::grammar::Grammar;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Input/output example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub inputs: Vec<serde_json::Value>,
    pub output: serde_json::Value,
}

impl Example {
    pub fn new(inputs: Vec<serde_json::Value>, output: serde_json::Value) -> Self {
        Self { inputs, output }
    }
}

/// Synthesis task scored by an oracle
pub trait Task<G: Grammar + ?Sized>: Send + Sync {
    /// Task name, used in logs and reports
    fn name(&self) -> &str;

    /// Type every solution must have
    fn request(&self) -> &G::Type;

    /// Examples describing the task
    fn examples(&self) -> &[Example] {
        &[]
    }

    /// Log likelihood of the task given `term`.
    ///
    /// Any non-finite value means the term does not solve the task; this
    /// includes evaluations that ran past `timeout`.
    fn log_likelihood(&self, term: &G::Term, timeout: Option<Duration>) -> f64;
}

/// Whether an oracle score counts as a solution
pub fn is_valid(log_likelihood: f64) -> bool {
    log_likelihood.is_finite()
}
