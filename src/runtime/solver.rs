// src/runtime/solver.rs
//! Solver backends
//!
//! A backend runs the anytime enumeration for one task over one budget
//! window and reports `(frontier, search time, programs explored)`. Three
//! backends are available:
//!
//! - **In-process**: runs the search on the calling worker thread
//! - **Isolated**: forks a worker process per search (memory/CPU isolation)
//! - **External**: drives a foreign solver executable over a JSON protocol
//!
//! Backends that start OS processes hand every process id to `report_child`
//! before blocking, so the scheduler can kill them on cancellation.

use crate::runtime::cancellation::CancellationToken;
use crate::runtime::resource_limiter::ResourceLimits;
use crate::search::enumeration::{enumerate_for_task, EnumerationParams, DEFAULT_MAX_DEPTH};
use crate::search::frontier::Frontier;
use crate::search::grammar::{Grammar, Term};
use crate::search::task::Task;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Everything a backend needs to search one budget window of one task
pub struct SolveRequest<'a, G: Grammar> {
    pub grammar: &'a G,

    pub task: &'a dyn Task<G>,

    /// Time already charged to the task when this search was launched
    pub elapsed: Duration,

    pub lower_bound: f64,

    pub upper_bound: f64,

    pub budget_increment: f64,

    /// Wall-clock budget left for the task
    pub timeout: Duration,

    /// Budget for each oracle call
    pub evaluation_timeout: Option<Duration>,

    /// Number of solutions still wanted
    pub maximum_frontier: usize,
}

impl<'a, G: Grammar> SolveRequest<'a, G> {
    pub fn enumeration_params(&self) -> EnumerationParams {
        EnumerationParams {
            lower_bound: self.lower_bound,
            upper_bound: self.upper_bound,
            budget_increment: self.budget_increment,
            maximum_frontier: self.maximum_frontier,
            timeout: Some(self.timeout),
            evaluation_timeout: self.evaluation_timeout,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// What one search reports back to the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Term")]
pub struct SolveResult<T> {
    pub frontier: Frontier<T>,

    /// Time to first solution, measured on the task's stopwatch
    pub search_time: Option<Duration>,

    pub programs_explored: u64,
}

/// Shared contract of every backend
pub trait SolverBackend {
    fn solve<G: Grammar>(
        &self,
        request: &SolveRequest<'_, G>,
        cancel: &CancellationToken,
        report_child: &mut dyn FnMut(u32),
    ) -> Result<SolveResult<G::Term>>;
}

/// Runs the search on the calling thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InProcessSolver;

impl SolverBackend for InProcessSolver {
    fn solve<G: Grammar>(
        &self,
        request: &SolveRequest<'_, G>,
        cancel: &CancellationToken,
        _report_child: &mut dyn FnMut(u32),
    ) -> Result<SolveResult<G::Term>> {
        let outcome = enumerate_for_task(
            request.grammar,
            request.task,
            &request.enumeration_params(),
            cancel,
        )?;

        Ok(SolveResult {
            frontier: outcome.frontier,
            search_time: outcome
                .time_to_first_solution
                .map(|time| time + request.elapsed),
            programs_explored: outcome.programs_explored,
        })
    }
}

/// Forks a worker process for every search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsolatedSolver {
    /// Limits applied inside the worker process
    #[serde(default)]
    pub limits: ResourceLimits,
}

/// Foreign solver executable speaking the JSON protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSolver {
    /// Path of the solver executable
    #[serde(default = "default_solver_executable")]
    pub executable: PathBuf,

    /// Extra command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Ask the solver for verbose diagnostics on its stderr
    #[serde(default)]
    pub verbose: bool,
}

fn default_solver_executable() -> PathBuf {
    PathBuf::from("./solver")
}

impl Default for ExternalSolver {
    fn default() -> Self {
        Self {
            executable: default_solver_executable(),
            args: Vec::new(),
            verbose: false,
        }
    }
}

impl ExternalSolver {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }
}

/// Backend selector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Solver {
    #[default]
    InProcess,
    Isolated(IsolatedSolver),
    External(ExternalSolver),
}

impl Solver {
    pub fn name(&self) -> &'static str {
        match self {
            Solver::InProcess => "in_process",
            Solver::Isolated(_) => "isolated",
            Solver::External(_) => "external",
        }
    }

    /// Validate backend settings
    pub fn validate(&self) -> Result<()> {
        match self {
            Solver::InProcess => Ok(()),
            Solver::Isolated(isolated) => isolated.limits.validate(),
            Solver::External(external) => {
                if external.executable.as_os_str().is_empty() {
                    return Err(EngineError::InvalidConfig(
                        "external solver executable cannot be empty".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

impl SolverBackend for Solver {
    fn solve<G: Grammar>(
        &self,
        request: &SolveRequest<'_, G>,
        cancel: &CancellationToken,
        report_child: &mut dyn FnMut(u32),
    ) -> Result<SolveResult<G::Term>> {
        match self {
            Solver::InProcess => InProcessSolver.solve(request, cancel, report_child),
            Solver::Isolated(isolated) => isolated.solve(request, cancel, report_child),
            Solver::External(external) => external.solve(request, cancel, report_child),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fixtures::{Literal, LiteralGrammar, LiteralType, PredicateTask};

    fn request<'a>(
        grammar: &'a LiteralGrammar,
        task: &'a PredicateTask,
        elapsed: Duration,
    ) -> SolveRequest<'a, LiteralGrammar> {
        SolveRequest {
            grammar,
            task,
            elapsed,
            lower_bound: 0.0,
            upper_bound: 10.0,
            budget_increment: 1.0,
            timeout: Duration::from_secs(10),
            evaluation_timeout: None,
            maximum_frontier: 1,
        }
    }

    #[test]
    fn test_in_process_offsets_search_time() {
        let grammar = LiteralGrammar::new();
        let task = PredicateTask::accepting("three", LiteralType::Int, vec![Literal::Int(3)]);
        let elapsed = Duration::from_secs(7);

        let mut children = Vec::new();
        let result = InProcessSolver
            .solve(
                &request(&grammar, &task, elapsed),
                &CancellationToken::new(),
                &mut |pid| children.push(pid),
            )
            .unwrap();

        assert_eq!(result.frontier.len(), 1);
        assert_eq!(result.programs_explored, 4);
        assert!(result.search_time.unwrap() >= elapsed);
        assert!(children.is_empty());
    }

    #[test]
    fn test_request_params() {
        let grammar = LiteralGrammar::new();
        let task = PredicateTask::accepting("t", LiteralType::Bool, vec![]);
        let params = request(&grammar, &task, Duration::ZERO).enumeration_params();

        assert_eq!(params.upper_bound, 10.0);
        assert_eq!(params.timeout, Some(Duration::from_secs(10)));
        assert_eq!(params.maximum_frontier, 1);
    }

    #[test]
    fn test_solver_serde_tags() {
        let solver: Solver = serde_json::from_str(r#"{"kind":"in_process"}"#).unwrap();
        assert_eq!(solver, Solver::InProcess);

        let solver: Solver =
            serde_json::from_str(r#"{"kind":"external","executable":"/bin/solver"}"#).unwrap();
        assert_eq!(solver, Solver::External(ExternalSolver::new("/bin/solver")));

        let solver: Solver =
            serde_json::from_str(r#"{"kind":"isolated","limits":{"memory_limit_mb":2048}}"#)
                .unwrap();
        match solver {
            Solver::Isolated(isolated) => {
                assert_eq!(isolated.limits.memory_limit_mb, Some(2048))
            }
            other => panic!("expected isolated solver, got {:?}", other),
        }
    }

    #[test]
    fn test_validate() {
        assert!(Solver::InProcess.validate().is_ok());
        assert!(Solver::External(ExternalSolver::new("")).validate().is_err());

        let isolated = Solver::Isolated(IsolatedSolver {
            limits: ResourceLimits {
                memory_limit_mb: Some(1),
                cpu_time_secs: None,
            },
        });
        assert!(isolated.validate().is_err());
    }
}
