// src/runtime/external_solver.rs
//! External solver backend
//!
//! Serializes the grammar, the task's examples and the search window into
//! one JSON request, writes it to a freshly spawned solver's stdin and
//! parses the JSON response from its stdout.
//!
//! Programs returned by the solver are parsed with the grammar and checked
//! against the task's request type again; the solver's own type inference
//! can be more permissive than ours, and mistyped programs are dropped.

use crate::runtime::cancellation::CancellationToken;
use crate::runtime::process_manager::{ProcessManager, SpawnConfig};
use crate::runtime::solver::{ExternalSolver, SolveRequest, SolveResult, SolverBackend};
use crate::search::frontier::{Frontier, FrontierEntry};
use crate::search::grammar::{Grammar, Production};
use crate::search::task::Example;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Grammar as seen by the solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverGrammar {
    pub log_variable: f64,
    pub productions: Vec<Production>,
}

/// Request written to the solver's stdin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverRequest {
    #[serde(rename = "DSL")]
    pub dsl: SolverGrammar,
    pub examples: Vec<Example>,
    /// Per-evaluation timeout in seconds
    pub program_timeout: Option<f64>,
    /// Whole-search timeout in whole seconds, at least 1
    pub solver_timeout: u64,
    pub maximum_frontier: usize,
    pub name: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub budget_increment: f64,
    pub verbose: bool,
}

/// One solution reported by the solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverSolution {
    pub program: String,
    pub log_likelihood: f64,
    /// Seconds from solver start to this solution
    pub time: f64,
}

/// Response read from the solver's stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverResponse {
    pub program_count: u64,
    pub solutions: Vec<SolverSolution>,
}

/// Solver timeout: the search timeout rounded to whole seconds, never below one
pub fn solver_timeout(timeout: Duration) -> u64 {
    (timeout.as_secs_f64() + 0.5).floor().max(1.0) as u64
}

impl SolverRequest {
    pub fn new<G: Grammar>(request: &SolveRequest<'_, G>, verbose: bool) -> Self {
        Self {
            dsl: SolverGrammar {
                log_variable: request.grammar.log_variable(),
                productions: request.grammar.productions(),
            },
            examples: request.task.examples().to_vec(),
            program_timeout: request.evaluation_timeout.map(|t| t.as_secs_f64()),
            solver_timeout: solver_timeout(request.timeout),
            maximum_frontier: request.maximum_frontier,
            name: request.task.name().to_string(),
            lower_bound: request.lower_bound,
            upper_bound: request.upper_bound,
            budget_increment: request.budget_increment,
            verbose,
        }
    }
}

impl SolverBackend for ExternalSolver {
    fn solve<G: Grammar>(
        &self,
        request: &SolveRequest<'_, G>,
        _cancel: &CancellationToken,
        report_child: &mut dyn FnMut(u32),
    ) -> Result<SolveResult<G::Term>> {
        let message = serde_json::to_vec(&SolverRequest::new(request, self.verbose))?;

        let mut spawn = SpawnConfig::new(&self.executable);
        spawn.args = self.args.clone();

        let mut child = ProcessManager::new().spawn(&spawn)?;
        let pid = child.id();
        report_child(pid);

        let mut stdin = child.stdin.take().ok_or_else(|| {
            EngineError::ProcessSpawnFailed(format!("solver {} has no stdin", pid))
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            EngineError::ProcessSpawnFailed(format!("solver {} has no stdout", pid))
        })?;

        // Write on a separate thread so a solver that answers before reading
        // all of its input cannot deadlock us on a full pipe.
        let mut output = Vec::new();
        let (write_result, read_result) = thread::scope(|scope| {
            let writer = scope.spawn(move || {
                let written = stdin.write_all(&message);
                drop(stdin);
                written
            });
            let read = stdout.read_to_end(&mut output);
            let written = match writer.join() {
                Ok(result) => result,
                Err(_) => Err(std::io::Error::other("stdin writer panicked")),
            };
            (written, read)
        });

        let status = child.wait()?;
        read_result?;
        if let Err(e) = write_result {
            // A solver that exits early closes its stdin; its stdout decides.
            debug!("Writing request to solver {} failed: {}", pid, e);
        }

        if !status.success() {
            warn!("Solver {} exited with {}", pid, status);
        }

        let response: SolverResponse = serde_json::from_slice(&output).map_err(|e| {
            EngineError::MalformedResponse(format!(
                "could not load response from solver {} ({}): {}",
                pid, status, e
            ))
        })?;

        decode_response(request, response)
    }
}

/// Turn a solver response into a frontier, re-checking every program's type
pub fn decode_response<G: Grammar>(
    request: &SolveRequest<'_, G>,
    response: SolverResponse,
) -> Result<SolveResult<G::Term>> {
    let task_request = request.task.request();
    let mut frontier = Frontier::new(request.task.name());
    let mut first_solution: Option<Duration> = None;

    for solution in response.solutions {
        let program = request.grammar.parse(&solution.program).map_err(|reason| {
            EngineError::UnparseableProgram {
                program: solution.program.clone(),
                reason,
            }
        })?;

        if !request.grammar.can_have_type(&program, task_request) {
            debug!(
                "Dropping solver program {} for {}: not of type {}",
                program,
                request.task.name(),
                task_request
            );
            continue;
        }

        let time = Duration::try_from_secs_f64(solution.time).map_err(|e| {
            EngineError::MalformedResponse(format!(
                "solution time {} for {}: {}",
                solution.time, solution.program, e
            ))
        })?;

        first_solution = Some(match first_solution {
            Some(best) => best.min(time),
            None => time,
        });

        let log_prior = request.grammar.log_prior(task_request, &program);
        frontier.insert(FrontierEntry::new(program, log_prior, solution.log_likelihood));
    }

    let search_time = first_solution.map(|time| time.saturating_add(request.elapsed));

    Ok(SolveResult {
        frontier,
        search_time,
        programs_explored: response.program_count,
    })
}
