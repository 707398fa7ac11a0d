// src/search/enumeration.rs
//! Anytime enumeration for a single task
//!
//! Explores terms in order of increasing description length by widening a
//! window `(previous_budget, budget]` one budget increment at a time. Every
//! candidate is scored by the task oracle; valid ones join the frontier.
//! The search can be interrupted at any candidate boundary (deadline or
//! cancellation) and always returns what it has found so far.
//!
//! ```text
//!  lower                                                        upper
//!    |----(window 1]----(window 2]----(window 3]---- ... ----|
//!         score each      score each     deadline hit:
//!         candidate       candidate      return partial frontier
//! ```

use crate::runtime::cancellation::CancellationToken;
use crate::search::frontier::{Frontier, FrontierEntry};
use crate::search::grammar::Grammar;
use crate::search::task::{is_valid, Task};
use crate::utils::errors::{EngineError, Result};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Maximum term depth requested from the enumerator
pub const DEFAULT_MAX_DEPTH: usize = 99;

/// Parameters of one anytime search
#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationParams {
    /// Description length already explored
    pub lower_bound: f64,

    /// Description length at which the search gives up
    pub upper_bound: f64,

    /// Window width
    pub budget_increment: f64,

    /// Number of solutions after which the search stops
    pub maximum_frontier: usize,

    /// Wall-clock budget for the whole search
    pub timeout: Option<Duration>,

    /// Budget for each oracle call
    pub evaluation_timeout: Option<Duration>,

    pub max_depth: usize,
}

impl Default for EnumerationParams {
    fn default() -> Self {
        Self {
            lower_bound: 0.0,
            upper_bound: 100.0,
            budget_increment: 1.0,
            maximum_frontier: 100,
            timeout: None,
            evaluation_timeout: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Why a search stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Enough solutions were found
    FrontierFull,
    /// The next window would start past the upper bound
    UpperBoundReached,
    /// The wall-clock budget ran out
    TimedOut,
    /// The cancellation token was triggered
    Cancelled,
}

/// Result of one anytime search
#[derive(Debug, Clone)]
pub struct EnumerationOutcome<T> {
    /// Best solutions found, at most `maximum_frontier` of them
    pub frontier: Frontier<T>,

    /// Time from the start of this search to its first solution
    pub time_to_first_solution: Option<Duration>,

    /// Candidates scored across all windows
    pub programs_explored: u64,

    pub stop_reason: StopReason,
}

/// Run the anytime enumeration algorithm for one task
pub fn enumerate_for_task<G: Grammar>(
    grammar: &G,
    task: &dyn Task<G>,
    params: &EnumerationParams,
    cancel: &CancellationToken,
) -> Result<EnumerationOutcome<G::Term>> {
    if !params.budget_increment.is_finite() || params.budget_increment <= 0.0 {
        return Err(EngineError::InvalidConfig(format!(
            "budget increment must be positive, got {}",
            params.budget_increment
        )));
    }

    let started = Instant::now();
    let deadline = params.timeout.and_then(|timeout| started.checked_add(timeout));
    let context = G::Context::default();

    let mut frontier = Frontier::new(task.name());
    let mut time_to_first_solution = None;
    let mut programs_explored = 0u64;
    let mut interrupted = None;

    let mut previous_budget = params.lower_bound;
    let mut budget = params.lower_bound + params.budget_increment;

    'search: while frontier.len() < params.maximum_frontier {
        let mut window_programs = 0u64;

        for candidate in grammar.enumerate(
            &context,
            &[],
            task.request(),
            previous_budget,
            budget,
            params.max_depth,
        ) {
            let description_length = candidate.description_length;
            if !(description_length > previous_budget && description_length <= budget) {
                return Err(EngineError::EnumeratorContract {
                    description_length,
                    lower_bound: previous_budget,
                    upper_bound: budget,
                });
            }

            window_programs += 1;
            programs_explored += 1;

            let log_likelihood = task.log_likelihood(&candidate.term, params.evaluation_timeout);
            if is_valid(log_likelihood) {
                trace!(
                    "Hit {} with {} (prior {}) after {:?}",
                    task.name(),
                    candidate.term,
                    candidate.log_prior(),
                    started.elapsed()
                );
                if time_to_first_solution.is_none() {
                    time_to_first_solution = Some(started.elapsed());
                }
                frontier.insert(FrontierEntry::new(
                    candidate.term,
                    -description_length,
                    log_likelihood,
                ));
            }

            if deadline.is_some_and(|deadline| Instant::now() > deadline) {
                interrupted = Some(StopReason::TimedOut);
                break 'search;
            }
            if cancel.is_cancelled() {
                interrupted = Some(StopReason::Cancelled);
                break 'search;
            }
        }

        debug!(
            "Enumerated {} programs of {} satisfying {} < MDL <= {}",
            window_programs,
            task.name(),
            previous_budget,
            budget
        );

        previous_budget = budget;
        budget += params.budget_increment;
        if budget > params.upper_bound {
            break;
        }
    }

    let stop_reason = match interrupted {
        Some(reason) => reason,
        None if frontier.len() >= params.maximum_frontier => StopReason::FrontierFull,
        None => StopReason::UpperBoundReached,
    };

    if stop_reason == StopReason::TimedOut {
        debug!(
            "Timeout triggered after {:?} for task {}",
            started.elapsed(),
            task.name()
        );
    }

    Ok(EnumerationOutcome {
        frontier: frontier.top_k(params.maximum_frontier),
        time_to_first_solution,
        programs_explored,
        stop_reason,
    })
}

/// Find any one solution by iterative deepening.
///
/// Explores unit-wide windows up to `maximum_budget` and returns the first
/// valid term, or `None` if there is none within the budget.
pub fn solve_single_task<G: Grammar>(
    grammar: &G,
    task: &dyn Task<G>,
    maximum_budget: f64,
    evaluation_timeout: Option<Duration>,
) -> Result<Option<FrontierEntry<G::Term>>> {
    let params = EnumerationParams {
        lower_bound: 0.0,
        upper_bound: maximum_budget,
        budget_increment: 1.0,
        maximum_frontier: 1,
        timeout: None,
        evaluation_timeout,
        max_depth: DEFAULT_MAX_DEPTH,
    };
    let outcome = enumerate_for_task(grammar, task, &params, &CancellationToken::new())?;
    Ok(outcome.frontier.entries().first().cloned())
}
