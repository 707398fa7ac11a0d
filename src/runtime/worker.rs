// src/runtime/worker.rs
//! Search workers
//!
//! A worker is a named OS thread that runs one backend search for one
//! budget window and reports back over the scheduler's channel:
//!
//! - `Fork` for every child process the backend starts (sent immediately)
//! - `Success` with the search result, or
//! - `Failure` with the error (panics included)
//!
//! A cancelled worker stays silent; the coordinator has already forgotten it.

use crate::runtime::cancellation::CancellationToken;
use crate::runtime::isolated::panic_message;
use crate::runtime::process_manager::ProcessManager;
use crate::runtime::solver::{SolveRequest, SolveResult, Solver, SolverBackend};
use crate::search::grammar::Grammar;
use crate::search::task::Task;
use crate::utils::errors::{EngineError, Result};
use crossbeam_channel::Sender;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// Worker identifier, unique within one scheduler run
pub type WorkerId = u64;

/// Message from a worker to the coordinator
#[derive(Debug)]
pub enum WorkerMessage<T> {
    /// The worker started a child process
    Fork { worker: WorkerId, child: u32 },

    /// The search finished
    Success {
        worker: WorkerId,
        result: SolveResult<T>,
    },

    /// The search failed
    Failure { worker: WorkerId, error: EngineError },
}

impl<T> WorkerMessage<T> {
    pub fn worker(&self) -> WorkerId {
        match self {
            WorkerMessage::Fork { worker, .. }
            | WorkerMessage::Success { worker, .. }
            | WorkerMessage::Failure { worker, .. } => *worker,
        }
    }
}

/// Immutable snapshot handed to a worker at launch
pub struct WorkerJob<G: Grammar> {
    pub worker: WorkerId,
    pub grammar: Arc<G>,
    pub task: Arc<dyn Task<G>>,
    pub elapsed: Duration,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub budget_increment: f64,
    pub timeout: Duration,
    pub evaluation_timeout: Option<Duration>,
    pub maximum_frontier: usize,
}

impl<G: Grammar> WorkerJob<G> {
    fn request(&self) -> SolveRequest<'_, G> {
        SolveRequest {
            grammar: self.grammar.as_ref(),
            task: self.task.as_ref(),
            elapsed: self.elapsed,
            lower_bound: self.lower_bound,
            upper_bound: self.upper_bound,
            budget_increment: self.budget_increment,
            timeout: self.timeout,
            evaluation_timeout: self.evaluation_timeout,
            maximum_frontier: self.maximum_frontier,
        }
    }
}

/// Handle kept by the coordinator for a running worker
pub struct WorkerHandle {
    pub id: WorkerId,
    pub cancel: CancellationToken,
    pub thread: JoinHandle<()>,
}

/// Start a worker thread for `job`
pub fn spawn_worker<G: Grammar>(
    solver: Arc<Solver>,
    job: WorkerJob<G>,
    sender: Sender<WorkerMessage<G::Term>>,
) -> Result<WorkerHandle> {
    let id = job.worker;
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let thread = thread::Builder::new()
        .name(format!("synth-worker-{}", id))
        .spawn(move || run_worker(&solver, &job, &token, &sender))?;

    Ok(WorkerHandle { id, cancel, thread })
}

fn run_worker<G: Grammar>(
    solver: &Solver,
    job: &WorkerJob<G>,
    cancel: &CancellationToken,
    sender: &Sender<WorkerMessage<G::Term>>,
) {
    let worker = job.worker;
    debug!(
        "Worker {} searching {} in ({}, {}]",
        worker,
        job.task.name(),
        job.lower_bound,
        job.upper_bound
    );

    let mut report_child = |child: u32| {
        let delivered = sender.send(WorkerMessage::Fork { worker, child }).is_ok();
        if !delivered || cancel.is_cancelled() {
            let _ = ProcessManager::new().kill(child);
        }
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        solver.solve(&job.request(), cancel, &mut report_child)
    }));

    let message = match outcome {
        Ok(Ok(result)) => WorkerMessage::Success { worker, result },
        Ok(Err(error)) => WorkerMessage::Failure { worker, error },
        Err(payload) => WorkerMessage::Failure {
            worker,
            error: EngineError::WorkerPanicked(panic_message(payload.as_ref())),
        },
    };

    if cancel.is_cancelled() {
        trace!("Worker {} cancelled, dropping its result", worker);
        return;
    }

    if sender.send(message).is_err() {
        trace!("Worker {} finished after the scheduler shut down", worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fixtures::{Literal, LiteralGrammar, LiteralType, PredicateTask};
    use crossbeam_channel::unbounded;

    fn job(task: PredicateTask) -> WorkerJob<LiteralGrammar> {
        WorkerJob {
            worker: 7,
            grammar: Arc::new(LiteralGrammar::new()),
            task: Arc::new(task),
            elapsed: Duration::ZERO,
            lower_bound: 0.0,
            upper_bound: 3.0,
            budget_increment: 3.0,
            timeout: Duration::from_secs(5),
            evaluation_timeout: None,
            maximum_frontier: 5,
        }
    }

    #[test]
    fn test_worker_reports_success() {
        let (sender, receiver) = unbounded();
        let task = PredicateTask::accepting("small", LiteralType::Int, vec![Literal::Int(1)]);

        let handle = spawn_worker(Arc::new(Solver::InProcess), job(task), sender).unwrap();
        assert_eq!(handle.id, 7);
        handle.thread.join().unwrap();

        match receiver.recv().unwrap() {
            WorkerMessage::Success { worker, result } => {
                assert_eq!(worker, 7);
                assert_eq!(result.frontier.len(), 1);
                assert_eq!(result.programs_explored, 3);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_worker_reports_panic_as_failure() {
        let (sender, receiver) = unbounded();
        let task = PredicateTask::new("explodes", LiteralType::Int, |_| panic!("oracle bug"));

        let handle = spawn_worker(Arc::new(Solver::InProcess), job(task), sender).unwrap();
        handle.thread.join().unwrap();

        let message = receiver.recv().unwrap();
        assert_eq!(message.worker(), 7);
        match message {
            WorkerMessage::Failure {
                error: EngineError::WorkerPanicked(reason),
                ..
            } => assert!(reason.contains("oracle bug")),
            other => panic!("expected panic failure, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_worker_stays_silent() {
        let (sender, receiver) = unbounded();
        let task = PredicateTask::accepting("slow", LiteralType::Int, vec![])
            .with_evaluation_delay(Duration::from_millis(20));

        let handle = spawn_worker(Arc::new(Solver::InProcess), job(task), sender).unwrap();
        handle.cancel.cancel();
        handle.thread.join().unwrap();

        assert!(receiver.try_recv().is_err());
    }
}
