// src/runtime/scheduler.rs
//! Multi-task enumeration scheduler
//!
//! One coordinating thread owns all per-task state (frontier, stopwatch,
//! lower bound, best search time) and a pool of at most `cpus` workers.
//! Workers get an immutable snapshot at launch and talk back over a single
//! channel; they never touch shared state.
//!
//! # Main loop
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            │ retire tasks that are full or out of time    │
//!            │ launch workers, smallest lower bound first   │
//!            │ wait for a message (or the poll interval)    │
//!            │   Fork    → remember child for cancellation  │
//!            │   Success → merge frontier, maybe retire     │
//!            │   Failure → drop attempt, or abort the run   │
//!            │ watchdog: cancel workers far past deadline   │
//!            └──────────────────────────────────────────────┘
//! ```
//!
//! Each launch advances the task's lower bound by one budget increment, so
//! successive workers for a task search disjoint windows.
//!
//! # Cancellation races
//!
//! A worker may finish just as its task is retired. Messages from workers
//! the coordinator no longer tracks are ignored, except `Fork`, whose child
//! is killed on arrival.

use crate::observability::{
    PROGRAMS_EXPLORED, TASKS_SOLVED, WORKERS_CANCELLED, WORKERS_IN_FLIGHT, WORKERS_LAUNCHED,
    WORKER_FAILURES,
};
use crate::runtime::cancellation::CancellationToken;
use crate::runtime::process_manager::ProcessManager;
use crate::runtime::solver::{SolveResult, Solver};
use crate::runtime::worker::{spawn_worker, WorkerId, WorkerJob, WorkerMessage};
use crate::search::frontier::Frontier;
use crate::search::grammar::Grammar;
use crate::search::task::Task;
use crate::utils::config::SchedulerConfig;
use crate::utils::errors::{EngineError, Result};
use crate::utils::stopwatch::Stopwatch;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use ulid::Ulid;

/// Which grammar each task is searched with
pub enum GrammarAssignment<G> {
    /// One grammar for every task
    Shared(Arc<G>),

    /// A grammar per task, keyed by task name
    PerTask(HashMap<String, Arc<G>>),
}

impl<G> GrammarAssignment<G> {
    fn grammar_for(&self, task: &str) -> Result<Arc<G>> {
        match self {
            GrammarAssignment::Shared(grammar) => Ok(Arc::clone(grammar)),
            GrammarAssignment::PerTask(grammars) => grammars.get(task).cloned().ok_or_else(|| {
                EngineError::InvalidConfig(format!("no grammar assigned to task '{}'", task))
            }),
        }
    }
}

impl<G> From<Arc<G>> for GrammarAssignment<G> {
    fn from(grammar: Arc<G>) -> Self {
        GrammarAssignment::Shared(grammar)
    }
}

impl<G> From<HashMap<String, Arc<G>>> for GrammarAssignment<G> {
    fn from(grammars: HashMap<String, Arc<G>>) -> Self {
        GrammarAssignment::PerTask(grammars)
    }
}

/// Final state of one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
    pub name: String,

    /// Description length explored (or handed out) when the run ended
    pub lower_bound: f64,

    pub workers_launched: usize,

    /// Time charged to the task's stopwatch
    pub elapsed: Duration,

    pub best_search_time: Option<Duration>,

    pub solutions: usize,
}

/// Result of a scheduler run
#[derive(Debug, Clone)]
pub struct EnumerationReport<T> {
    /// Identifier used in this run's log lines
    pub run_id: String,

    /// Final frontier of every task, in input order
    pub frontiers: Vec<Frontier<T>>,

    /// Best search time of every task that found a solution, in input order
    pub best_search_times: Vec<(String, Duration)>,

    /// Per-task summaries, in input order
    pub task_summaries: Vec<TaskSummary>,

    pub programs_explored: u64,

    pub wall_time: Duration,
}

impl<T> EnumerationReport<T> {
    /// Best search time of the named task, if it was solved
    pub fn best_search_time(&self, task: &str) -> Option<Duration> {
        self.best_search_times
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, time)| *time)
    }

    /// Number of tasks with at least one solution
    pub fn solved(&self) -> usize {
        self.best_search_times.len()
    }
}

/// Coordinator-owned state of one task
struct TaskState<G: Grammar> {
    task: Arc<dyn Task<G>>,
    grammar: Arc<G>,
    frontier: Frontier<G::Term>,
    stopwatch: Stopwatch,
    lower_bound: f64,
    best_search_time: Option<Duration>,
    workers_launched: usize,
    /// Once set, no new workers are launched for this task
    retired: bool,
}

/// Worker the coordinator is still waiting on
struct InFlight {
    task: usize,
    cancel: CancellationToken,
    children: Vec<u32>,
    _thread: JoinHandle<()>,
}

/// Budgeted multi-task enumeration scheduler
pub struct EnumerationScheduler<G: Grammar> {
    config: SchedulerConfig,
    solver: Arc<Solver>,
    tasks: Vec<TaskState<G>>,
    workers: HashMap<WorkerId, InFlight>,
    next_worker: WorkerId,
    sender: Sender<WorkerMessage<G::Term>>,
    receiver: Receiver<WorkerMessage<G::Term>>,
    process_manager: ProcessManager,
    programs_explored: u64,
    run_id: Ulid,
}

impl<G: Grammar> EnumerationScheduler<G> {
    /// Create a scheduler for `tasks`
    pub fn new(
        grammars: impl Into<GrammarAssignment<G>>,
        tasks: &[Arc<dyn Task<G>>],
        config: SchedulerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let grammars = grammars.into();

        let tasks = tasks
            .iter()
            .map(|task| {
                Ok(TaskState {
                    grammar: grammars.grammar_for(task.name())?,
                    frontier: Frontier::new(task.name()),
                    task: Arc::clone(task),
                    stopwatch: Stopwatch::new(),
                    lower_bound: config.initial_lower_bound,
                    best_search_time: None,
                    workers_launched: 0,
                    retired: false,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let (sender, receiver) = unbounded();

        Ok(Self {
            solver: Arc::new(config.solver.clone()),
            config,
            tasks,
            workers: HashMap::new(),
            next_worker: 0,
            sender,
            receiver,
            process_manager: ProcessManager::new(),
            programs_explored: 0,
            run_id: Ulid::new(),
        })
    }

    /// Resume the task at `index` from a previously explored description length
    pub fn with_lower_bound(mut self, index: usize, lower_bound: f64) -> Result<Self> {
        if !lower_bound.is_finite() || lower_bound < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "lower bound must be non-negative, got {}",
                lower_bound
            )));
        }
        let count = self.tasks.len();
        let state = self.tasks.get_mut(index).ok_or_else(|| {
            EngineError::InvalidConfig(format!("task index {} out of range ({} tasks)", index, count))
        })?;
        state.lower_bound = lower_bound;
        Ok(self)
    }

    /// Run until every task is satisfied or out of time
    pub fn run(mut self) -> Result<EnumerationReport<G::Term>> {
        let started = Instant::now();
        let cpus = self.config.resolved_cpus();
        let multiple_workers = self.config.allows_multiple_workers(self.tasks.len());
        let poll_interval = self.config.poll_interval();

        info!(
            "Run {}: enumerating {} tasks on {} CPUs with the {} solver (timeout {:?})",
            self.run_id,
            self.tasks.len(),
            cpus,
            self.solver.name(),
            self.config.enumeration_timeout()
        );
        if multiple_workers {
            info!("Run {}: allowing multiple workers per task", self.run_id);
        }

        let outcome = self.schedule(cpus, multiple_workers, poll_interval, started);
        if outcome.is_err() {
            self.cancel_all();
        }
        self.drain();
        outcome?;

        Ok(self.report(started.elapsed(), cpus))
    }

    fn schedule(
        &mut self,
        cpus: usize,
        multiple_workers: bool,
        poll_interval: Duration,
        started: Instant,
    ) -> Result<()> {
        loop {
            self.retire_inactive();

            while self.workers.len() < cpus {
                match self.next_task(multiple_workers) {
                    Some(index) => self.launch(index)?,
                    None => break,
                }
            }

            if self.workers.is_empty() {
                return Ok(());
            }

            match self.receiver.recv_timeout(poll_interval) {
                Ok(message) => self.handle(message, started)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }

            self.watchdog();
        }
    }

    fn is_active(&self, state: &TaskState<G>) -> bool {
        !state.retired
            && state.frontier.len() < self.config.maximum_frontier
            && state.stopwatch.elapsed() < self.config.enumeration_timeout()
    }

    fn retire_inactive(&mut self) {
        for index in 0..self.tasks.len() {
            if !self.tasks[index].retired && !self.is_active(&self.tasks[index]) {
                let state = &mut self.tasks[index];
                state.retired = true;
                debug!(
                    "Task {} is no longer active ({} solutions, {:?} elapsed)",
                    state.task.name(),
                    state.frontier.len(),
                    state.stopwatch.elapsed()
                );
            }
        }
    }

    fn workers_for(&self, index: usize) -> usize {
        self.workers.values().filter(|record| record.task == index).count()
    }

    /// Active task with the smallest lower bound; ties go to the earliest task
    fn next_task(&self, multiple_workers: bool) -> Option<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(index, state)| {
                self.is_active(state) && (multiple_workers || self.workers_for(*index) == 0)
            })
            .min_by(|(_, a), (_, b)| a.lower_bound.total_cmp(&b.lower_bound))
            .map(|(index, _)| index)
    }

    fn launch(&mut self, index: usize) -> Result<()> {
        let timeout = self.config.enumeration_timeout();
        let increment = self.config.budget_increment;
        let maximum_frontier = self.config.maximum_frontier;
        let evaluation_timeout = self.config.evaluation_timeout();

        let worker = self.next_worker;
        self.next_worker += 1;

        let state = &mut self.tasks[index];
        state.stopwatch.start();
        let elapsed = state.stopwatch.elapsed();
        let lower_bound = state.lower_bound;
        let upper_bound = lower_bound + increment;
        state.lower_bound = upper_bound;
        state.workers_launched += 1;

        let job = WorkerJob {
            worker,
            grammar: Arc::clone(&state.grammar),
            task: Arc::clone(&state.task),
            elapsed,
            lower_bound,
            upper_bound,
            budget_increment: increment,
            timeout: timeout.saturating_sub(elapsed),
            evaluation_timeout,
            maximum_frontier: maximum_frontier.saturating_sub(state.frontier.len()),
        };

        debug!(
            "Launching worker {} for {} in ({}, {}] with {:?} left",
            worker,
            state.task.name(),
            lower_bound,
            upper_bound,
            job.timeout
        );

        let handle = spawn_worker(Arc::clone(&self.solver), job, self.sender.clone())?;
        self.workers.insert(
            worker,
            InFlight {
                task: index,
                cancel: handle.cancel,
                children: Vec::new(),
                _thread: handle.thread,
            },
        );

        counter!(WORKERS_LAUNCHED).increment(1);
        gauge!(WORKERS_IN_FLIGHT).set(self.workers.len() as f64);
        Ok(())
    }

    fn handle(&mut self, message: WorkerMessage<G::Term>, started: Instant) -> Result<()> {
        match message {
            WorkerMessage::Fork { worker, child } => {
                match self.workers.get_mut(&worker) {
                    Some(record) => {
                        trace!("Worker {} started child process {}", worker, child);
                        record.children.push(child);
                    }
                    None => {
                        debug!(
                            "Child {} of retired worker {} reported late, killing it",
                            child, worker
                        );
                        self.kill_child(child);
                    }
                }
                Ok(())
            }
            WorkerMessage::Success { worker, result } => {
                match self.workers.remove(&worker) {
                    Some(record) => self.record_success(record.task, result, started),
                    None => trace!("Ignoring result of retired worker {}", worker),
                }
                Ok(())
            }
            WorkerMessage::Failure { worker, error } => {
                let Some(record) = self.workers.remove(&worker) else {
                    trace!("Ignoring failure of retired worker {}: {}", worker, error);
                    return Ok(());
                };
                counter!(WORKER_FAILURES).increment(1);
                self.after_worker_exit(record.task);

                let name = self.tasks[record.task].task.name().to_string();
                if error.is_recoverable() {
                    warn!("Worker {} for {} failed, dropping its window: {}", worker, name, error);
                    Ok(())
                } else {
                    error!("Worker {} for {} failed: {}", worker, name, error);
                    Err(EngineError::WorkerFailed {
                        task: name,
                        source: Box::new(error),
                    })
                }
            }
        }
    }

    fn record_success(&mut self, index: usize, result: SolveResult<G::Term>, started: Instant) {
        self.programs_explored += result.programs_explored;
        counter!(PROGRAMS_EXPLORED).increment(result.programs_explored);

        let wall = started.elapsed().as_secs_f64();
        if wall > 0.0 {
            info!(
                "Total number of programs explored: {} ({:.1} programs/sec)",
                self.programs_explored,
                self.programs_explored as f64 / wall
            );
        }

        let maximum_frontier = self.config.maximum_frontier;
        let state = &mut self.tasks[index];

        if let Some(search_time) = result.search_time {
            match state.best_search_time {
                Some(best) if best <= search_time => {}
                previous => {
                    if previous.is_none() {
                        info!("Task {} first solved after {:?}", state.task.name(), search_time);
                        counter!(TASKS_SOLVED).increment(1);
                    }
                    state.best_search_time = Some(search_time);
                }
            }
        }

        let merged = std::mem::replace(&mut state.frontier, Frontier::new(state.task.name()));
        state.frontier = merged.combine(result.frontier);

        if state.frontier.len() >= maximum_frontier {
            debug!(
                "Task {} has {} solutions, retiring it",
                state.task.name(),
                state.frontier.len()
            );
            state.retired = true;
            self.cancel_task_workers(index);
        }

        self.after_worker_exit(index);
    }

    /// Stop the task's stopwatch once nothing is searching it
    fn after_worker_exit(&mut self, index: usize) {
        gauge!(WORKERS_IN_FLIGHT).set(self.workers.len() as f64);
        if self.workers_for(index) == 0 {
            self.tasks[index].stopwatch.stop();
        }
    }

    fn cancel_worker(&mut self, worker: WorkerId) {
        let Some(record) = self.workers.remove(&worker) else {
            return;
        };
        record.cancel.cancel();
        for child in &record.children {
            self.kill_child(*child);
        }
        counter!(WORKERS_CANCELLED).increment(1);
        info!(
            "Cancelled worker {} for {}",
            worker,
            self.tasks[record.task].task.name()
        );
    }

    fn cancel_task_workers(&mut self, index: usize) {
        let workers: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, record)| record.task == index)
            .map(|(worker, _)| *worker)
            .collect();
        for worker in workers {
            self.cancel_worker(worker);
        }
    }

    fn cancel_all(&mut self) {
        let workers: Vec<WorkerId> = self.workers.keys().copied().collect();
        for worker in workers {
            self.cancel_worker(worker);
        }
        for state in &mut self.tasks {
            state.stopwatch.stop();
        }
        gauge!(WORKERS_IN_FLIGHT).set(0.0);
    }

    /// Cancel workers of tasks that ran well past their deadline
    fn watchdog(&mut self) {
        let limit = self
            .config
            .enumeration_timeout()
            .saturating_add(self.config.watchdog_grace());
        let overdue: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, record)| self.tasks[record.task].stopwatch.elapsed() > limit)
            .map(|(worker, _)| *worker)
            .collect();

        for worker in overdue {
            if let Some(index) = self.workers.get(&worker).map(|record| record.task) {
                warn!(
                    "Worker {} for {} is past its deadline, terminating it",
                    worker,
                    self.tasks[index].task.name()
                );
                self.cancel_worker(worker);
                self.after_worker_exit(index);
            }
        }
    }

    fn kill_child(&self, child: u32) {
        if let Err(e) = self.process_manager.kill(child) {
            warn!("Could not terminate child process {}: {}", child, e);
        }
    }

    /// Consume messages left behind by cancelled workers
    fn drain(&mut self) {
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                WorkerMessage::Fork { child, worker } if !self.workers.contains_key(&worker) => {
                    self.kill_child(child)
                }
                other => trace!("Discarding message from worker {}", other.worker()),
            }
        }
    }

    fn report(self, wall_time: Duration, cpus: usize) -> EnumerationReport<G::Term> {
        let maximum_frontier = self.config.maximum_frontier;
        let wall = wall_time.as_secs_f64();

        info!(
            "Run {} finished in {:?}: {} programs explored",
            self.run_id, wall_time, self.programs_explored
        );
        if wall > 0.0 {
            info!(
                "{:.1} evaluations per second, {:.1} per CPU second",
                self.programs_explored as f64 / wall,
                self.programs_explored as f64 / (wall * cpus as f64)
            );
        }

        let mut frontiers = Vec::with_capacity(self.tasks.len());
        let mut best_search_times = Vec::new();
        let mut task_summaries = Vec::with_capacity(self.tasks.len());

        for state in self.tasks {
            let name = state.task.name().to_string();
            if let Some(time) = state.best_search_time {
                best_search_times.push((name.clone(), time));
            }
            let frontier = state.frontier.top_k(maximum_frontier);
            task_summaries.push(TaskSummary {
                name,
                lower_bound: state.lower_bound,
                workers_launched: state.workers_launched,
                elapsed: state.stopwatch.elapsed(),
                best_search_time: state.best_search_time,
                solutions: frontier.len(),
            });
            frontiers.push(frontier);
        }

        info!(
            "Run {}: solved {}/{} tasks",
            self.run_id,
            best_search_times.len(),
            task_summaries.len()
        );

        EnumerationReport {
            run_id: self.run_id.to_string(),
            frontiers,
            best_search_times,
            task_summaries,
            programs_explored: self.programs_explored,
            wall_time,
        }
    }
}

/// Enumerate programs for every task under the configured budgets
pub fn multithreaded_enumeration<G: Grammar>(
    grammars: impl Into<GrammarAssignment<G>>,
    tasks: &[Arc<dyn Task<G>>],
    config: SchedulerConfig,
) -> Result<EnumerationReport<G::Term>> {
    EnumerationScheduler::new(grammars, tasks, config)?.run()
}
