// tests/scheduler_test.rs
//! Multi-task scheduler behaviour against the literal grammar

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use synth_engine::runtime::{IsolatedSolver, ResourceLimits};
use synth_engine::search::fixtures::{Literal, LiteralGrammar, LiteralType, PredicateTask};
use synth_engine::{multithreaded_enumeration, EngineError, SchedulerConfig, Solver, Task};

type Calls = Arc<Mutex<Vec<(String, Literal)>>>;

fn config(cpus: usize, maximum_frontier: usize) -> SchedulerConfig {
    SchedulerConfig {
        cpus,
        enumeration_timeout_secs: 10.0,
        maximum_frontier,
        multiple_workers_per_task: Some(false),
        poll_interval_ms: 10,
        ..Default::default()
    }
}

/// Task accepting `accepted` that records every oracle call
fn recorded(name: &str, accepted: Vec<Literal>, calls: &Calls) -> Arc<dyn Task<LiteralGrammar>> {
    let calls = Arc::clone(calls);
    let task_name = name.to_string();
    Arc::new(PredicateTask::new(name, LiteralType::Int, move |literal| {
        calls.lock().unwrap().push((task_name.clone(), *literal));
        if accepted.contains(literal) {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }))
}

fn accepting(name: &str, accepted: Vec<Literal>) -> Arc<dyn Task<LiteralGrammar>> {
    Arc::new(PredicateTask::accepting(name, LiteralType::Int, accepted))
}

// ─── Scheduling order ───────────────────────────────────────────────────────

#[test]
fn test_least_explored_task_runs_first() {
    let calls: Calls = Arc::default();
    let tasks = vec![
        recorded("a", vec![Literal::Int(1)], &calls),
        recorded("b", vec![Literal::Int(2)], &calls),
        recorded("c", vec![Literal::Int(0)], &calls),
    ];

    let report =
        multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &tasks, config(1, 1)).unwrap();

    let order: Vec<(String, Literal)> = calls.lock().unwrap().clone();
    let expected: Vec<(String, Literal)> = [
        ("a", 0),
        ("b", 0),
        ("c", 0),
        ("a", 1),
        ("b", 1),
        ("b", 2),
    ]
    .into_iter()
    .map(|(name, n)| (name.to_string(), Literal::Int(n)))
    .collect();
    assert_eq!(order, expected);

    assert_eq!(report.programs_explored, 6);
    assert_eq!(report.solved(), 3);
    let launched: Vec<usize> = report
        .task_summaries
        .iter()
        .map(|summary| summary.workers_launched)
        .collect();
    assert_eq!(launched, vec![2, 3, 1]);
}

#[test]
fn test_reports_follow_input_order() {
    let tasks = vec![
        accepting("late", vec![Literal::Int(5)]),
        accepting("never", vec![]),
        accepting("early", vec![Literal::Int(0)]),
    ];
    let mut config = config(2, 1);
    config.enumeration_timeout_secs = 0.3;

    let report = multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &tasks, config).unwrap();

    let names: Vec<&str> = report.frontiers.iter().map(|frontier| frontier.task()).collect();
    assert_eq!(names, vec!["late", "never", "early"]);
    assert!(report.frontiers[1].is_empty());

    let solved: Vec<&str> = report
        .best_search_times
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(solved, vec!["late", "early"]);
    assert!(report.best_search_time("never").is_none());
}

// ─── Budgets ────────────────────────────────────────────────────────────────

#[test]
fn test_zero_timeout_launches_nothing() {
    let calls: Calls = Arc::default();
    let tasks = vec![
        recorded("a", vec![Literal::Int(0)], &calls),
        recorded("b", vec![Literal::Int(0)], &calls),
    ];
    let mut config = config(2, 1);
    config.enumeration_timeout_secs = 0.0;

    let report = multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &tasks, config).unwrap();

    assert!(calls.lock().unwrap().is_empty());
    assert!(report.frontiers.iter().all(|frontier| frontier.is_empty()));
    assert!(report.best_search_times.is_empty());
    assert_eq!(report.programs_explored, 0);
    assert!(report.task_summaries.iter().all(|summary| summary.workers_launched == 0));
}

#[test]
fn test_windows_never_overlap() {
    let calls: Calls = Arc::default();
    let seen = Arc::clone(&calls);
    let task: Arc<dyn Task<LiteralGrammar>> = Arc::new(
        PredicateTask::new("unsolvable", LiteralType::Int, move |literal| {
            seen.lock().unwrap().push(("unsolvable".to_string(), *literal));
            f64::NEG_INFINITY
        })
        .with_evaluation_delay(Duration::from_millis(1)),
    );
    let config = SchedulerConfig {
        cpus: 4,
        enumeration_timeout_secs: 0.3,
        maximum_frontier: 1,
        multiple_workers_per_task: Some(true),
        poll_interval_ms: 5,
        ..Default::default()
    };

    let report =
        multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &[task], config).unwrap();

    let literals: Vec<Literal> = calls.lock().unwrap().iter().map(|(_, l)| *l).collect();
    let distinct: HashSet<Literal> = literals.iter().copied().collect();
    assert_eq!(distinct.len(), literals.len(), "a literal was explored twice");

    let summary = &report.task_summaries[0];
    assert!(summary.workers_launched > 1);
    assert_eq!(summary.lower_bound, summary.workers_launched as f64);
    assert!(report.frontiers[0].is_empty());
}

#[test]
fn test_timed_out_task_stops_being_scheduled() {
    let tasks = vec![accepting("never", vec![])];
    let mut config = config(1, 1);
    config.enumeration_timeout_secs = 0.2;

    let started = Instant::now();
    let report = multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &tasks, config).unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.task_summaries[0].elapsed >= Duration::from_millis(200));
    assert!(report.frontiers[0].is_empty());
}

#[test]
fn test_frontier_is_capped_at_maximum() {
    let tasks = vec![accepting(
        "many",
        (0..8).map(Literal::Int).collect(),
    )];
    let config = SchedulerConfig {
        cpus: 4,
        maximum_frontier: 3,
        multiple_workers_per_task: Some(true),
        poll_interval_ms: 5,
        ..Default::default()
    };

    let report = multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &tasks, config).unwrap();
    assert_eq!(report.frontiers[0].len(), 3);
    assert_eq!(report.task_summaries[0].solutions, 3);
}

// ─── Determinism ────────────────────────────────────────────────────────────

#[test]
fn test_runs_are_repeatable() {
    let run = || {
        let tasks = vec![
            accepting("evens", vec![Literal::Int(0), Literal::Int(2), Literal::Int(4)]),
            accepting("odd", vec![Literal::Int(3)]),
        ];
        multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &tasks, config(1, 2)).unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.frontiers, second.frontiers);
    assert_eq!(first.programs_explored, second.programs_explored);
}

// ─── Cancellation ───────────────────────────────────────────────────────────

#[test]
fn test_satisfied_task_cancels_its_other_workers() {
    let task: Arc<dyn Task<LiteralGrammar>> =
        Arc::new(PredicateTask::new("zero", LiteralType::Int, |literal| {
            if *literal == Literal::Int(0) {
                0.0
            } else {
                std::thread::sleep(Duration::from_secs(3));
                f64::NEG_INFINITY
            }
        }));
    let config = SchedulerConfig {
        cpus: 4,
        maximum_frontier: 1,
        multiple_workers_per_task: Some(true),
        poll_interval_ms: 5,
        ..Default::default()
    };

    let started = Instant::now();
    let report =
        multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &[task], config).unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(report.frontiers[0].contains(&Literal::Int(0)));
    assert_eq!(report.task_summaries[0].workers_launched, 4);
    // cancelled workers are still sleeping, but no longer charged to the task
    assert!(report.task_summaries[0].elapsed < Duration::from_secs(1));
}

// ─── Failures ───────────────────────────────────────────────────────────────

#[test]
fn test_worker_panic_aborts_the_run() {
    let tasks: Vec<Arc<dyn Task<LiteralGrammar>>> = vec![
        accepting("fine", vec![Literal::Int(50)]),
        Arc::new(PredicateTask::new("broken", LiteralType::Int, |literal| {
            if *literal == Literal::Int(1) {
                panic!("oracle invariant violated");
            }
            f64::NEG_INFINITY
        })),
    ];

    let result = multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &tasks, config(2, 1));

    match result {
        Err(EngineError::WorkerFailed { task, source }) => {
            assert_eq!(task, "broken");
            assert!(matches!(*source, EngineError::WorkerPanicked(_)));
        }
        other => panic!("expected a fatal worker failure, got {:?}", other.map(|r| r.solved())),
    }
}

// ─── Grammars ───────────────────────────────────────────────────────────────

#[test]
fn test_per_task_grammars() {
    let tasks = vec![
        accepting("fine", vec![Literal::Int(3)]),
        accepting("coarse", vec![Literal::Int(3)]),
    ];
    let grammars = HashMap::from([
        ("fine".to_string(), Arc::new(LiteralGrammar::with_spacing(0.5))),
        ("coarse".to_string(), Arc::new(LiteralGrammar::new())),
    ]);

    let report = multithreaded_enumeration(grammars, &tasks, config(1, 1)).unwrap();

    assert_eq!(report.task_summaries[0].workers_launched, 2);
    assert_eq!(report.task_summaries[1].workers_launched, 4);
    assert_eq!(report.frontiers[0].entries()[0].log_prior, -2.0);
    assert_eq!(report.frontiers[1].entries()[0].log_prior, -4.0);
}

#[test]
fn test_isolated_backend_runs_each_window_in_a_child() {
    let tasks = vec![
        accepting("two", vec![Literal::Int(2)]),
        accepting("four", vec![Literal::Int(4)]),
    ];
    let mut config = config(2, 1);
    config.solver = Solver::Isolated(IsolatedSolver {
        limits: ResourceLimits::unlimited(),
    });

    let report = multithreaded_enumeration(Arc::new(LiteralGrammar::new()), &tasks, config).unwrap();

    assert!(report.frontiers[0].contains(&Literal::Int(2)));
    assert!(report.frontiers[1].contains(&Literal::Int(4)));
    assert_eq!(report.programs_explored, 8);
    assert_eq!(report.solved(), 2);
}
