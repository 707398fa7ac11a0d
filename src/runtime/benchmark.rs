// src/runtime/benchmark.rs
//! Synthesis-time benchmark
//!
//! Searches every task for a single solution under a fixed timeout, in
//! parallel on a dedicated rayon pool, and summarises how many tasks were
//! solved, how long they took and how well the solutions score.

use crate::runtime::cancellation::CancellationToken;
use crate::search::enumeration::{enumerate_for_task, EnumerationParams};
use crate::search::grammar::Grammar;
use crate::search::task::Task;
use crate::utils::errors::{EngineError, Result};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Mean with its standard error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanWithError {
    pub mean: f64,
    pub standard_error: f64,
}

impl MeanWithError {
    /// `None` for an empty sample
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            standard_error: variance.sqrt() / n.sqrt(),
        })
    }
}

/// Outcome of one benchmarked task
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSolution {
    pub task: String,
    pub program: String,
    pub synthesis_time: Duration,
    pub log_likelihood: f64,
}

/// Benchmark summary
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSummary {
    pub tasks: usize,

    /// Solved tasks, in input order
    pub solutions: Vec<BenchmarkSolution>,

    /// Synthesis time in seconds
    pub synthesis_time: Option<MeanWithError>,

    /// Log likelihood of the task given the solution
    pub log_likelihood: Option<MeanWithError>,
}

impl BenchmarkSummary {
    pub fn solved(&self) -> usize {
        self.solutions.len()
    }

    /// Percentage of tasks solved, rounded down
    pub fn solved_percent(&self) -> usize {
        if self.tasks == 0 {
            0
        } else {
            100 * self.solved() / self.tasks
        }
    }
}

/// Time how long each task takes to get its first solution
pub fn benchmark_synthesis_times<G: Grammar>(
    grammar: &G,
    tasks: &[Arc<dyn Task<G>>],
    timeout: Duration,
    cpus: usize,
) -> Result<BenchmarkSummary> {
    if cpus == 0 {
        return Err(EngineError::InvalidConfig(
            "benchmark needs at least one CPU".to_string(),
        ));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cpus)
        .thread_name(|index| format!("synth-benchmark-{}", index))
        .build()?;

    let outcomes: Vec<Result<Option<BenchmarkSolution>>> = pool.install(|| {
        tasks
            .par_iter()
            .map(|task| benchmark_task(grammar, task.as_ref(), timeout))
            .collect()
    });

    let mut solutions = Vec::new();
    for outcome in outcomes {
        if let Some(solution) = outcome? {
            solutions.push(solution);
        }
    }

    let times: Vec<f64> = solutions
        .iter()
        .map(|solution| solution.synthesis_time.as_secs_f64())
        .collect();
    let likelihoods: Vec<f64> = solutions
        .iter()
        .map(|solution| solution.log_likelihood)
        .collect();

    let summary = BenchmarkSummary {
        tasks: tasks.len(),
        synthesis_time: MeanWithError::of(&times),
        log_likelihood: MeanWithError::of(&likelihoods),
        solutions,
    };

    info!(
        "Benchmark solves {}/{} = {}%",
        summary.solved(),
        summary.tasks,
        summary.solved_percent()
    );
    if let (Some(time), Some(likelihood)) = (summary.synthesis_time, summary.log_likelihood) {
        info!(
            "Synthesis time {:.3} +/- {:.3} sec",
            time.mean, time.standard_error
        );
        info!(
            "Expected log P[t|p] = {:.3} +/- {:.3}",
            likelihood.mean, likelihood.standard_error
        );
    }

    Ok(summary)
}

fn benchmark_task<G: Grammar>(
    grammar: &G,
    task: &dyn Task<G>,
    timeout: Duration,
) -> Result<Option<BenchmarkSolution>> {
    let started = Instant::now();
    let params = EnumerationParams {
        maximum_frontier: 1,
        timeout: Some(timeout),
        ..Default::default()
    };

    let outcome = enumerate_for_task(grammar, task, &params, &CancellationToken::new())?;
    let synthesis_time = started.elapsed();
    if synthesis_time > timeout {
        return Ok(None);
    }

    Ok(outcome.frontier.best().map(|entry| {
        info!(
            "Solved {} with {} (log likelihood {}) in {:?}",
            task.name(),
            entry.program,
            entry.log_likelihood,
            synthesis_time
        );
        BenchmarkSolution {
            task: task.name().to_string(),
            program: entry.program.to_string(),
            synthesis_time,
            log_likelihood: entry.log_likelihood,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fixtures::{Literal, LiteralGrammar, LiteralType, PredicateTask};

    #[test]
    fn test_mean_with_error() {
        assert_eq!(MeanWithError::of(&[]), None);

        let stats = MeanWithError::of(&[1.0, 3.0]).unwrap();
        assert_eq!(stats.mean, 2.0);
        // population deviation 1, two samples
        assert!((stats.standard_error - 1.0 / 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_benchmark_counts_solved_tasks() {
        let tasks: Vec<Arc<dyn Task<LiteralGrammar>>> = vec![
            Arc::new(PredicateTask::new("two", LiteralType::Int, |literal| {
                if *literal == Literal::Int(2) { -1.0 } else { f64::NEG_INFINITY }
            })),
            Arc::new(PredicateTask::new("true", LiteralType::Bool, |literal| {
                if *literal == Literal::Bool(true) { -3.0 } else { f64::NEG_INFINITY }
            })),
            Arc::new(PredicateTask::accepting("nothing", LiteralType::Bool, vec![])),
        ];

        let summary =
            benchmark_synthesis_times(&LiteralGrammar::new(), &tasks, Duration::from_secs(5), 2)
                .unwrap();

        assert_eq!(summary.tasks, 3);
        assert_eq!(summary.solved(), 2);
        assert_eq!(summary.solved_percent(), 66);
        assert_eq!(summary.solutions[0].task, "two");
        assert_eq!(summary.solutions[0].program, "2");
        assert_eq!(summary.solutions[1].program, "true");
        assert_eq!(summary.log_likelihood.unwrap().mean, -2.0);
        assert!(summary.synthesis_time.is_some());
    }

    #[test]
    fn test_benchmark_rejects_zero_cpus() {
        let tasks: Vec<Arc<dyn Task<LiteralGrammar>>> = Vec::new();
        let result = benchmark_synthesis_times(&LiteralGrammar::new(), &tasks, Duration::ZERO, 0);
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }
}
