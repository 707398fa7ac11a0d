// src/utils/stopwatch.rs
//! Accumulating stopwatch for per-task wall-clock budgets
//!
//! A task may be worked on by many workers over the life of a run, with
//! gaps while it waits for a free CPU. The stopwatch only accumulates time
//! while it is running, so a task is charged for the time it was actually
//! being searched.

use std::time::{Duration, Instant};
use tracing::trace;

/// Accumulates elapsed time across start/stop cycles
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    /// Time accumulated by completed start/stop cycles
    accumulated: Duration,

    /// Start of the current cycle, if running
    started_at: Option<Instant>,
}

impl Stopwatch {
    /// Create a stopped stopwatch with no elapsed time
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing. No-op if already running.
    pub fn start(&mut self) {
        if self.started_at.is_some() {
            trace!("Stopwatch already running, ignoring start");
            return;
        }
        self.started_at = Some(Instant::now());
    }

    /// Stop timing and fold the current cycle into the accumulated total.
    /// No-op if not running.
    pub fn stop(&mut self) {
        match self.started_at.take() {
            Some(started_at) => self.accumulated += started_at.elapsed(),
            None => trace!("Stopwatch not running, ignoring stop"),
        }
    }

    /// Whether the stopwatch is currently running
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Total elapsed time, including the in-progress cycle
    pub fn elapsed(&self) -> Duration {
        match self.started_at {
            Some(started_at) => self.accumulated + started_at.elapsed(),
            None => self.accumulated,
        }
    }
}
