// src/utils/config.rs
//! Engine configuration
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. Built-in defaults (serde defaults below)
//! 2. Optional file (`config/engine.toml`, `.yaml` or `.json`, or an explicit path)
//! 3. Environment variables prefixed with `SYNTH_`, using `__` to nest
//!    (e.g. `SYNTH_SCHEDULER__CPUS=8`)

use crate::runtime::solver::Solver;
use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default configuration file, without extension
pub const DEFAULT_CONFIG_FILE: &str = "config/engine";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SYNTH";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load from the default file location (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::build(File::with_name(DEFAULT_CONFIG_FILE).required(false))
    }

    /// Load from an explicit file path, layered under the environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: EngineConfig = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.scheduler.validate()?;
        debug!("Engine configuration loaded: {:?}", config);
        Ok(config)
    }
}

/// Multi-task scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker pool size. 0 = available parallelism.
    #[serde(default)]
    pub cpus: usize,

    /// Wall-clock budget per task, summed over all of its workers
    #[serde(default = "default_enumeration_timeout")]
    pub enumeration_timeout_secs: f64,

    /// Budget for a single oracle call
    #[serde(default)]
    pub evaluation_timeout_secs: Option<f64>,

    /// Number of solutions after which a task is satisfied
    #[serde(default = "default_maximum_frontier")]
    pub maximum_frontier: usize,

    /// Width of the description-length window handed to each worker
    #[serde(default = "default_budget_increment")]
    pub budget_increment: f64,

    /// Description length every task starts exploring from
    #[serde(default)]
    pub initial_lower_bound: f64,

    /// Allow several workers on one task at a time.
    /// Unset means enabled iff there are more CPUs than tasks.
    #[serde(default)]
    pub multiple_workers_per_task: Option<bool>,

    /// Extra time past a task's budget before its workers are force-cancelled
    #[serde(default = "default_watchdog_grace")]
    pub watchdog_grace_secs: f64,

    /// How long the coordinator waits for a message before running the watchdog
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Search backend
    #[serde(default)]
    pub solver: Solver,
}

fn default_enumeration_timeout() -> f64 {
    30.0
}

fn default_maximum_frontier() -> usize {
    10
}

fn default_budget_increment() -> f64 {
    1.0
}

fn default_watchdog_grace() -> f64 {
    5.0
}

fn default_poll_interval() -> u64 {
    250
}

/// Seconds as a `Duration`, saturating at `Duration::MAX`
fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

/// Reject negative, non-finite, or unrepresentable second counts
fn check_secs(field: &str, secs: f64) -> Result<()> {
    if secs < 0.0 || Duration::try_from_secs_f64(secs).is_err() {
        return Err(EngineError::InvalidConfig(format!(
            "{} must be a non-negative number of seconds that fits a duration, got {}",
            field, secs
        )));
    }
    Ok(())
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cpus: 0,
            enumeration_timeout_secs: default_enumeration_timeout(),
            evaluation_timeout_secs: None,
            maximum_frontier: default_maximum_frontier(),
            budget_increment: default_budget_increment(),
            initial_lower_bound: 0.0,
            multiple_workers_per_task: None,
            watchdog_grace_secs: default_watchdog_grace(),
            poll_interval_ms: default_poll_interval(),
            solver: Solver::default(),
        }
    }
}

impl SchedulerConfig {
    /// Resolve the worker pool size (0 means use available parallelism)
    pub fn resolved_cpus(&self) -> usize {
        if self.cpus == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.cpus
        }
    }

    /// Whether several workers may search the same task concurrently
    pub fn allows_multiple_workers(&self, task_count: usize) -> bool {
        self.multiple_workers_per_task
            .unwrap_or_else(|| self.resolved_cpus() > task_count)
    }

    pub fn enumeration_timeout(&self) -> Duration {
        saturating_secs(self.enumeration_timeout_secs)
    }

    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_secs.map(saturating_secs)
    }

    pub fn watchdog_grace(&self) -> Duration {
        saturating_secs(self.watchdog_grace_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Validate the scheduler configuration
    pub fn validate(&self) -> Result<()> {
        check_secs("enumeration_timeout_secs", self.enumeration_timeout_secs)?;
        if let Some(secs) = self.evaluation_timeout_secs {
            check_secs("evaluation_timeout_secs", secs)?;
        }
        check_secs("watchdog_grace_secs", self.watchdog_grace_secs)?;

        if !self.budget_increment.is_finite() || self.budget_increment <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "budget_increment must be positive, got {}",
                self.budget_increment
            )));
        }

        if !self.initial_lower_bound.is_finite() || self.initial_lower_bound < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "initial_lower_bound must be non-negative, got {}",
                self.initial_lower_bound
            )));
        }

        if self.maximum_frontier == 0 {
            return Err(EngineError::InvalidConfig(
                "maximum_frontier must be at least 1".to_string(),
            ));
        }

        self.solver.validate()
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}
