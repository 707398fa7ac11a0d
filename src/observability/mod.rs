// src/observability/mod.rs
//! Logging and metrics
//!
//! - **Tracing**: `tracing-subscriber` with an `EnvFilter` (`RUST_LOG` wins
//!   over the configured filter), human-readable or JSON lines on stderr
//! - **Metrics**: recorded through the `metrics` facade; `init_metrics`
//!   installs a Prometheus recorder and hands back its render handle
//!
//! Neither is required: without a subscriber or recorder installed, the
//! engine's log and metric calls are no-ops.

use crate::utils::config::LoggingConfig;
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// Candidates scored by all workers (counter)
pub const PROGRAMS_EXPLORED: &str = "synth_programs_explored_total";

/// Workers started (counter)
pub const WORKERS_LAUNCHED: &str = "synth_workers_launched_total";

/// Workers force-cancelled (counter)
pub const WORKERS_CANCELLED: &str = "synth_workers_cancelled_total";

/// Worker failures, recoverable or not (counter)
pub const WORKER_FAILURES: &str = "synth_worker_failures_total";

/// Tasks with at least one solution (counter)
pub const TASKS_SOLVED: &str = "synth_tasks_solved_total";

/// Workers currently running (gauge)
pub const WORKERS_IN_FLIGHT: &str = "synth_workers_in_flight";

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| EngineError::Observability(format!("invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| EngineError::Observability(e.to_string()))
}

/// Install the global Prometheus metrics recorder
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| EngineError::Observability(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            filter: "synth_engine=loud".to_string(),
            json: false,
        };
        assert!(matches!(
            init_tracing(&config),
            Err(EngineError::Observability(_))
        ));
    }

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            PROGRAMS_EXPLORED,
            WORKERS_LAUNCHED,
            WORKERS_CANCELLED,
            WORKER_FAILURES,
            TASKS_SOLVED,
            WORKERS_IN_FLIGHT,
        ] {
            assert!(name.starts_with("synth_"));
        }
    }
}
