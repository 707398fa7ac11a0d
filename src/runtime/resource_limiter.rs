// src/runtime/resource_limiter.rs
//! Resource limits for isolated worker processes
//!
//! Limits are applied with `setrlimit` inside the forked worker, so a
//! search that blows up only takes down its own process:
//! - Address space (MB)
//! - CPU time (seconds)

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Resource limits for a worker process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Address-space limit in megabytes
    /// Example: 2048 = 2GB virtual memory
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,

    /// CPU-time limit in seconds
    /// Example: 600 = ten CPU minutes, then SIGXCPU
    #[serde(default)]
    pub cpu_time_secs: Option<u64>,
}

impl ResourceLimits {
    /// No restrictions
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Tight limits for untrusted oracles
    pub fn strict() -> Self {
        Self {
            memory_limit_mb: Some(1024),
            cpu_time_secs: Some(300),
        }
    }

    /// Generous limits that still stop runaway searches
    pub fn relaxed() -> Self {
        Self {
            memory_limit_mb: Some(8192),
            cpu_time_secs: None,
        }
    }

    /// Validate resource limits
    pub fn validate(&self) -> Result<()> {
        if let Some(memory) = self.memory_limit_mb {
            if memory < 64 {
                return Err(EngineError::InvalidConfig(
                    "Memory limit cannot be less than 64MB".to_string(),
                ));
            }
            if memory > 1024 * 1024 {
                return Err(EngineError::InvalidConfig(
                    "Memory limit cannot exceed 1TB".to_string(),
                ));
            }
        }

        if self.cpu_time_secs == Some(0) {
            return Err(EngineError::InvalidConfig(
                "CPU time limit cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply the limits to the calling process
    pub fn apply_to_current_process(&self) -> Result<()> {
        use nix::sys::resource::{setrlimit, Resource};

        if let Some(memory) = self.memory_limit_mb {
            let bytes = memory * 1024 * 1024;
            debug!("Setting address-space limit to {}MB", memory);
            setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
        }

        if let Some(seconds) = self.cpu_time_secs {
            debug!("Setting CPU-time limit to {}s", seconds);
            // soft limit raises SIGXCPU, hard limit one second later SIGKILL
            setrlimit(Resource::RLIMIT_CPU, seconds, seconds + 1)?;
        }

        Ok(())
    }
}
