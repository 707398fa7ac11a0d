// src/runtime/process_manager.rs
//! Process manager for solver subprocesses
//!
//! Spawns foreign solver executables with piped stdio in their own process
//! group, and force-terminates process groups on cancellation.

use crate::utils::errors::{EngineError, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// Configuration for spawning a process
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Executable to run
    pub program: PathBuf,

    /// Command-line arguments
    pub args: Vec<String>,
}

impl SpawnConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }
}

/// Spawns and terminates worker subprocesses
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessManager;

impl ProcessManager {
    pub fn new() -> Self {
        Self
    }

    /// Spawn a process with piped stdin/stdout in a fresh process group
    pub fn spawn(&self, config: &SpawnConfig) -> Result<Child> {
        debug!("Spawning process: {:?} {:?}", config.program, config.args);

        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0);

        let child = command.spawn().map_err(|e| {
            EngineError::ProcessSpawnFailed(format!(
                "Failed to spawn {:?}: {}",
                config.program, e
            ))
        })?;

        debug!("Process spawned with PID: {}", child.id());
        Ok(child)
    }

    /// Force-terminate a process and its process group.
    ///
    /// Processes that already exited are not an error.
    pub fn kill(&self, pid: u32) -> Result<()> {
        let target = Pid::from_raw(pid as i32);

        debug!("Sending SIGKILL to process group {}", pid);
        match killpg(target, Signal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) | Err(Errno::EPERM) => {
                debug!("No process group {}, sending SIGKILL to PID", pid);
                match kill(target, Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check if a process is running
    pub fn is_running(&self, pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_kill() {
        let manager = ProcessManager::new();
        let mut config = SpawnConfig::new("sleep");
        config.args = vec!["30".to_string()];

        let mut child = manager.spawn(&config).unwrap();
        let pid = child.id();
        assert!(manager.is_running(pid));

        manager.kill(pid).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_kill_exited_process_is_ok() {
        let manager = ProcessManager::new();
        let mut child = manager.spawn(&SpawnConfig::new("true")).unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(manager.kill(pid).is_ok());
    }

    #[test]
    fn test_spawn_missing_executable() {
        let manager = ProcessManager::new();
        let result = manager.spawn(&SpawnConfig::new("/nonexistent/solver"));
        assert!(matches!(result, Err(EngineError::ProcessSpawnFailed(_))));
    }
}
