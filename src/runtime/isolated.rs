// src/runtime/isolated.rs
//! Isolated backend: one forked process per search
//!
//! ```text
//!   worker thread                         forked child
//!   -------------                         ------------
//!   pipe() + fork() ------------------->  setpgid(0, 0)
//!   report_child(pid)                     close inherited fds
//!   read reply until EOF                  apply rlimits
//!        |                                run the anytime search
//!        |  <---- JSON reply ------------ write reply, _exit
//!   waitpid(pid)
//! ```
//!
//! The child works on its own copy of the grammar and task. Cancelling it
//! means killing its process group; the parent then sees EOF without a
//! reply and reports a terminated worker.

use crate::runtime::cancellation::CancellationToken;
use crate::runtime::solver::{InProcessSolver, IsolatedSolver, SolveRequest, SolveResult, SolverBackend};
use crate::search::grammar::{Grammar, Term};
use crate::utils::errors::{EngineError, Result};
use nix::sys::wait::waitpid;
use nix::unistd::{fork, setpgid, ForkResult, Pid};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{FromRawFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// Reply written by the child process
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case", bound = "T: Term")]
enum ChildReply<T> {
    Success { result: SolveResult<T> },
    Failure { message: String },
}

impl SolverBackend for IsolatedSolver {
    fn solve<G: Grammar>(
        &self,
        request: &SolveRequest<'_, G>,
        cancel: &CancellationToken,
        report_child: &mut dyn FnMut(u32),
    ) -> Result<SolveResult<G::Term>> {
        let (read_fd, write_fd) = open_pipe()?;

        // SAFETY: the child only runs the search, writes to its end of the
        // pipe and leaves through `_exit`, never returning into the caller.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                // SAFETY: both descriptors were just created by `pipe` and are
                // owned by nothing else in this process.
                unsafe { libc::close(read_fd) };
                let writer = unsafe { File::from_raw_fd(write_fd) };
                let code = run_child(self, request, cancel, writer, write_fd);
                unsafe { libc::_exit(code) }
            }
            Ok(ForkResult::Parent { child }) => {
                // SAFETY: see above; the parent keeps only the read end.
                unsafe { libc::close(write_fd) };
                let mut reader = unsafe { File::from_raw_fd(read_fd) };

                // The child does the same; whichever runs first wins.
                let _ = setpgid(child, child);

                let pid = child.as_raw() as u32;
                debug!("Isolated worker process {} started for {}", pid, request.task.name());
                report_child(pid);

                let mut reply = Vec::new();
                let read_result = reader.read_to_end(&mut reply);
                let status = waitpid(child, None)?;
                read_result?;

                if reply.is_empty() {
                    return Err(EngineError::WorkerTerminated {
                        pid,
                        status: format!("{:?}", status),
                    });
                }

                match serde_json::from_slice::<ChildReply<G::Term>>(&reply) {
                    Ok(ChildReply::Success { result }) => Ok(result),
                    Ok(ChildReply::Failure { message }) => Err(EngineError::ChildFailed(message)),
                    Err(e) => Err(EngineError::MalformedResponse(format!(
                        "unreadable reply from worker process {}: {}",
                        pid, e
                    ))),
                }
            }
            Err(e) => {
                // SAFETY: fork failed, so both ends are still only ours.
                unsafe {
                    libc::close(read_fd);
                    libc::close(write_fd);
                }
                Err(EngineError::ProcessSpawnFailed(format!(
                    "fork failed: {}",
                    e
                )))
            }
        }
    }
}

fn open_pipe() -> Result<(RawFd, RawFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors `pipe` writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok((fds[0], fds[1]))
}

/// Body of the forked child; returns its exit code
fn run_child<G: Grammar>(
    solver: &IsolatedSolver,
    request: &SolveRequest<'_, G>,
    cancel: &CancellationToken,
    mut writer: File,
    keep_fd: RawFd,
) -> i32 {
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));

    // Pipes of sibling searches leak into this process through fork. Holding
    // them open would keep those parents waiting for EOF until we exit.
    close_inherited_fds(keep_fd);

    let reply = panic::catch_unwind(AssertUnwindSafe(|| {
        solver.limits.apply_to_current_process()?;
        InProcessSolver.solve(request, cancel, &mut |_| {})
    }));

    let reply = match reply {
        Ok(Ok(result)) => ChildReply::Success { result },
        Ok(Err(e)) => ChildReply::Failure {
            message: e.to_string(),
        },
        Err(payload) => ChildReply::Failure {
            message: format!("search panicked: {}", panic_message(payload.as_ref())),
        },
    };

    if serde_json::to_writer(&mut writer, &reply).is_err() || writer.flush().is_err() {
        return 1;
    }
    0
}

fn close_inherited_fds(keep_fd: RawFd) {
    let fds: Vec<RawFd> = match std::fs::read_dir("/proc/self/fd") {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().and_then(|name| name.parse().ok()))
            .collect(),
        Err(_) => return,
    };

    for fd in fds {
        if fd > 2 && fd != keep_fd {
            // SAFETY: nothing else in the child uses these descriptors.
            unsafe { libc::close(fd) };
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::process_manager::ProcessManager;
    use crate::search::fixtures::{Literal, LiteralGrammar, LiteralType, PredicateTask};
    use std::time::Duration;

    fn request<'a>(
        grammar: &'a LiteralGrammar,
        task: &'a PredicateTask,
        timeout: Duration,
    ) -> SolveRequest<'a, LiteralGrammar> {
        SolveRequest {
            grammar,
            task,
            elapsed: Duration::from_secs(2),
            lower_bound: 0.0,
            upper_bound: 20.0,
            budget_increment: 1.0,
            timeout,
            evaluation_timeout: None,
            maximum_frontier: 2,
        }
    }

    #[test]
    fn test_isolated_search_returns_child_result() {
        let grammar = LiteralGrammar::new();
        let task = PredicateTask::accepting(
            "odd-small",
            LiteralType::Int,
            vec![Literal::Int(1), Literal::Int(5)],
        );

        let mut children = Vec::new();
        let result = IsolatedSolver::default()
            .solve(
                &request(&grammar, &task, Duration::from_secs(10)),
                &CancellationToken::new(),
                &mut |pid| children.push(pid),
            )
            .unwrap();

        assert_eq!(children.len(), 1);
        assert_eq!(result.frontier.len(), 2);
        assert!(result.frontier.contains(&Literal::Int(1)));
        assert!(result.frontier.contains(&Literal::Int(5)));
        assert_eq!(result.programs_explored, 6);
        assert!(result.search_time.unwrap() >= Duration::from_secs(2));
    }

    #[test]
    fn test_killed_child_reports_termination() {
        let grammar = LiteralGrammar::new();
        let task = PredicateTask::accepting("never", LiteralType::Int, vec![])
            .with_evaluation_delay(Duration::from_millis(50));

        let result = IsolatedSolver::default().solve(
            &request(&grammar, &task, Duration::from_secs(30)),
            &CancellationToken::new(),
            &mut |pid| ProcessManager::new().kill(pid).unwrap(),
        );

        match result {
            Err(e @ EngineError::WorkerTerminated { .. }) => assert!(e.is_recoverable()),
            other => panic!("expected terminated worker, got {:?}", other),
        }
    }

    #[test]
    fn test_child_errors_are_reported() {
        let grammar = LiteralGrammar::new();
        let task = PredicateTask::accepting("any", LiteralType::Int, vec![]);
        let mut bad = request(&grammar, &task, Duration::from_secs(1));
        bad.budget_increment = 0.0;

        let result = IsolatedSolver::default().solve(&bad, &CancellationToken::new(), &mut |_| {});
        assert!(matches!(result, Err(EngineError::ChildFailed(_))));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }
}
