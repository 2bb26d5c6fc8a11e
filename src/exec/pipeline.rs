//! Pipeline execution
//!
//! Multi-command pipelines create N-1 pipes and fork one child per stage.
//! The first child becomes the pipeline's process-group leader; later
//! children join its group. A parent-owned synchronization pipe holds the
//! non-leader children until the parent has called `setpgid` on every
//! member, closing the classic race where a child runs before its group
//! exists. Foreground pipelines receive the terminal via `tcsetpgrp`.

use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

use nix::unistd::{close, dup2, fork, getpid, pipe, read, setpgid, ForkResult, Pid};

use crate::ast::types::CommandNode;
use crate::exec::errors::{ControlFlow, ExecError};
use crate::exec::evaluator;
use crate::jobs::signals;
use crate::shell::Shell;

/// Run a multi-command pipeline (`commands.len() >= 2`). Returns the exit
/// status: the last stage's, or the first non-zero stage under `pipefail`.
pub fn exec_multi_pipeline(
    shell: &mut Shell,
    commands: &[CommandNode],
    text: &str,
) -> Result<i32, ExecError> {
    let n = commands.len();
    debug_assert!(n >= 2);

    let mut pipes: Vec<(OwnedFd, OwnedFd)> = Vec::with_capacity(n - 1);
    for _ in 0..n - 1 {
        pipes.push(pipe().map_err(|e| ExecError::Fatal {
            status: 1,
            message: format!("pipe failed: {e}"),
        })?);
    }
    let (sync_read, sync_write) = pipe().map_err(|e| ExecError::Fatal {
        status: 1,
        message: format!("pipe failed: {e}"),
    })?;

    let sync_read_fd = sync_read.as_raw_fd();
    let sync_write_fd = sync_write.as_raw_fd();

    let job_control = shell.job_control_active();
    let mut pids: Vec<Pid> = Vec::with_capacity(n);
    let mut pgid: Option<Pid> = None;

    for (i, command) in commands.iter().enumerate() {
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let raw_pipes: Vec<(RawFd, RawFd)> = pipes
                    .iter()
                    .map(|(r, w)| (r.as_raw_fd(), w.as_raw_fd()))
                    .collect();

                if job_control {
                    let pid = getpid();
                    let group = pgid.unwrap_or(pid);
                    let _ = setpgid(Pid::from_raw(0), group);
                    if i > 0 {
                        // Wait until the parent has placed every member
                        let _ = close(sync_write_fd);
                        let mut byte = [0u8; 1];
                        let _ = read(sync_read_fd, &mut byte);
                    }
                }
                let _ = close(sync_read_fd);
                if i == 0 || !job_control {
                    let _ = close(sync_write_fd);
                }

                if i > 0 {
                    let _ = dup2(raw_pipes[i - 1].0, 0);
                }
                if i < n - 1 {
                    let _ = dup2(raw_pipes[i].1, 1);
                }
                for (r, w) in raw_pipes {
                    let _ = close(r);
                    let _ = close(w);
                }

                signals::reset_child_signals();
                shell.in_forked_child = true;
                shell.enter_subshell();
                // A stage that is one simple command may exec in place
                shell.exec_final = matches!(command, CommandNode::Simple(_));

                let status = match evaluator::exec_command(shell, command) {
                    Ok(status) => status,
                    Err(ExecError::Flow(ControlFlow::Exit(code)))
                    | Err(ExecError::Flow(ControlFlow::Return(code))) => code,
                    Err(ExecError::Flow(_)) => 0,
                    Err(e) => {
                        shell.report_error(&e);
                        1
                    }
                };
                shell.exit_process(status);
            }
            Ok(ForkResult::Parent { child }) => {
                if pgid.is_none() {
                    pgid = Some(child);
                }
                if job_control {
                    let _ = setpgid(child, pgid.unwrap());
                }
                pids.push(child);
            }
            Err(e) => {
                return Err(ExecError::Fatal {
                    status: 1,
                    message: format!("fork failed: {e}"),
                })
            }
        }
    }

    // Close our pipe ends, then release the children by closing the sync
    // pipe's write end (they observe EOF).
    drop(pipes);
    drop(sync_read);
    drop(sync_write);

    let pgid = pgid.unwrap();
    let number = shell.jobs.register(pgid, &pids, text.to_string(), true);

    let took_terminal = if job_control {
        if let Some(witness) = shell.interactive_signals.as_ref() {
            shell.jobs.take_terminal(witness, pgid);
            true
        } else {
            false
        }
    } else {
        false
    };

    let mut status = shell.jobs.wait_job(number);

    if took_terminal {
        if let Some(witness) = shell.interactive_signals.as_ref() {
            shell.jobs.restore_terminal(witness);
        }
    }

    if shell.options.pipefail {
        if let Some(job) = shell.jobs.get(number) {
            if let Some(first_fail) = job
                .procs
                .iter()
                .map(|p| p.exit_status)
                .find(|&code| code != 0)
            {
                status = first_fail;
            }
        }
    }

    if shell
        .jobs
        .get(number)
        .is_some_and(|job| job.state == crate::jobs::JobState::Done)
    {
        shell.jobs.remove(number);
    }
    Ok(status)
}

/// Run an entire pipeline in the background: fork a wrapper child that
/// becomes the job's process-group leader and runs the pipeline
/// synchronously inside.
pub fn exec_background(
    shell: &mut Shell,
    pipeline: &crate::ast::types::PipelineNode,
    text: &str,
) -> Result<i32, ExecError> {
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            if shell.job_control_active() {
                let pid = getpid();
                let _ = setpgid(pid, pid);
            }
            signals::reset_child_signals();
            // Background jobs read from /dev/null unless redirected
            if let Ok(devnull) = std::fs::File::open("/dev/null") {
                let fd = devnull.into_raw_fd();
                let _ = dup2(fd, 0);
                let _ = close(fd);
            }
            shell.in_forked_child = true;
            shell.enter_subshell();
            let mut foreground = pipeline.clone();
            foreground.background = false;
            let status = match evaluator::exec_pipeline(shell, &foreground) {
                Ok(status) => status,
                Err(ExecError::Flow(ControlFlow::Exit(code))) => code,
                Err(_) => 1,
            };
            shell.exit_process(status);
        }
        Ok(ForkResult::Parent { child }) => {
            if shell.job_control_active() {
                let _ = setpgid(child, child);
            }
            let number = shell
                .jobs
                .register(child, &[child], text.to_string(), false);
            shell.vars.last_bg_pid = Some(child.as_raw() as u32);
            if shell.interactive {
                eprintln!("[{number}] {child}");
            }
            Ok(0)
        }
        Err(e) => Err(ExecError::Fatal {
            status: 1,
            message: format!("fork failed: {e}"),
        }),
    }
}
