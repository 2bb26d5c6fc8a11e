//! Command and process substitution
//!
//! `$(...)` and backticks fork a child that runs the inner command in a
//! fresh shell with its stdout on a pipe; the parent reads to EOF, strips
//! all trailing newlines, and waits. SIGCHLD is held around the wait so the
//! job manager does not race for the status.
//!
//! `<(cmd)` / `>(cmd)` fork a child wired to a pipe and substitute a
//! `/dev/fd/N` path; the caller cleans the children up after the enclosing
//! command finishes.

use std::fs::File;
use std::io::Read;
use std::os::fd::IntoRawFd;

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{close, dup2, fork, pipe, ForkResult, Pid};

use crate::expansion::ExpansionError;
use crate::jobs::signals;
use crate::shell::Shell;

/// Run `command` in a forked subshell and return its output with trailing
/// newlines stripped.
pub fn command_substitute(shell: &mut Shell, command: &str) -> Result<String, ExpansionError> {
    let (read_end, write_end) =
        pipe().map_err(|e| ExpansionError::CommandSubstitutionFailed(e.to_string()))?;

    let old_mask = signals::block_sigchld();
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            signals::restore_mask(&old_mask);
            drop(read_end);
            let write_fd = write_end.into_raw_fd();
            let _ = dup2(write_fd, 1);
            if write_fd != 1 {
                let _ = close(write_fd);
            }
            shell.enter_subshell();
            let status = shell.run_string(command);
            shell.exit_process(status);
        }
        Ok(ForkResult::Parent { child }) => {
            drop(write_end);
            let mut output = String::new();
            let mut reader = File::from(read_end);
            let _ = reader.read_to_string(&mut output);
            drop(reader);

            let status = wait_for_child(child);
            signals::restore_mask(&old_mask);

            while output.ends_with('\n') {
                output.pop();
            }
            shell.last_cmdsub_status = status;
            Ok(output)
        }
        Err(e) => {
            signals::restore_mask(&old_mask);
            Err(ExpansionError::CommandSubstitutionFailed(e.to_string()))
        }
    }
}

/// Fork `command` with one end of a pipe and return a `/dev/fd/N` path for
/// the other end. `is_input` selects `<(cmd)` (the caller reads) versus
/// `>(cmd)` (the caller writes).
pub fn process_substitute(
    shell: &mut Shell,
    command: &str,
    is_input: bool,
) -> Result<String, ExpansionError> {
    let (read_end, write_end) =
        pipe().map_err(|e| ExpansionError::Io(e.to_string()))?;

    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            if is_input {
                drop(read_end);
                let fd = write_end.into_raw_fd();
                let _ = dup2(fd, 1);
                if fd != 1 {
                    let _ = close(fd);
                }
            } else {
                drop(write_end);
                let fd = read_end.into_raw_fd();
                let _ = dup2(fd, 0);
                if fd != 0 {
                    let _ = close(fd);
                }
            }
            signals::reset_child_signals();
            shell.enter_subshell();
            let status = shell.run_string(command);
            shell.exit_process(status);
        }
        Ok(ForkResult::Parent { child }) => {
            let kept = if is_input {
                drop(write_end);
                read_end.into_raw_fd()
            } else {
                drop(read_end);
                write_end.into_raw_fd()
            };
            shell.procsubs.push((kept, child));
            Ok(format!("/dev/fd/{kept}"))
        }
        Err(e) => Err(ExpansionError::Io(e.to_string())),
    }
}

/// Blocking wait mapping the wait status to a shell exit status.
pub fn wait_for_child(child: Pid) -> i32 {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return code,
            Ok(WaitStatus::Signaled(_, signal, _)) => return 128 + signal as i32,
            Ok(WaitStatus::Stopped(..)) | Ok(WaitStatus::Continued(_)) => continue,
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => return 127,
        }
    }
}
