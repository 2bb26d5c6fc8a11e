//! Process launcher
//!
//! PATH search, fork and exec of external commands. Every forked child
//! resets its signal dispositions to the defaults before `exec`; foreground
//! children of an interactive shell get their own process group and the
//! terminal.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::unistd::{execve, fork, getpid, setpgid, ForkResult, Pid};

use crate::ast::types::RedirectNode;
use crate::exec::errors::ExecError;
use crate::exec::redirect;
use crate::expansion::command_subst::wait_for_child;
use crate::jobs::signals;
use crate::shell::Shell;

/// Locate `name` on `$PATH` (or directly when it contains a slash).
/// Returns the path even when not executable so exec can report 126.
pub fn find_in_path(shell: &Shell, name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        return path.exists().then_some(path);
    }
    let path_var = shell.vars.get("PATH").unwrap_or_default();
    for dir in path_var.split(':') {
        let dir = if dir.is_empty() { "." } else { dir };
        let candidate = Path::new(dir).join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    nix::unistd::access(path, nix::unistd::AccessFlags::X_OK).is_ok()
}

/// Exec `argv` in the current process (never returns on success). Exits
/// 126 when found but not executable, 127 when exec fails outright.
pub fn exec_in_place(shell: &mut Shell, path: &Path, argv: &[String], env: &[(String, String)]) -> ! {
    signals::reset_child_signals();

    let c_path = match CString::new(path.as_os_str().as_encoded_bytes()) {
        Ok(c) => c,
        Err(_) => {
            eprintln!("psh: {}: bad command path", path.display());
            shell.exit_process(127);
        }
    };
    let c_args: Vec<CString> = argv
        .iter()
        .filter_map(|a| CString::new(a.as_bytes()).ok())
        .collect();
    let c_env: Vec<CString> = env
        .iter()
        .filter_map(|(k, v)| CString::new(format!("{k}={v}")).ok())
        .collect();

    match execve(&c_path, &c_args, &c_env) {
        Err(Errno::EACCES) => {
            eprintln!("psh: {}: Permission denied", path.display());
            shell.exit_process(126);
        }
        Err(Errno::ENOEXEC) if is_executable(path) => {
            eprintln!("psh: {}: cannot execute binary file", path.display());
            shell.exit_process(126);
        }
        Err(_) => {
            eprintln!("psh: {}: command not found", path.display());
            shell.exit_process(127);
        }
        Ok(_) => unreachable!(),
    }
}

/// Run an external command: fork, wire up the process group and terminal,
/// apply redirects in the child, exec, and wait (or register a job).
#[allow(clippy::too_many_arguments)]
pub fn launch_external(
    shell: &mut Shell,
    path: &Path,
    argv: &[String],
    redirects: &[RedirectNode],
    env: Vec<(String, String)>,
    background: bool,
    text: &str,
) -> Result<i32, ExecError> {
    // A pipeline-stage child whose entire job is this one command execs in
    // place instead of forking again.
    if std::mem::take(&mut shell.exec_final) && !background {
        redirect::apply_redirects(shell, redirects, None)?;
        exec_in_place(shell, path, argv, &env);
    }

    if shell.options.debug_exec_fork {
        eprintln!("psh: fork+exec {}", path.display());
    }

    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            if shell.job_control_active() {
                let pid = getpid();
                let _ = setpgid(pid, pid);
            }
            if let Err(e) = redirect::apply_redirects(shell, redirects, None) {
                shell.report_error(&e);
                shell.exit_process(1);
            }
            exec_in_place(shell, path, argv, &env);
        }
        Ok(ForkResult::Parent { child }) => {
            if shell.job_control_active() {
                // Both sides call setpgid to close the race
                let _ = setpgid(child, child);
            }
            if background {
                let number = shell
                    .jobs
                    .register(child, &[child], text.to_string(), false);
                shell.vars.last_bg_pid = Some(child.as_raw() as u32);
                if shell.interactive {
                    eprintln!("[{number}] {child}");
                }
                return Ok(0);
            }
            let status = wait_foreground(shell, child);
            Ok(status)
        }
        Err(e) => Err(ExecError::Fatal {
            status: 1,
            message: format!("fork failed: {e}"),
        }),
    }
}

/// Wait for a foreground child, transferring the terminal when job control
/// is on and reclaiming it afterwards.
pub fn wait_foreground(shell: &mut Shell, child: Pid) -> i32 {
    let took_terminal = if shell.job_control_active() {
        if let Some(witness) = shell.interactive_signals.as_ref() {
            shell.jobs.take_terminal(witness, child);
            true
        } else {
            false
        }
    } else {
        false
    };

    let status = wait_for_child(child);

    if took_terminal {
        if let Some(witness) = shell.interactive_signals.as_ref() {
            shell.jobs.restore_terminal(witness);
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_in_path_absolute() {
        let shell = Shell::new();
        assert_eq!(
            find_in_path(&shell, "/bin/sh"),
            Some(PathBuf::from("/bin/sh"))
        );
        assert_eq!(find_in_path(&shell, "/no/such/binary/zz"), None);
    }

    #[test]
    fn test_find_in_path_search() {
        let mut shell = Shell::new();
        shell.vars.set_scalar("PATH", "/usr/bin:/bin").unwrap();
        let found = find_in_path(&shell, "sh").expect("sh on PATH");
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn test_not_found() {
        let mut shell = Shell::new();
        shell.vars.set_scalar("PATH", "/nonexistent").unwrap();
        assert_eq!(find_in_path(&shell, "definitely-not-a-command"), None);
    }
}
