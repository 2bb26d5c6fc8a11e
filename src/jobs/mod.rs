//! Job control
//!
//! Jobs are tracked by process group, keyed by job number (1-based, lowest
//! free number reused). The shell transfers the terminal to a foreground
//! job's group and reclaims it after waiting: but only through
//! [`JobManager::take_terminal`], which demands the [`InteractiveSignals`]
//! witness so the SIGTTOU-before-tcsetpgrp ordering cannot be violated.

pub mod signals;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::os::fd::BorrowedFd;

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

pub use signals::{InteractiveSignals, SignalManager, TrapAction, TrapTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Done => "Done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: Pid,
    pub state: JobState,
    pub exit_status: i32,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub pgid: Pid,
    pub state: JobState,
    pub foreground: bool,
    /// Original command text, for `jobs` output.
    pub text: String,
    pub procs: Vec<ProcEntry>,
    /// Marked by `disown -h`: survives SIGHUP and is not auto-removed.
    pub keep_on_hup: bool,
    /// Whether the user has been told about the latest state change.
    pub notified: bool,
}

impl Job {
    fn recompute_state(&mut self) {
        if self.procs.iter().all(|p| p.state == JobState::Done) {
            self.state = JobState::Done;
        } else if self.procs.iter().any(|p| p.state == JobState::Stopped) {
            self.state = JobState::Stopped;
        } else {
            self.state = JobState::Running;
        }
    }

    /// Exit status of the job: the last process's status.
    pub fn status(&self) -> i32 {
        self.procs.last().map(|p| p.exit_status).unwrap_or(0)
    }
}

/// The job table.
pub struct JobManager {
    jobs: BTreeMap<usize, Job>,
    current: Option<usize>,
    previous: Option<usize>,
    pub shell_pgid: Pid,
    pub job_control: bool,
    tty_fd: i32,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            current: None,
            previous: None,
            shell_pgid: nix::unistd::getpgrp(),
            job_control: false,
            tty_fd: 0,
        }
    }

    // =========================================================================
    // TABLE OPERATIONS
    // =========================================================================

    /// Register a job; returns its job number (lowest free, 1-based).
    pub fn register(&mut self, pgid: Pid, pids: &[Pid], text: String, foreground: bool) -> usize {
        let mut number = 1;
        while self.jobs.contains_key(&number) {
            number += 1;
        }
        let procs = pids
            .iter()
            .map(|&pid| ProcEntry {
                pid,
                state: JobState::Running,
                exit_status: 0,
            })
            .collect();
        self.jobs.insert(
            number,
            Job {
                pgid,
                state: JobState::Running,
                foreground,
                text,
                procs,
                keep_on_hup: false,
                notified: false,
            },
        );
        self.previous = self.current;
        self.current = Some(number);
        number
    }

    pub fn get(&self, number: usize) -> Option<&Job> {
        self.jobs.get(&number)
    }

    pub fn get_mut(&mut self, number: usize) -> Option<&mut Job> {
        self.jobs.get_mut(&number)
    }

    pub fn remove(&mut self, number: usize) -> Option<Job> {
        if self.current == Some(number) {
            self.current = self.previous;
            self.previous = None;
        }
        self.jobs.remove(&number)
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&usize, &Job)> {
        self.jobs.iter()
    }

    /// Resolve a job spec: `%+`/`%%` (current), `%-` (previous), `%N`,
    /// `%string` (prefix of the command text). A bare number works too.
    pub fn lookup(&self, spec: &str) -> Option<usize> {
        let body = spec.strip_prefix('%').unwrap_or(spec);
        match body {
            "+" | "%" | "" => self.current,
            "-" => self.previous.or(self.current),
            _ => {
                if let Ok(n) = body.parse::<usize>() {
                    return self.jobs.contains_key(&n).then_some(n);
                }
                self.jobs
                    .iter()
                    .find(|(_, job)| job.text.starts_with(body))
                    .map(|(n, _)| *n)
            }
        }
    }

    /// The pid of the last process of a job (what `$!` reports for
    /// background jobs).
    pub fn last_pid(&self, number: usize) -> Option<Pid> {
        self.jobs.get(&number).and_then(|j| j.procs.last()).map(|p| p.pid)
    }

    // =========================================================================
    // STATE UPDATES
    // =========================================================================

    /// Non-blocking reap: collect every pending status change and update the
    /// table. Called at safe points and when SIGCHLD was seen.
    pub fn update(&mut self) {
        loop {
            let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
            match waitpid(Pid::from_raw(-1), Some(flags)) {
                Ok(WaitStatus::StillAlive) | Err(_) => break,
                Ok(status) => {
                    if !self.note_status(status) {
                        break;
                    }
                }
            }
        }
    }

    /// Record one wait status; false when it belonged to no known job.
    fn note_status(&mut self, status: WaitStatus) -> bool {
        let (pid, state, code) = match status {
            WaitStatus::Exited(pid, code) => (pid, JobState::Done, code),
            WaitStatus::Signaled(pid, signal, _) => (pid, JobState::Done, 128 + signal as i32),
            WaitStatus::Stopped(pid, _) => (pid, JobState::Stopped, 148),
            WaitStatus::Continued(pid) => (pid, JobState::Running, 0),
            _ => return true,
        };
        for job in self.jobs.values_mut() {
            if let Some(entry) = job.procs.iter_mut().find(|p| p.pid == pid) {
                entry.state = state;
                entry.exit_status = code;
                job.recompute_state();
                job.notified = false;
                return true;
            }
        }
        true
    }

    /// Blocking wait for every process of a job. Returns the job's exit
    /// status (last command), or 128+SIGTSTP when it stopped. Waits pid by
    /// pid, which works whether or not the job has its own process group.
    pub fn wait_job(&mut self, number: usize) -> i32 {
        loop {
            let Some(job) = self.jobs.get(&number) else { return 127 };
            match job.state {
                JobState::Done => return self.jobs[&number].status(),
                JobState::Stopped => return 148,
                JobState::Running => {}
            }
            let Some(pid) = job
                .procs
                .iter()
                .find(|p| p.state == JobState::Running)
                .map(|p| p.pid)
            else {
                if let Some(job) = self.jobs.get_mut(&number) {
                    job.recompute_state();
                }
                continue;
            };
            match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
                Ok(status) => {
                    self.note_status(status);
                }
                Err(nix::errno::Errno::EINTR) => continue,
                Err(nix::errno::Errno::ECHILD) => {
                    // Already reaped asynchronously
                    if let Some(job) = self.jobs.get_mut(&number) {
                        if let Some(entry) = job.procs.iter_mut().find(|p| p.pid == pid) {
                            entry.state = JobState::Done;
                        }
                        job.recompute_state();
                    }
                }
                Err(_) => return 127,
            }
        }
    }

    /// Drop finished jobs from the table, returning what was removed.
    pub fn remove_done(&mut self) -> Vec<(usize, Job)> {
        let done: Vec<usize> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.state == JobState::Done)
            .map(|(n, _)| *n)
            .collect();
        done.into_iter()
            .filter_map(|n| self.remove(n).map(|job| (n, job)))
            .collect()
    }

    /// One `jobs`-style line for a job.
    pub fn format_job(&self, number: usize) -> Option<String> {
        let job = self.jobs.get(&number)?;
        let marker = if Some(number) == self.current {
            '+'
        } else if Some(number) == self.previous {
            '-'
        } else {
            ' '
        };
        let mut line = String::new();
        let _ = write!(
            line,
            "[{number}]{marker}  {:<8} {}",
            job.state.as_str(),
            job.text
        );
        Some(line)
    }

    // =========================================================================
    // TERMINAL CONTROL
    // =========================================================================

    /// Give the terminal to a job's process group. The `InteractiveSignals`
    /// witness proves the stop signals are already ignored.
    pub fn take_terminal(&self, witness: &InteractiveSignals, pgid: Pid) {
        SignalManager::ensure_ttou_ignored(witness);
        let fd = unsafe { BorrowedFd::borrow_raw(self.tty_fd) };
        let _ = nix::unistd::tcsetpgrp(fd, pgid);
    }

    /// Reclaim the terminal for the shell, re-asserting the SIGTTOU ignore
    /// disposition first.
    pub fn restore_terminal(&self, witness: &InteractiveSignals) {
        SignalManager::ensure_ttou_ignored(witness);
        let fd = unsafe { BorrowedFd::borrow_raw(self.tty_fd) };
        let _ = nix::unistd::tcsetpgrp(fd, self.shell_pgid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_job(manager: &mut JobManager, text: &str) -> usize {
        let pid = Pid::from_raw(99999);
        manager.register(pid, &[pid], text.to_string(), false)
    }

    #[test]
    fn test_register_lowest_free_number() {
        let mut manager = JobManager::new();
        let a = dummy_job(&mut manager, "sleep 1");
        let b = dummy_job(&mut manager, "sleep 2");
        assert_eq!((a, b), (1, 2));
        manager.remove(1);
        let c = dummy_job(&mut manager, "sleep 3");
        assert_eq!(c, 1);
    }

    #[test]
    fn test_lookup_specs() {
        let mut manager = JobManager::new();
        let a = dummy_job(&mut manager, "make all");
        let b = dummy_job(&mut manager, "sleep 5");
        assert_eq!(manager.lookup("%+"), Some(b));
        assert_eq!(manager.lookup("%-"), Some(a));
        assert_eq!(manager.lookup("%1"), Some(a));
        assert_eq!(manager.lookup("%make"), Some(a));
        assert_eq!(manager.lookup("%nope"), None);
    }

    #[test]
    fn test_job_state_recompute() {
        let pid = Pid::from_raw(1234);
        let mut job = Job {
            pgid: pid,
            state: JobState::Running,
            foreground: false,
            text: "x".into(),
            procs: vec![
                ProcEntry {
                    pid,
                    state: JobState::Done,
                    exit_status: 0,
                },
                ProcEntry {
                    pid: Pid::from_raw(1235),
                    state: JobState::Running,
                    exit_status: 0,
                },
            ],
            keep_on_hup: false,
            notified: false,
        };
        job.recompute_state();
        assert_eq!(job.state, JobState::Running);
        job.procs[1].state = JobState::Done;
        job.procs[1].exit_status = 3;
        job.recompute_state();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.status(), 3);
    }

    #[test]
    fn test_format_job() {
        let mut manager = JobManager::new();
        let n = dummy_job(&mut manager, "sleep 10 &");
        let line = manager.format_job(n).unwrap();
        assert!(line.starts_with("[1]+"));
        assert!(line.contains("Running"));
        assert!(line.contains("sleep 10"));
    }
}
