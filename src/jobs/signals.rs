//! Signal management and traps
//!
//! Handler installation for the interactive shell, disposition reset for
//! forked children, SIGCHLD bookkeeping, and the trap table.
//!
//! Ordering invariant: an interactive shell must ignore SIGTTOU/SIGTTIN/
//! SIGTSTP *before* it takes terminal control, or the kernel stops it on
//! `tcsetpgrp`. This is encoded structurally: only
//! [`SignalManager::install_interactive_handlers`] can mint the
//! [`InteractiveSignals`] witness that `JobManager::take_terminal` requires.

use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use nix::sys::signal::{
    sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};

const MAX_SIGNO: usize = 64;

static PENDING_SIGNALS: [AtomicBool; MAX_SIGNO] = {
    #[allow(clippy::declare_interior_mutable_const)]
    const FLAG: AtomicBool = AtomicBool::new(false);
    [FLAG; MAX_SIGNO]
};
static SIGCHLD_SEEN: AtomicBool = AtomicBool::new(false);
static SIGINT_SEEN: AtomicBool = AtomicBool::new(false);

extern "C" fn note_signal(signo: libc::c_int) {
    if let Ok(idx) = usize::try_from(signo) {
        if idx < MAX_SIGNO {
            PENDING_SIGNALS[idx].store(true, Ordering::SeqCst);
        }
    }
}

extern "C" fn note_sigchld(_signo: libc::c_int) {
    SIGCHLD_SEEN.store(true, Ordering::SeqCst);
}

extern "C" fn note_sigint(signo: libc::c_int) {
    SIGINT_SEEN.store(true, Ordering::SeqCst);
    note_signal(signo);
}

/// Witness that the interactive signal dispositions are installed. Required
/// by `JobManager::take_terminal`, which makes the unsafe ordering
/// unrepresentable.
pub struct InteractiveSignals {
    _private: (),
}

pub struct SignalManager;

impl SignalManager {
    /// Install the interactive dispositions: ignore the job-control stop
    /// signals first, then arrange SIGINT/SIGCHLD notification.
    pub fn install_interactive_handlers() -> InteractiveSignals {
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
        for signal in [Signal::SIGTTOU, Signal::SIGTTIN, Signal::SIGTSTP, Signal::SIGQUIT] {
            unsafe {
                let _ = sigaction(signal, &ignore);
            }
        }
        let int_action = SigAction::new(
            SigHandler::Handler(note_sigint),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        unsafe {
            let _ = sigaction(Signal::SIGINT, &int_action);
        }
        Self::install_sigchld_handler();
        InteractiveSignals { _private: () }
    }

    /// Non-interactive shells only need asynchronous child reaping.
    pub fn install_sigchld_handler() {
        let action = SigAction::new(
            SigHandler::Handler(note_sigchld),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        unsafe {
            let _ = sigaction(Signal::SIGCHLD, &action);
        }
    }

    /// Re-install the SIGTTOU ignore disposition. Idempotent; used before
    /// the shell reclaims the terminal.
    pub fn ensure_ttou_ignored(_witness: &InteractiveSignals) {
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
        unsafe {
            let _ = sigaction(Signal::SIGTTOU, &ignore);
        }
    }

    /// Install a recording handler for a trapped signal.
    pub fn install_trap_handler(signal: Signal) {
        let action = SigAction::new(
            SigHandler::Handler(note_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        unsafe {
            let _ = sigaction(signal, &action);
        }
    }

    /// Set a signal back to its default disposition.
    pub fn set_default(signal: Signal) {
        let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        unsafe {
            let _ = sigaction(signal, &action);
        }
    }

    /// Set a signal to be ignored.
    pub fn set_ignored(signal: Signal) {
        let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        unsafe {
            let _ = sigaction(signal, &action);
        }
    }
}

/// Reset the dispositions a child must not inherit before `exec`.
pub fn reset_child_signals() {
    for signal in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTOU,
        Signal::SIGTTIN,
        Signal::SIGCHLD,
        Signal::SIGPIPE,
    ] {
        SignalManager::set_default(signal);
    }
}

/// Block SIGCHLD, returning the previous mask for [`restore_mask`].
pub fn block_sigchld() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    let mut old = SigSet::empty();
    let _ = sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut old));
    old
}

pub fn restore_mask(old: &SigSet) {
    let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(old), None);
}

/// True once since the last call when SIGCHLD arrived.
pub fn take_sigchld_flag() -> bool {
    SIGCHLD_SEEN.swap(false, Ordering::SeqCst)
}

/// True once since the last call when SIGINT arrived.
pub fn take_sigint_flag() -> bool {
    SIGINT_SEEN.swap(false, Ordering::SeqCst)
}

/// Drain the set of signal numbers received since the last call.
pub fn take_pending_signals() -> Vec<i32> {
    let mut out = Vec::new();
    for (signo, flag) in PENDING_SIGNALS.iter().enumerate() {
        if flag.swap(false, Ordering::SeqCst) {
            out.push(signo as i32);
        }
    }
    out
}

// =============================================================================
// TRAP TABLE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TrapAction {
    #[default]
    Default,
    Ignore,
    Command(String),
}

/// Trap table: canonical signal name to action. `EXIT`, `DEBUG` and `ERR`
/// are pseudo-signals fired by the evaluator. Iteration order is insertion
/// order, which keeps `trap` listings stable.
#[derive(Debug, Clone, Default)]
pub struct TrapTable {
    actions: IndexMap<String, TrapAction>,
}

impl TrapTable {
    pub fn set(&mut self, name: String, action: TrapAction) {
        self.actions.insert(name, action);
    }

    pub fn get(&self, name: &str) -> Option<&TrapAction> {
        self.actions.get(name)
    }

    pub fn remove(&mut self, name: &str) {
        self.actions.shift_remove(name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TrapAction)> {
        self.actions.iter()
    }

    /// The command for a real-signal trap, by signal number.
    pub fn command_for_signo(&self, signo: i32) -> Option<&str> {
        let signal = Signal::try_from(signo).ok()?;
        let name = signal.as_str().strip_prefix("SIG")?;
        match self.actions.get(name) {
            Some(TrapAction::Command(cmd)) => Some(cmd.as_str()),
            _ => None,
        }
    }

    /// Reset all traps to default (used when entering a subshell).
    pub fn reset_for_subshell(&mut self) {
        self.actions
            .retain(|_, action| matches!(action, TrapAction::Ignore));
    }
}

/// Normalize a user-supplied trap spec (`INT`, `SIGINT`, `2`, `EXIT`, `0`)
/// to a canonical name.
pub fn canonical_trap_name(spec: &str) -> Option<String> {
    let upper = spec.to_uppercase();
    match upper.as_str() {
        "EXIT" | "0" => return Some("EXIT".to_string()),
        "DEBUG" => return Some("DEBUG".to_string()),
        "ERR" => return Some("ERR".to_string()),
        "RETURN" => return Some("RETURN".to_string()),
        _ => {}
    }
    if let Ok(signo) = spec.parse::<i32>() {
        let signal = Signal::try_from(signo).ok()?;
        return signal.as_str().strip_prefix("SIG").map(str::to_string);
    }
    let name = upper.strip_prefix("SIG").unwrap_or(&upper);
    let full = format!("SIG{name}");
    let signal: Signal = full.parse().ok()?;
    signal.as_str().strip_prefix("SIG").map(str::to_string)
}

/// The `Signal` for a canonical trap name (none for pseudo-signals).
pub fn signal_for_trap(name: &str) -> Option<Signal> {
    if matches!(name, "EXIT" | "DEBUG" | "ERR" | "RETURN") {
        return None;
    }
    format!("SIG{name}").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_trap_names() {
        assert_eq!(canonical_trap_name("INT").as_deref(), Some("INT"));
        assert_eq!(canonical_trap_name("SIGINT").as_deref(), Some("INT"));
        assert_eq!(canonical_trap_name("2").as_deref(), Some("INT"));
        assert_eq!(canonical_trap_name("0").as_deref(), Some("EXIT"));
        assert_eq!(canonical_trap_name("exit").as_deref(), Some("EXIT"));
        assert_eq!(canonical_trap_name("NOPE"), None);
    }

    #[test]
    fn test_signal_for_trap() {
        assert_eq!(signal_for_trap("INT"), Some(Signal::SIGINT));
        assert_eq!(signal_for_trap("EXIT"), None);
        assert_eq!(signal_for_trap("DEBUG"), None);
    }

    #[test]
    fn test_trap_table_roundtrip() {
        let mut table = TrapTable::default();
        table.set("INT".into(), TrapAction::Command("echo int".into()));
        table.set("EXIT".into(), TrapAction::Command("echo bye".into()));
        assert!(matches!(
            table.get("INT"),
            Some(TrapAction::Command(c)) if c == "echo int"
        ));
        let names: Vec<&String> = table.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["INT", "EXIT"]);
        table.remove("INT");
        assert!(table.get("INT").is_none());
    }

    #[test]
    fn test_subshell_reset_keeps_ignores() {
        let mut table = TrapTable::default();
        table.set("INT".into(), TrapAction::Command("echo".into()));
        table.set("QUIT".into(), TrapAction::Ignore);
        table.reset_for_subshell();
        assert!(table.get("INT").is_none());
        assert!(matches!(table.get("QUIT"), Some(TrapAction::Ignore)));
    }
}
