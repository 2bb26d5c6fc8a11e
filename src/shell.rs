//! The shell
//!
//! `Shell` owns the single mutable state every component receives
//! explicitly: the variable store, functions, aliases, options, job table
//! and trap table. It runs input units (a `-c` string, a script file, or
//! interactive lines), converts top-level control flow into exit statuses,
//! and drives the interactive read loop with PS1/PS2 prompting.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::os::fd::{FromRawFd, IntoRawFd};

use nix::sys::wait::waitpid;
use nix::unistd::{close, getpgrp, setpgid, Pid};

use crate::alias::AliasTable;
use crate::arith::{self, ArithError, ArithVars};
use crate::ast::types::FunctionDefNode;
use crate::exec::errors::{ControlFlow, ExecError};
use crate::exec::evaluator;
use crate::jobs::signals::{self, SignalManager};
use crate::jobs::{InteractiveSignals, JobManager, TrapAction, TrapTable};
use crate::parser::{ParseErrorCode, Parser};
use crate::state::ShellOptions;
use crate::vars::VarStore;

pub struct Shell {
    pub vars: VarStore,
    pub functions: HashMap<String, FunctionDefNode>,
    pub aliases: AliasTable,
    pub options: ShellOptions,
    pub jobs: JobManager,
    pub traps: TrapTable,
    pub interactive: bool,
    pub is_subshell: bool,
    /// Set inside forked pipeline/subshell children; disables job control
    /// and terminal handling in the child.
    pub in_forked_child: bool,
    /// Builtin output is discarded in capture modes.
    pub suppress_output: bool,
    pub loop_depth: u32,
    pub function_depth: u32,
    pub source_depth: u32,
    /// True while running the condition of `if`/`while`/`until` (errexit
    /// does not apply there).
    pub in_condition: bool,
    /// Deposited by control-flow builtins; the dispatcher converts it into
    /// a non-local exit.
    pub pending_flow: Option<ControlFlow>,
    /// `$?` of the most recent command substitution.
    pub last_cmdsub_status: i32,
    /// Open process substitutions awaiting cleanup: (fd, child pid).
    pub procsubs: Vec<(i32, Pid)>,
    /// Alias names currently being substituted (cycle breaker).
    pub expanding_aliases: HashSet<String>,
    pub current_line: usize,
    /// Witness that interactive signal handlers are installed; required for
    /// any terminal transfer.
    pub interactive_signals: Option<InteractiveSignals>,
    /// Re-entrancy guard for trap handlers.
    pub in_trap: bool,
    /// Set by a pipeline stage whose whole job is one simple command; lets
    /// an external command exec in place instead of forking again.
    pub exec_final: bool,
    /// Interactive command history, appended to `$HISTFILE` on exit.
    history: Vec<String>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    pub fn new() -> Self {
        let mut vars = VarStore::new();
        vars.import_environment();
        if vars.get_var("IFS").is_none() {
            let _ = vars.set_scalar("IFS", " \t\n");
        }
        if vars.get_var("PS1").is_none() {
            let _ = vars.set_scalar("PS1", "psh$ ");
        }
        if vars.get_var("PS2").is_none() {
            let _ = vars.set_scalar("PS2", "> ");
        }
        if vars.get_var("PS4").is_none() {
            let _ = vars.set_scalar("PS4", "+ ");
        }
        if let Ok(pwd) = std::env::current_dir() {
            let _ = vars.set_scalar("PWD", pwd.to_string_lossy().into_owned());
        }

        Self {
            vars,
            functions: HashMap::new(),
            aliases: AliasTable::default(),
            options: ShellOptions::default(),
            jobs: JobManager::new(),
            traps: TrapTable::default(),
            interactive: false,
            is_subshell: false,
            in_forked_child: false,
            suppress_output: false,
            loop_depth: 0,
            function_depth: 0,
            source_depth: 0,
            in_condition: false,
            pending_flow: None,
            last_cmdsub_status: 0,
            procsubs: Vec::new(),
            expanding_aliases: HashSet::new(),
            current_line: 0,
            interactive_signals: None,
            in_trap: false,
            exec_final: false,
            history: Vec::new(),
        }
    }

    // =========================================================================
    // RUNNING INPUT
    // =========================================================================

    /// Parse and evaluate one input unit. Lex/parse errors abort the unit
    /// with status 2; control flow propagates to the caller.
    pub fn run_source(&mut self, input: &str) -> Result<i32, ExecError> {
        if self.options.verbose {
            self.write_stderr(input);
            if !input.ends_with('\n') {
                self.write_stderr("\n");
            }
        }
        let mut parser = Parser::new();
        match parser.parse(input) {
            Err(e) => {
                self.print_error_plain(&e.to_string());
                self.vars.last_status = 2;
                Ok(2)
            }
            Ok(program) => {
                if self.options.debug_ast {
                    eprintln!("psh: ast: {program:#?}");
                }
                if self.options.debug_tokens {
                    if let Ok(tokens) = crate::parser::Lexer::new(input).tokenize() {
                        eprintln!("psh: tokens: {tokens:?}");
                    }
                }
                evaluator::run_program(self, &program)
            }
        }
    }

    /// Like [`Shell::run_source`], flattening control flow into a plain
    /// status. Used by subshell children, `eval` contexts and trap bodies.
    pub fn run_string(&mut self, input: &str) -> i32 {
        match self.run_source(input) {
            Ok(status) => status,
            Err(ExecError::Flow(ControlFlow::Exit(status)))
            | Err(ExecError::Flow(ControlFlow::Return(status))) => status,
            Err(ExecError::Flow(_)) => 0,
            Err(ExecError::Fatal { status, message }) => {
                self.print_error_plain(&message);
                status
            }
            Err(e) => {
                self.report_error(&e);
                1
            }
        }
    }

    /// Run a whole script file.
    pub fn run_script_file(&mut self, path: &str) -> i32 {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                self.print_error(path, &e.to_string());
                return 127;
            }
        };
        self.vars.script_name = path.to_string();
        let status = self.run_string(&text);
        self.run_exit_trap();
        status
    }

    /// Execute a `-c` command string.
    pub fn run_command_string(&mut self, command: &str) -> i32 {
        let status = self.run_string(command);
        self.run_exit_trap();
        status
    }

    // =========================================================================
    // INTERACTIVE LOOP
    // =========================================================================

    /// The interactive read loop. Installs the interactive signal handlers
    /// first and only then takes terminal control; the witness value makes
    /// the reverse order impossible.
    pub fn run_interactive(&mut self) -> i32 {
        self.interactive = true;
        self.options.monitor = true;
        self.sync_option_flags();

        let witness = SignalManager::install_interactive_handlers();
        let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
        self.jobs.shell_pgid = getpgrp();
        self.jobs.take_terminal(&witness, self.jobs.shell_pgid);
        self.interactive_signals = Some(witness);

        let mut status = 0;
        'repl: loop {
            if signals::take_sigchld_flag() {
                self.jobs.update();
                self.notify_done_jobs();
            }
            self.drain_traps();

            let ps1 = self.vars.get("PS1").unwrap_or_else(|| "$ ".to_string());
            self.write_stderr(&ps1);

            let mut buffer = String::new();
            loop {
                match self.read_line_stdin() {
                    None => {
                        if buffer.is_empty() {
                            if self.options.ignoreeof {
                                self.write_stderr("\npsh: use `exit' to leave the shell\n");
                                continue 'repl;
                            }
                            break 'repl;
                        }
                        break;
                    }
                    Some(line) => {
                        if signals::take_sigint_flag() {
                            // SIGINT cancels the current input line
                            buffer.clear();
                            status = 130;
                            self.vars.last_status = status;
                            continue 'repl;
                        }
                        buffer.push_str(&line);
                        buffer.push('\n');
                        if !needs_continuation(&buffer) {
                            break;
                        }
                        let ps2 = self.vars.get("PS2").unwrap_or_else(|| "> ".to_string());
                        self.write_stderr(&ps2);
                    }
                }
            }

            if buffer.trim().is_empty() {
                continue;
            }
            self.history.push(buffer.trim_end().to_string());

            match self.run_source(&buffer) {
                Ok(s) => status = s,
                Err(ExecError::Flow(ControlFlow::Exit(s))) => {
                    status = s;
                    break;
                }
                Err(ExecError::Flow(_)) => {}
                Err(ExecError::Fatal { status: s, message }) => {
                    self.print_error_plain(&message);
                    status = s;
                }
                Err(e) => {
                    self.report_error(&e);
                    status = 1;
                }
            }
        }

        self.save_history();
        self.run_exit_trap();
        status
    }

    /// Source the rc file (or an alternative) for interactive startup.
    pub fn source_rc_file(&mut self, rcfile: Option<&str>) {
        let path = match rcfile {
            Some(path) => path.to_string(),
            None => match self.vars.get("HOME") {
                Some(home) => format!("{home}/.pshrc"),
                None => return,
            },
        };
        if std::path::Path::new(&path).exists() {
            let _ = crate::builtins::special::source(&[path], self);
        }
    }

    /// Login shells additionally source the profile files.
    pub fn source_login_profiles(&mut self) {
        for path in ["/etc/profile".to_string()]
            .into_iter()
            .chain(self.vars.get("HOME").map(|h| format!("{h}/.profile")))
        {
            if std::path::Path::new(&path).exists() {
                let _ = crate::builtins::special::source(&[path], self);
            }
        }
    }

    fn save_history(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let path = self
            .vars
            .get("HISTFILE")
            .or_else(|| self.vars.get("HOME").map(|h| format!("{h}/.psh_history")));
        let Some(path) = path else { return };
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            for line in &self.history {
                let _ = writeln!(file, "{line}");
            }
        }
    }

    // =========================================================================
    // STATE TRANSITIONS
    // =========================================================================

    /// Called in a freshly forked child that keeps running shell code:
    /// traps reset, job control detaches, interactivity ends. Variable state
    /// is already a copy courtesy of `fork`.
    pub fn enter_subshell(&mut self) {
        self.is_subshell = true;
        self.interactive = false;
        self.interactive_signals = None;
        self.traps.reset_for_subshell();
        self.jobs = JobManager::new();
        self.history.clear();
        self.pending_flow = None;
        self.exec_final = false;
    }

    /// Terminate this process, firing the EXIT trap first.
    pub fn exit_process(&mut self, status: i32) -> ! {
        self.run_exit_trap();
        std::process::exit(status)
    }

    pub fn run_exit_trap(&mut self) {
        if self.in_trap {
            return;
        }
        let command = match self.traps.get("EXIT") {
            Some(TrapAction::Command(command)) => command.clone(),
            _ => return,
        };
        self.traps.remove("EXIT");
        self.in_trap = true;
        let _ = self.run_string(&command);
        self.in_trap = false;
    }

    /// Run queued signal traps at a safe point (between simple commands).
    pub fn drain_traps(&mut self) {
        if self.in_trap {
            return;
        }
        for signo in signals::take_pending_signals() {
            let Some(command) = self.traps.command_for_signo(signo).map(str::to_string)
            else {
                continue;
            };
            self.in_trap = true;
            let saved = self.vars.last_status;
            let _ = self.run_string(&command);
            self.vars.last_status = saved;
            self.in_trap = false;
        }
    }

    pub fn cleanup_procsubs(&mut self) {
        for (fd, pid) in std::mem::take(&mut self.procsubs) {
            let _ = close(fd);
            let _ = waitpid(pid, None);
        }
    }

    pub fn notify_done_jobs(&mut self) {
        let done = self.jobs.remove_done();
        if self.interactive {
            for (number, job) in done {
                self.write_stderr(&format!("[{number}]+  Done     {}\n", job.text));
            }
        }
    }

    pub fn job_control_active(&self) -> bool {
        self.options.monitor && self.interactive && !self.in_forked_child
    }

    /// Keep `$-` in sync after option changes.
    pub fn sync_option_flags(&mut self) {
        self.vars.option_flags = self.options.flag_string(self.interactive);
    }

    // =========================================================================
    // SMALL SERVICES
    // =========================================================================

    pub fn ifs(&self) -> String {
        self.vars.get("IFS").unwrap_or_else(|| " \t\n".to_string())
    }

    pub fn arith(&mut self, expr: &str) -> Result<i64, ArithError> {
        arith::eval_arith(expr, self)
    }

    fn write_fd(fd: i32, text: &str) {
        let mut file = unsafe { File::from_raw_fd(fd) };
        let _ = file.write_all(text.as_bytes());
        // Hand the descriptor back without closing it
        let _ = file.into_raw_fd();
    }

    pub fn write_stdout(&mut self, text: &str) {
        if self.suppress_output {
            return;
        }
        Self::write_fd(1, text);
    }

    pub fn write_stderr(&mut self, text: &str) {
        Self::write_fd(2, text);
    }

    /// `psh: context: message` on stderr.
    pub fn print_error(&mut self, context: &str, message: &str) {
        self.write_stderr(&format!("psh: {context}: {message}\n"));
    }

    pub fn print_error_plain(&mut self, message: &str) {
        self.write_stderr(&format!("psh: {message}\n"));
    }

    pub fn report_error(&mut self, error: &ExecError) {
        match error {
            ExecError::Redirect { context, message } => {
                let (context, message) = (context.clone(), message.clone());
                self.print_error(&context, &message);
            }
            other => {
                let text = other.to_string();
                self.print_error_plain(&text);
            }
        }
    }

    /// Byte-wise line read from fd 0, so consumed input never outruns the
    /// command (`read` and `select` share stdin with child processes).
    pub fn read_line_stdin(&mut self) -> Option<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match nix::unistd::read(0, &mut byte) {
                Ok(0) => {
                    if line.is_empty() {
                        return None;
                    }
                    break;
                }
                Ok(_) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    line.push(byte[0]);
                }
                Err(nix::errno::Errno::EINTR) => {
                    if signals::take_sigint_flag() {
                        return Some(String::new());
                    }
                }
                Err(_) => return None,
            }
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Variable access for the arithmetic evaluator.
impl ArithVars for Shell {
    fn get(&mut self, name: &str) -> Option<String> {
        self.vars.get(name)
    }

    fn set(&mut self, name: &str, value: String) -> Result<(), ArithError> {
        self.vars
            .set_scalar(name, value)
            .map_err(|_| ArithError::Readonly(name.to_string()))
    }

    fn nounset(&self) -> bool {
        self.options.nounset
    }
}

/// Heuristic for PS2 continuation: the buffer parses up to an unexpected
/// EOF (unclosed quote, pending heredoc, or open construct).
fn needs_continuation(buffer: &str) -> bool {
    let mut parser = Parser::new();
    match parser.parse(buffer) {
        Ok(_) => false,
        Err(e) => matches!(
            e.code,
            ParseErrorCode::UnexpectedEof
                | ParseErrorCode::MissingFi
                | ParseErrorCode::MissingDone
                | ParseErrorCode::MissingEsac
        ) || e.message.contains("EOF")
            || e.message.contains("end-of-file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_string_status() {
        let mut shell = Shell::new();
        assert_eq!(shell.run_string("true"), 0);
        assert_eq!(shell.run_string("false"), 1);
        assert_eq!(shell.vars.last_status, 1);
    }

    #[test]
    fn test_parse_error_status_two() {
        let mut shell = Shell::new();
        assert_eq!(shell.run_string("fi"), 2);
    }

    #[test]
    fn test_exit_flow_flattened() {
        let mut shell = Shell::new();
        assert_eq!(shell.run_string("exit 7"), 7);
    }

    #[test]
    fn test_needs_continuation() {
        assert!(needs_continuation("if true; then\n"));
        assert!(needs_continuation("echo 'open\n"));
        assert!(needs_continuation("while read x; do\n"));
        assert!(!needs_continuation("echo done\n"));
    }

    #[test]
    fn test_arith_through_shell_vars() {
        let mut shell = Shell::new();
        shell.vars.set_scalar("n", "6").unwrap();
        assert_eq!(shell.arith("n * 7").unwrap(), 42);
        shell.arith("m = 9").unwrap();
        assert_eq!(shell.vars.get("m").as_deref(), Some("9"));
    }
}
