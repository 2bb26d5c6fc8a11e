//! POSIX special builtins: `eval`, `exec`, `export`, `readonly`, `set`,
//! `shift`, `trap`, `unset`, and `.`/`source`.
//!
//! In POSIX mode an error in one of these is fatal to the shell; the
//! offending builtin deposits an `Exit` flow rather than returning a plain
//! status.

use crate::exec::{launcher, ControlFlow, ExecError};
use crate::jobs::signals::{self, canonical_trap_name, signal_for_trap, SignalManager};
use crate::jobs::TrapAction;
use crate::parser::lexer::is_valid_name;
use crate::shell::Shell;
use crate::vars::VarAttrs;

fn posix_fatal(shell: &mut Shell, status: i32) -> i32 {
    if shell.options.posix {
        shell.pending_flow = Some(ControlFlow::Exit(status));
    }
    status
}

pub fn eval(args: &[String], shell: &mut Shell) -> i32 {
    let source = args.join(" ");
    if source.trim().is_empty() {
        return 0;
    }
    match shell.run_source(&source) {
        Ok(status) => status,
        Err(ExecError::Flow(flow)) => {
            let status = match flow {
                ControlFlow::Exit(n) | ControlFlow::Return(n) => n,
                _ => 0,
            };
            shell.pending_flow = Some(flow);
            status
        }
        Err(ExecError::Fatal { status, message }) => {
            shell.print_error_plain(&message);
            shell.pending_flow = Some(ControlFlow::Exit(status));
            status
        }
        Err(e) => {
            shell.print_error_plain(&e.to_string());
            1
        }
    }
}

/// `exec [command ...]`: with arguments, replace the shell process; with
/// only redirections (applied permanently by the dispatcher), succeed.
pub fn exec(args: &[String], shell: &mut Shell) -> i32 {
    let Some(name) = args.first() else { return 0 };
    match launcher::find_in_path(shell, name) {
        Some(path) => {
            let env = shell.vars.environment();
            launcher::exec_in_place(shell, &path, args, &env)
        }
        None => {
            shell.print_error(name, "command not found");
            if shell.interactive {
                127
            } else {
                shell.pending_flow = Some(ControlFlow::Exit(127));
                127
            }
        }
    }
}

pub fn export(args: &[String], shell: &mut Shell) -> i32 {
    if args.is_empty() || args[0] == "-p" {
        let mut lines: Vec<String> = shell
            .vars
            .environment()
            .into_iter()
            .map(|(name, value)| format!("export {name}={value}"))
            .collect();
        lines.sort();
        for line in lines {
            shell.write_stdout(&format!("{line}\n"));
        }
        return 0;
    }

    let mut status = 0;
    let mut remove = false;
    for arg in args {
        if arg == "-n" {
            remove = true;
            continue;
        }
        let (name, value) = match arg.split_once('=') {
            Some((n, v)) => (n.to_string(), Some(v.to_string())),
            None => (arg.clone(), None),
        };
        if !is_valid_name(&name) {
            shell.print_error("export", &format!("`{arg}': not a valid identifier"));
            status = 1;
            continue;
        }
        if let Some(value) = value {
            if let Err(e) = shell.vars.set_scalar(&name, value) {
                shell.print_error("export", &e.to_string());
                status = 1;
                continue;
            }
        }
        if remove {
            shell.vars.remove_attrs(&name, VarAttrs::EXPORTED);
        } else if let Err(e) = shell.vars.add_attrs(&name, VarAttrs::EXPORTED) {
            shell.print_error("export", &e.to_string());
            status = 1;
        }
    }
    if status != 0 {
        return posix_fatal(shell, status);
    }
    status
}

pub fn readonly(args: &[String], shell: &mut Shell) -> i32 {
    if args.is_empty() || args[0] == "-p" {
        for name in shell.vars.names_with_prefix("") {
            if shell.vars.is_readonly(&name) {
                let value = shell.vars.get(&name).unwrap_or_default();
                shell.write_stdout(&format!("readonly {name}={value}\n"));
            }
        }
        return 0;
    }

    let mut status = 0;
    for arg in args {
        let (name, value) = match arg.split_once('=') {
            Some((n, v)) => (n.to_string(), Some(v.to_string())),
            None => (arg.clone(), None),
        };
        if !is_valid_name(&name) {
            shell.print_error("readonly", &format!("`{arg}': not a valid identifier"));
            status = 1;
            continue;
        }
        if let Some(value) = value {
            if let Err(e) = shell.vars.set_scalar(&name, value) {
                shell.print_error("readonly", &e.to_string());
                status = 1;
                continue;
            }
        }
        let _ = shell.vars.add_attrs(&name, VarAttrs::READONLY);
    }
    if status != 0 {
        return posix_fatal(shell, status);
    }
    status
}

pub fn unset(args: &[String], shell: &mut Shell) -> i32 {
    let mut status = 0;
    let mut unset_functions = false;
    for arg in args {
        match arg.as_str() {
            "-f" => {
                unset_functions = true;
                continue;
            }
            "-v" => {
                unset_functions = false;
                continue;
            }
            _ => {}
        }
        if unset_functions {
            shell.functions.remove(arg);
            continue;
        }
        if let Err(e) = shell.vars.unset(arg) {
            shell.print_error("unset", &e.to_string());
            status = 1;
        }
    }
    if status != 0 {
        return posix_fatal(shell, status);
    }
    status
}

pub fn set(args: &[String], shell: &mut Shell) -> i32 {
    if args.is_empty() {
        for name in shell.vars.names_with_prefix("") {
            let value = shell.vars.get(&name).unwrap_or_default();
            shell.write_stdout(&format!("{name}={value}\n"));
        }
        return 0;
    }

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--" => {
                let rest: Vec<String> = args[i + 1..].to_vec();
                shell.vars.set_positional(rest);
                i = args.len();
            }
            "-o" | "+o" => {
                let enable = arg.starts_with('-');
                match args.get(i + 1) {
                    None => {
                        for (name, on) in shell.options.listing() {
                            shell.write_stdout(&format!(
                                "{name:<15} {}\n",
                                if on { "on" } else { "off" }
                            ));
                        }
                        i += 1;
                    }
                    Some(name) => {
                        if !shell.options.set_by_name(name, enable) {
                            shell.print_error("set", &format!("{name}: invalid option name"));
                            return 2;
                        }
                        i += 2;
                    }
                }
            }
            _ if arg.starts_with('-') || arg.starts_with('+') => {
                let enable = arg.starts_with('-');
                for letter in arg.chars().skip(1) {
                    if !shell.options.set_by_letter(letter, enable) {
                        shell.print_error("set", &format!("-{letter}: invalid option"));
                        return 2;
                    }
                }
                i += 1;
            }
            _ => {
                // Remaining words become the positional parameters
                let rest: Vec<String> = args[i..].to_vec();
                shell.vars.set_positional(rest);
                i = args.len();
            }
        }
    }

    shell.sync_option_flags();
    0
}

pub fn shift(args: &[String], shell: &mut Shell) -> i32 {
    let n = match args.first() {
        None => 1,
        Some(text) => match text.parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                shell.print_error("shift", &format!("{text}: numeric argument required"));
                return posix_fatal(shell, 1);
            }
        },
    };
    if shell.vars.shift_positional(n) {
        0
    } else {
        shell.print_error("shift", "shift count out of range");
        posix_fatal(shell, 1)
    }
}

pub fn trap(args: &[String], shell: &mut Shell) -> i32 {
    if args.is_empty() || args[0] == "-p" {
        let mut out = String::new();
        for (name, action) in shell.traps.iter() {
            match action {
                TrapAction::Command(command) => {
                    out.push_str(&format!("trap -- '{command}' {name}\n"));
                }
                TrapAction::Ignore => out.push_str(&format!("trap -- '' {name}\n")),
                TrapAction::Default => {}
            }
        }
        shell.write_stdout(&out);
        return 0;
    }

    // `trap - SIGS` and `trap N [SIGS...]` (a leading signal number) reset
    let numeric_reset =
        args[0].parse::<i32>().is_ok() && canonical_trap_name(&args[0]).is_some();
    let (action_arg, signal_specs) = if args[0] == "-" || numeric_reset {
        (None, if args[0] == "-" { &args[1..] } else { &args[..] })
    } else {
        (Some(args[0].clone()), &args[1..])
    };

    if signal_specs.is_empty() {
        shell.print_error("trap", "usage: trap [-p] [action signal ...]");
        return 2;
    }

    let mut status = 0;
    for spec in signal_specs {
        let Some(name) = canonical_trap_name(spec) else {
            shell.print_error("trap", &format!("{spec}: invalid signal specification"));
            status = 1;
            continue;
        };
        match &action_arg {
            None => {
                shell.traps.remove(&name);
                if let Some(signal) = signal_for_trap(&name) {
                    SignalManager::set_default(signal);
                }
            }
            Some(action) if action.is_empty() => {
                shell.traps.set(name.clone(), TrapAction::Ignore);
                if let Some(signal) = signal_for_trap(&name) {
                    SignalManager::set_ignored(signal);
                }
            }
            Some(action) => {
                shell
                    .traps
                    .set(name.clone(), TrapAction::Command(action.clone()));
                if let Some(signal) = signal_for_trap(&name) {
                    SignalManager::install_trap_handler(signal);
                }
            }
        }
    }
    if status != 0 {
        return posix_fatal(shell, status);
    }
    status
}

/// `. file [args...]` / `source file [args...]`: run the file in the
/// current shell.
pub fn source(args: &[String], shell: &mut Shell) -> i32 {
    let Some(path_arg) = args.first() else {
        shell.print_error(".", "filename argument required");
        return posix_fatal(shell, 2);
    };

    let path = if path_arg.contains('/') {
        std::path::PathBuf::from(path_arg)
    } else {
        // PATH search first, falling back to the current directory
        launcher::find_in_path(shell, path_arg)
            .unwrap_or_else(|| std::path::PathBuf::from(path_arg))
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            shell.print_error(path_arg, &e.to_string());
            return posix_fatal(shell, 1);
        }
    };

    let pushed = if args.len() > 1 {
        shell.vars.push_positional(args[1..].to_vec());
        true
    } else {
        false
    };
    shell.source_depth += 1;

    let status = match shell.run_source(&text) {
        Ok(status) => status,
        Err(ExecError::Flow(ControlFlow::Return(status))) => status,
        Err(ExecError::Flow(flow)) => {
            shell.pending_flow = Some(flow);
            shell.vars.last_status
        }
        Err(e) => {
            shell.print_error_plain(&e.to_string());
            1
        }
    };

    shell.source_depth -= 1;
    if pushed {
        shell.vars.pop_positional();
    }
    let _ = signals::take_sigint_flag();
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_letters_and_flags() {
        let mut shell = Shell::new();
        assert_eq!(set(&["-eu".to_string()], &mut shell), 0);
        assert!(shell.options.errexit);
        assert!(shell.options.nounset);
        assert!(shell.vars.option_flags.contains('e'));
        assert_eq!(set(&["+e".to_string()], &mut shell), 0);
        assert!(!shell.options.errexit);
    }

    #[test]
    fn test_set_positional() {
        let mut shell = Shell::new();
        set(
            &["--".to_string(), "a".to_string(), "b".to_string()],
            &mut shell,
        );
        assert_eq!(shell.vars.positional(), &["a", "b"]);
    }

    #[test]
    fn test_set_o_name() {
        let mut shell = Shell::new();
        assert_eq!(
            set(&["-o".to_string(), "pipefail".to_string()], &mut shell),
            0
        );
        assert!(shell.options.pipefail);
        assert_eq!(set(&["-o".to_string(), "nope".to_string()], &mut shell), 2);
    }

    #[test]
    fn test_shift_out_of_range() {
        let mut shell = Shell::new();
        shell.vars.set_positional(vec!["a".to_string()]);
        assert_eq!(shift(&[], &mut shell), 0);
        assert_eq!(shift(&["5".to_string()], &mut shell), 1);
    }

    #[test]
    fn test_export_marks_variable() {
        let mut shell = Shell::new();
        export(&["FOO=bar".to_string()], &mut shell);
        assert!(shell
            .vars
            .environment()
            .iter()
            .any(|(n, v)| n == "FOO" && v == "bar"));
    }

    #[test]
    fn test_readonly_then_assign_fails() {
        let mut shell = Shell::new();
        readonly(&["RO=1".to_string()], &mut shell);
        assert!(shell.vars.set_scalar("RO", "2").is_err());
    }

    #[test]
    fn test_trap_set_and_list() {
        let mut shell = Shell::new();
        assert_eq!(
            trap(&["echo hi".to_string(), "INT".to_string()], &mut shell),
            0
        );
        assert!(matches!(
            shell.traps.get("INT"),
            Some(TrapAction::Command(c)) if c == "echo hi"
        ));
        trap(&["-".to_string(), "INT".to_string()], &mut shell);
        assert!(shell.traps.get("INT").is_none());
    }

    #[test]
    fn test_trap_exit_pseudo_signal() {
        let mut shell = Shell::new();
        trap(&["echo bye".to_string(), "EXIT".to_string()], &mut shell);
        assert!(shell.traps.get("EXIT").is_some());
        trap(&["echo x".to_string(), "0".to_string()], &mut shell);
        assert!(matches!(
            shell.traps.get("EXIT"),
            Some(TrapAction::Command(c)) if c == "echo x"
        ));
    }
}
