//! Control-flow builtins: `break`, `continue`, `return`, `exit`, `:`.

use crate::exec::ControlFlow;
use crate::shell::Shell;

pub fn colon(_args: &[String], _shell: &mut Shell) -> i32 {
    0
}

fn parse_level(args: &[String]) -> Option<u32> {
    match args.first() {
        None => Some(1),
        Some(text) => text.parse().ok(),
    }
}

pub fn break_builtin(args: &[String], shell: &mut Shell) -> i32 {
    if shell.loop_depth == 0 {
        shell.print_error(
            "break",
            "only meaningful in a `for', `while', or `until' loop",
        );
        return 0;
    }
    match parse_level(args) {
        Some(n) if n >= 1 => {
            shell.pending_flow = Some(ControlFlow::Break(n));
            0
        }
        _ => {
            shell.print_error("break", "numeric argument required");
            1
        }
    }
}

pub fn continue_builtin(args: &[String], shell: &mut Shell) -> i32 {
    if shell.loop_depth == 0 {
        shell.print_error(
            "continue",
            "only meaningful in a `for', `while', or `until' loop",
        );
        return 0;
    }
    match parse_level(args) {
        Some(n) if n >= 1 => {
            shell.pending_flow = Some(ControlFlow::Continue(n));
            0
        }
        _ => {
            shell.print_error("continue", "numeric argument required");
            1
        }
    }
}

pub fn return_builtin(args: &[String], shell: &mut Shell) -> i32 {
    if shell.function_depth == 0 && shell.source_depth == 0 {
        shell.print_error("return", "can only `return' from a function or sourced script");
        return 1;
    }
    let status = match args.first() {
        None => shell.vars.last_status,
        Some(text) => match text.parse::<i32>() {
            Ok(n) => n & 0xff,
            Err(_) => {
                shell.print_error("return", &format!("{text}: numeric argument required"));
                shell.pending_flow = Some(ControlFlow::Return(2));
                return 2;
            }
        },
    };
    shell.pending_flow = Some(ControlFlow::Return(status));
    status
}

pub fn exit_builtin(args: &[String], shell: &mut Shell) -> i32 {
    let status = match args.first() {
        None => shell.vars.last_status,
        Some(text) => match text.parse::<i32>() {
            Ok(n) => n & 0xff,
            Err(_) => {
                shell.print_error("exit", &format!("{text}: numeric argument required"));
                2
            }
        },
    };
    shell.pending_flow = Some(ControlFlow::Exit(status));
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_outside_loop_is_noop() {
        let mut shell = Shell::new();
        assert_eq!(break_builtin(&[], &mut shell), 0);
        assert!(shell.pending_flow.is_none());
    }

    #[test]
    fn test_break_levels() {
        let mut shell = Shell::new();
        shell.loop_depth = 2;
        assert_eq!(break_builtin(&["2".to_string()], &mut shell), 0);
        assert_eq!(shell.pending_flow, Some(ControlFlow::Break(2)));
    }

    #[test]
    fn test_return_outside_function_fails() {
        let mut shell = Shell::new();
        assert_eq!(return_builtin(&[], &mut shell), 1);
        assert!(shell.pending_flow.is_none());
    }

    #[test]
    fn test_return_default_is_last_status() {
        let mut shell = Shell::new();
        shell.function_depth = 1;
        shell.vars.last_status = 7;
        return_builtin(&[], &mut shell);
        assert_eq!(shell.pending_flow, Some(ControlFlow::Return(7)));
    }

    #[test]
    fn test_exit_wraps_status() {
        let mut shell = Shell::new();
        exit_builtin(&["256".to_string()], &mut shell);
        assert_eq!(shell.pending_flow, Some(ControlFlow::Exit(0)));
    }
}
