//! Builtin commands
//!
//! Builtins run inside the shell process through a uniform dispatch
//! interface: `fn(args, &mut Shell) -> i32`, where `args` excludes the
//! command name. The dispatcher sorts them into two buckets: POSIX special
//! builtins are found before functions and their failures can be fatal in
//! POSIX mode; regular builtins are found after functions.
//!
//! Control-flow builtins (`break`, `continue`, `return`, `exit`) cannot
//! return through the ordinary status path; they deposit a
//! [`crate::exec::ControlFlow`] in `shell.pending_flow`, which the
//! dispatcher converts into a non-local exit.

pub mod control;
pub mod misc;
pub mod special;

use std::collections::HashMap;

use crate::shell::Shell;

pub type BuiltinFn = fn(&[String], &mut Shell) -> i32;

lazy_static::lazy_static! {
    static ref SPECIAL_BUILTINS: HashMap<&'static str, BuiltinFn> = {
        let mut m: HashMap<&'static str, BuiltinFn> = HashMap::new();
        m.insert(":", control::colon as BuiltinFn);
        m.insert("break", control::break_builtin);
        m.insert("continue", control::continue_builtin);
        m.insert("return", control::return_builtin);
        m.insert("exit", control::exit_builtin);
        m.insert("eval", special::eval);
        m.insert("exec", special::exec);
        m.insert("export", special::export);
        m.insert("readonly", special::readonly);
        m.insert("set", special::set);
        m.insert("shift", special::shift);
        m.insert("trap", special::trap);
        m.insert("unset", special::unset);
        m.insert(".", special::source);
        m
    };

    static ref REGULAR_BUILTINS: HashMap<&'static str, BuiltinFn> = {
        let mut m: HashMap<&'static str, BuiltinFn> = HashMap::new();
        m.insert("source", special::source as BuiltinFn);
        m.insert("alias", misc::alias);
        m.insert("unalias", misc::unalias);
        m.insert("local", misc::local);
        m.insert("read", misc::read);
        m.insert("cd", misc::cd);
        m.insert("echo", misc::echo);
        m.insert("true", misc::true_builtin);
        m.insert("false", misc::false_builtin);
        m.insert("jobs", misc::jobs);
        m.insert("fg", misc::fg);
        m.insert("bg", misc::bg);
        m.insert("wait", misc::wait_builtin);
        m.insert("disown", misc::disown);
        m.insert("command", misc::command);
        m
    };
}

pub fn find_special(name: &str) -> Option<BuiltinFn> {
    SPECIAL_BUILTINS.get(name).copied()
}

pub fn find_regular(name: &str) -> Option<BuiltinFn> {
    REGULAR_BUILTINS.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets() {
        assert!(find_special("break").is_some());
        assert!(find_special("trap").is_some());
        assert!(find_special(".").is_some());
        assert!(find_special("cd").is_none());
        assert!(find_regular("cd").is_some());
        assert!(find_regular("alias").is_some());
        assert!(find_regular("break").is_none());
    }
}
