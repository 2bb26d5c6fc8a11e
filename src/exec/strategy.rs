//! Command dispatch
//!
//! The ordered strategy chain resolving a command name, first match wins:
//! special builtin, function, builtin, alias, external. Also the function
//! call frame: scope push, positional parameters, and `return` absorption.

use std::path::PathBuf;

use crate::ast::types::{FunctionDefNode, RedirectNode};
use crate::builtins::{self, BuiltinFn};
use crate::exec::errors::{ControlFlow, ExecError};
use crate::exec::launcher;
use crate::exec::redirect::{self, FdGuard};
use crate::shell::Shell;

pub enum Resolved {
    SpecialBuiltin(BuiltinFn),
    Function(FunctionDefNode),
    Builtin(BuiltinFn),
    Alias(String),
    External(PathBuf),
    NotFound,
}

/// Resolve `name` through the strategy chain. `allow_alias` is cleared when
/// re-dispatching an already-substituted name.
pub fn resolve(shell: &Shell, name: &str, allow_alias: bool) -> Resolved {
    if let Some(f) = builtins::find_special(name) {
        return Resolved::SpecialBuiltin(f);
    }
    if let Some(func) = shell.functions.get(name) {
        return Resolved::Function(func.clone());
    }
    if let Some(f) = builtins::find_regular(name) {
        return Resolved::Builtin(f);
    }
    if allow_alias && !shell.expanding_aliases.contains(name) {
        if let Some(value) = shell.aliases.get(name) {
            return Resolved::Alias(value.to_string());
        }
    }
    match launcher::find_in_path(shell, name) {
        Some(path) => Resolved::External(path),
        None => Resolved::NotFound,
    }
}

/// Call a shell function: push a scope and positional frame, run the body,
/// catch `return`.
pub fn call_function(
    shell: &mut Shell,
    func: &FunctionDefNode,
    args: &[String],
    call_redirects: &[RedirectNode],
) -> Result<i32, ExecError> {
    shell.vars.push_scope();
    shell.vars.push_positional(args.to_vec());
    shell.function_depth += 1;
    let saved_loop_depth = shell.loop_depth;
    shell.loop_depth = 0;
    let _ = shell.vars.set_local("FUNCNAME", func.name.clone());

    let mut guard = FdGuard::new();
    let result = redirect::apply_redirects(shell, call_redirects, Some(&mut guard))
        .and_then(|_| redirect::apply_redirects(shell, &func.redirects, Some(&mut guard)))
        .and_then(|_| crate::exec::control_flow::exec_compound_body(shell, &func.body));
    drop(guard);

    shell.loop_depth = saved_loop_depth;
    shell.function_depth -= 1;
    shell.vars.pop_positional();
    shell.vars.pop_scope();

    match result {
        Err(ExecError::Flow(ControlFlow::Return(status))) => Ok(status),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_order() {
        let mut shell = Shell::new();
        // `set` is special even if a function of the same name exists
        shell.functions.insert(
            "set".into(),
            FunctionDefNode {
                name: "set".into(),
                body: Box::new(crate::ast::types::CompoundCommandNode::BraceGroup(
                    crate::ast::types::BraceGroupNode {
                        body: vec![],
                        redirects: vec![],
                        context: Default::default(),
                    },
                )),
                redirects: vec![],
                line: 1,
            },
        );
        assert!(matches!(
            resolve(&shell, "set", true),
            Resolved::SpecialBuiltin(_)
        ));
        // A function shadows a regular builtin
        shell.functions.insert(
            "cd".into(),
            shell.functions["set"].clone(),
        );
        assert!(matches!(resolve(&shell, "cd", true), Resolved::Function(_)));
    }

    #[test]
    fn test_alias_after_builtin_before_external() {
        let mut shell = Shell::new();
        shell.aliases.set("cd", "echo no");
        // `cd` is a builtin, so the alias never fires
        assert!(matches!(resolve(&shell, "cd", true), Resolved::Builtin(_)));
        shell.aliases.set("zz_custom", "echo hi");
        assert!(matches!(
            resolve(&shell, "zz_custom", true),
            Resolved::Alias(_)
        ));
    }

    #[test]
    fn test_expanding_guard_blocks_alias() {
        let mut shell = Shell::new();
        shell.aliases.set("zz_loop", "zz_loop again");
        shell.expanding_aliases.insert("zz_loop".into());
        assert!(matches!(
            resolve(&shell, "zz_loop", true),
            Resolved::NotFound
        ));
    }
}
