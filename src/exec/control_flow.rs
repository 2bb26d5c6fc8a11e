//! Control structure execution
//!
//! if/while/until/for/case/select, arithmetic commands, `[[ ]]`, subshells
//! and brace groups. `break`/`continue` arrive as typed non-local exits
//! carrying a level count; every loop frame decrements the level and stops
//! the unwind when it reaches zero.

use nix::unistd::{fork, ForkResult};

use crate::ast::types::{
    ArithEvalNode, BraceGroupNode, CaseNode, CaseTerminator, CompoundCommandNode, ForArithNode,
    ForEachNode, IfNode, SelectNode, StatementNode, SubshellNode, TestExprNode, TestNode,
    UntilNode, WhileNode,
};
use crate::exec::errors::{ControlFlow, ExecError};
use crate::exec::evaluator::exec_statements;
use crate::exec::redirect::{self, FdGuard};
use crate::expansion::{self, command_subst, pattern};
use crate::jobs::signals;
use crate::shell::Shell;

/// Dispatch a compound command in the current process.
pub fn exec_compound_body(
    shell: &mut Shell,
    node: &CompoundCommandNode,
) -> Result<i32, ExecError> {
    match node {
        CompoundCommandNode::Subshell(n) => exec_subshell(shell, n),
        CompoundCommandNode::BraceGroup(n) => exec_brace_group(shell, n),
        CompoundCommandNode::If(n) => exec_if(shell, n),
        CompoundCommandNode::While(n) => exec_while(shell, n),
        CompoundCommandNode::Until(n) => exec_until(shell, n),
        CompoundCommandNode::ForEach(n) => exec_for_each(shell, n),
        CompoundCommandNode::ForArith(n) => exec_for_arith(shell, n),
        CompoundCommandNode::Case(n) => exec_case(shell, n),
        CompoundCommandNode::Select(n) => exec_select(shell, n),
        CompoundCommandNode::ArithEval(n) => exec_arith_eval(shell, n),
        CompoundCommandNode::Test(n) => exec_test(shell, n),
    }
}

/// Run condition statements with errexit suspended.
fn eval_condition(shell: &mut Shell, statements: &[StatementNode]) -> Result<i32, ExecError> {
    let saved = shell.in_condition;
    shell.in_condition = true;
    let result = exec_statements(shell, statements);
    shell.in_condition = saved;
    result
}

// =============================================================================
// CONDITIONALS
// =============================================================================

pub fn exec_if(shell: &mut Shell, node: &IfNode) -> Result<i32, ExecError> {
    let mut guard = FdGuard::new();
    redirect::apply_redirects(shell, &node.redirects, Some(&mut guard))?;

    for clause in &node.clauses {
        if eval_condition(shell, &clause.condition)? == 0 {
            return exec_statements(shell, &clause.body);
        }
    }
    if let Some(else_body) = &node.else_body {
        return exec_statements(shell, else_body);
    }
    Ok(0)
}

// =============================================================================
// LOOPS
// =============================================================================

/// What a loop body iteration asked for.
enum LoopSignal {
    Normal(i32),
    Break,
    Continue,
    Propagate(ExecError),
}

fn run_loop_body(shell: &mut Shell, body: &[StatementNode]) -> LoopSignal {
    match exec_statements(shell, body) {
        Ok(status) => LoopSignal::Normal(status),
        Err(ExecError::Flow(ControlFlow::Break(n))) => {
            if n <= 1 {
                LoopSignal::Break
            } else {
                LoopSignal::Propagate(ExecError::Flow(ControlFlow::Break(n - 1)))
            }
        }
        Err(ExecError::Flow(ControlFlow::Continue(n))) => {
            if n <= 1 {
                LoopSignal::Continue
            } else {
                LoopSignal::Propagate(ExecError::Flow(ControlFlow::Continue(n - 1)))
            }
        }
        Err(e) => LoopSignal::Propagate(e),
    }
}

pub fn exec_while(shell: &mut Shell, node: &WhileNode) -> Result<i32, ExecError> {
    exec_while_until(shell, &node.condition, &node.body, &node.redirects, false)
}

pub fn exec_until(shell: &mut Shell, node: &UntilNode) -> Result<i32, ExecError> {
    exec_while_until(shell, &node.condition, &node.body, &node.redirects, true)
}

fn exec_while_until(
    shell: &mut Shell,
    condition: &[StatementNode],
    body: &[StatementNode],
    redirects: &[crate::ast::types::RedirectNode],
    until: bool,
) -> Result<i32, ExecError> {
    let mut guard = FdGuard::new();
    redirect::apply_redirects(shell, redirects, Some(&mut guard))?;

    shell.loop_depth += 1;
    let mut status = 0;
    let result = loop {
        let cond = match eval_condition(shell, condition) {
            Ok(c) => c,
            Err(e) => break Err(e),
        };
        let run_body = if until { cond != 0 } else { cond == 0 };
        if !run_body {
            break Ok(status);
        }
        match run_loop_body(shell, body) {
            LoopSignal::Normal(s) => status = s,
            LoopSignal::Break => break Ok(status),
            LoopSignal::Continue => continue,
            LoopSignal::Propagate(e) => break Err(e),
        }
    };
    shell.loop_depth -= 1;
    result
}

pub fn exec_for_each(shell: &mut Shell, node: &ForEachNode) -> Result<i32, ExecError> {
    let mut guard = FdGuard::new();
    redirect::apply_redirects(shell, &node.redirects, Some(&mut guard))?;

    let items: Vec<String> = match &node.words {
        Some(words) => {
            let mut fields = Vec::new();
            for word in words {
                fields.extend(expansion::expand_word(
                    shell, &word.text, word.kind, word.quote,
                )?);
            }
            fields
        }
        None => shell.vars.positional().to_vec(),
    };

    shell.loop_depth += 1;
    let mut status = 0;
    let mut result = None;
    for item in items {
        if let Err(e) = shell.vars.set_scalar(&node.variable, item) {
            shell.print_error(&node.variable, &e.to_string());
            result = Some(Ok(1));
            break;
        }
        match run_loop_body(shell, &node.body) {
            LoopSignal::Normal(s) => status = s,
            LoopSignal::Break => break,
            LoopSignal::Continue => continue,
            LoopSignal::Propagate(e) => {
                result = Some(Err(e));
                break;
            }
        }
    }
    shell.loop_depth -= 1;
    result.unwrap_or(Ok(status))
}

pub fn exec_for_arith(shell: &mut Shell, node: &ForArithNode) -> Result<i32, ExecError> {
    let mut guard = FdGuard::new();
    redirect::apply_redirects(shell, &node.redirects, Some(&mut guard))?;

    macro_rules! arith {
        ($expr:expr) => {
            match shell.arith($expr) {
                Ok(v) => v,
                Err(e) => {
                    shell.print_error("((", &e.to_string());
                    shell.loop_depth -= 1;
                    return Ok(1);
                }
            }
        };
    }

    shell.loop_depth += 1;
    if !node.init.is_empty() {
        arith!(&node.init);
    }
    let mut status = 0;
    let result = loop {
        // An empty condition is true
        if !node.condition.is_empty() && arith!(&node.condition) == 0 {
            break Ok(status);
        }
        match run_loop_body(shell, &node.body) {
            LoopSignal::Normal(s) => status = s,
            LoopSignal::Break => break Ok(status),
            LoopSignal::Continue => {}
            LoopSignal::Propagate(e) => break Err(e),
        }
        if !node.update.is_empty() {
            arith!(&node.update);
        }
    };
    shell.loop_depth -= 1;
    result
}

// =============================================================================
// CASE AND SELECT
// =============================================================================

pub fn exec_case(shell: &mut Shell, node: &CaseNode) -> Result<i32, ExecError> {
    let mut guard = FdGuard::new();
    redirect::apply_redirects(shell, &node.redirects, Some(&mut guard))?;

    let subject = expansion::expand_to_string(
        shell,
        &node.word.text,
        node.word.kind,
        node.word.quote,
    )?;

    let mut status = 0;
    let mut fall_through = false;
    let mut i = 0;
    while i < node.items.len() {
        let item = &node.items[i];
        let matched = fall_through
            || item_matches(shell, item, &subject)?;
        if matched {
            status = exec_statements(shell, &item.body)?;
            match item.terminator {
                CaseTerminator::Break => return Ok(status),
                CaseTerminator::FallThrough => {
                    fall_through = true;
                }
                CaseTerminator::Continue => {
                    fall_through = false;
                }
            }
        }
        i += 1;
    }
    Ok(status)
}

fn item_matches(
    shell: &mut Shell,
    item: &crate::ast::types::CaseItemNode,
    subject: &str,
) -> Result<bool, ExecError> {
    for pattern_word in &item.patterns {
        let pat = expansion::expand_to_pattern(
            shell,
            &pattern_word.text,
            pattern_word.kind,
            pattern_word.quote,
        )?;
        if pattern::pattern_matches(&pat, subject) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn exec_select(shell: &mut Shell, node: &SelectNode) -> Result<i32, ExecError> {
    let mut guard = FdGuard::new();
    redirect::apply_redirects(shell, &node.redirects, Some(&mut guard))?;

    let items: Vec<String> = match &node.words {
        Some(words) => {
            let mut fields = Vec::new();
            for word in words {
                fields.extend(expansion::expand_word(
                    shell, &word.text, word.kind, word.quote,
                )?);
            }
            fields
        }
        None => shell.vars.positional().to_vec(),
    };

    let ps3 = shell.vars.get("PS3").unwrap_or_else(|| "#? ".to_string());
    shell.loop_depth += 1;
    let mut status = 0;
    let result = loop {
        let mut menu = String::new();
        for (i, item) in items.iter().enumerate() {
            menu.push_str(&format!("{}) {}\n", i + 1, item));
        }
        menu.push_str(&ps3);
        shell.write_stderr(&menu);

        let Some(line) = shell.read_line_stdin() else {
            break Ok(status);
        };
        let reply = line.trim().to_string();
        if reply.is_empty() {
            continue;
        }
        let _ = shell.vars.set_scalar("REPLY", reply.clone());
        let selection = reply
            .parse::<usize>()
            .ok()
            .and_then(|n| (1..=items.len()).contains(&n).then(|| items[n - 1].clone()))
            .unwrap_or_default();
        if let Err(e) = shell.vars.set_scalar(&node.variable, selection) {
            shell.print_error(&node.variable, &e.to_string());
            break Ok(1);
        }
        match run_loop_body(shell, &node.body) {
            LoopSignal::Normal(s) => status = s,
            LoopSignal::Break => break Ok(status),
            LoopSignal::Continue => continue,
            LoopSignal::Propagate(e) => break Err(e),
        }
    };
    shell.loop_depth -= 1;
    result
}

// =============================================================================
// ARITHMETIC AND TEST COMMANDS
// =============================================================================

pub fn exec_arith_eval(shell: &mut Shell, node: &ArithEvalNode) -> Result<i32, ExecError> {
    let mut guard = FdGuard::new();
    redirect::apply_redirects(shell, &node.redirects, Some(&mut guard))?;

    match shell.arith(&node.expression) {
        Ok(value) => Ok(if value != 0 { 0 } else { 1 }),
        Err(e) => {
            shell.print_error(&format!("((: {}", node.expression.trim()), &e.to_string());
            Ok(1)
        }
    }
}

pub fn exec_test(shell: &mut Shell, node: &TestNode) -> Result<i32, ExecError> {
    let mut guard = FdGuard::new();
    redirect::apply_redirects(shell, &node.redirects, Some(&mut guard))?;
    let value = eval_test_expr(shell, &node.expression)?;
    Ok(if value { 0 } else { 1 })
}

fn eval_test_expr(shell: &mut Shell, expr: &TestExprNode) -> Result<bool, ExecError> {
    match expr {
        TestExprNode::Or(left, right) => {
            Ok(eval_test_expr(shell, left)? || eval_test_expr(shell, right)?)
        }
        TestExprNode::And(left, right) => {
            Ok(eval_test_expr(shell, left)? && eval_test_expr(shell, right)?)
        }
        TestExprNode::Not(inner) => Ok(!eval_test_expr(shell, inner)?),
        TestExprNode::Word(word) => {
            let value =
                expansion::expand_to_string(shell, &word.text, word.kind, word.quote)?;
            Ok(!value.is_empty())
        }
        TestExprNode::Unary { op, operand } => {
            let value = expansion::expand_to_string(
                shell,
                &operand.text,
                operand.kind,
                operand.quote,
            )?;
            Ok(eval_unary_test(shell, op, &value))
        }
        TestExprNode::Binary { op, left, right } => {
            let lhs = expansion::expand_to_string(shell, &left.text, left.kind, left.quote)?;
            match op.as_str() {
                "=" | "==" | "!=" => {
                    let pat = expansion::expand_to_pattern(
                        shell,
                        &right.text,
                        right.kind,
                        right.quote,
                    )?;
                    let matched = pattern::pattern_matches(&pat, &lhs);
                    Ok(if op == "!=" { !matched } else { matched })
                }
                "=~" => {
                    let pat = expansion::expand_to_string(
                        shell,
                        &right.text,
                        right.kind,
                        right.quote,
                    )?;
                    match regex_lite::Regex::new(&pat) {
                        Ok(re) => Ok(re.is_match(&lhs)),
                        Err(_) => Ok(false),
                    }
                }
                "<" | ">" => {
                    let rhs = expansion::expand_to_string(
                        shell,
                        &right.text,
                        right.kind,
                        right.quote,
                    )?;
                    Ok(if op == "<" { lhs < rhs } else { lhs > rhs })
                }
                "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" => {
                    let rhs = expansion::expand_to_string(
                        shell,
                        &right.text,
                        right.kind,
                        right.quote,
                    )?;
                    let a = shell.arith(&lhs).unwrap_or(0);
                    let b = shell.arith(&rhs).unwrap_or(0);
                    Ok(match op.as_str() {
                        "-eq" => a == b,
                        "-ne" => a != b,
                        "-lt" => a < b,
                        "-le" => a <= b,
                        "-gt" => a > b,
                        _ => a >= b,
                    })
                }
                "-nt" | "-ot" | "-ef" => {
                    let rhs = expansion::expand_to_string(
                        shell,
                        &right.text,
                        right.kind,
                        right.quote,
                    )?;
                    Ok(compare_files(op, &lhs, &rhs))
                }
                _ => Ok(false),
            }
        }
    }
}

fn eval_unary_test(shell: &mut Shell, op: &str, value: &str) -> bool {
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::fs::MetadataExt;
    use std::os::unix::fs::PermissionsExt;

    let metadata = || std::fs::metadata(value);
    match op {
        "-z" => value.is_empty(),
        "-n" => !value.is_empty(),
        "-e" | "-a" => std::fs::symlink_metadata(value).is_ok(),
        "-f" => metadata().map(|m| m.is_file()).unwrap_or(false),
        "-d" => metadata().map(|m| m.is_dir()).unwrap_or(false),
        "-h" | "-L" => std::fs::symlink_metadata(value)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false),
        "-s" => metadata().map(|m| m.len() > 0).unwrap_or(false),
        "-r" => nix::unistd::access(value, nix::unistd::AccessFlags::R_OK).is_ok(),
        "-w" => nix::unistd::access(value, nix::unistd::AccessFlags::W_OK).is_ok(),
        "-x" => nix::unistd::access(value, nix::unistd::AccessFlags::X_OK).is_ok(),
        "-p" => metadata()
            .map(|m| m.file_type().is_fifo())
            .unwrap_or(false),
        "-S" => metadata()
            .map(|m| m.file_type().is_socket())
            .unwrap_or(false),
        "-b" => metadata()
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false),
        "-c" => metadata()
            .map(|m| m.file_type().is_char_device())
            .unwrap_or(false),
        "-g" => metadata()
            .map(|m| m.permissions().mode() & 0o2000 != 0)
            .unwrap_or(false),
        "-u" => metadata()
            .map(|m| m.permissions().mode() & 0o4000 != 0)
            .unwrap_or(false),
        "-k" => metadata()
            .map(|m| m.permissions().mode() & 0o1000 != 0)
            .unwrap_or(false),
        "-G" => metadata()
            .map(|m| m.gid() == nix::unistd::getegid().as_raw())
            .unwrap_or(false),
        "-O" => metadata()
            .map(|m| m.uid() == nix::unistd::geteuid().as_raw())
            .unwrap_or(false),
        "-N" => metadata().map(|m| m.mtime() > m.atime()).unwrap_or(false),
        "-t" => value
            .parse::<i32>()
            .ok()
            .map(|fd| nix::unistd::isatty(fd).unwrap_or(false))
            .unwrap_or(false),
        "-v" => shell.vars.is_set(value),
        "-R" => shell
            .vars
            .get_var(value)
            .is_some_and(|v| v.attrs.contains(crate::vars::VarAttrs::NAMEREF)),
        "-o" => shell
            .options
            .listing()
            .iter()
            .any(|(name, on)| *name == value && *on),
        _ => false,
    }
}

fn compare_files(op: &str, a: &str, b: &str) -> bool {
    use std::os::unix::fs::MetadataExt;
    let ma = std::fs::metadata(a);
    let mb = std::fs::metadata(b);
    match op {
        "-nt" => match (ma, mb) {
            (Ok(x), Ok(y)) => x.mtime() > y.mtime(),
            (Ok(_), Err(_)) => true,
            _ => false,
        },
        "-ot" => match (ma, mb) {
            (Ok(x), Ok(y)) => x.mtime() < y.mtime(),
            (Err(_), Ok(_)) => true,
            _ => false,
        },
        "-ef" => match (ma, mb) {
            (Ok(x), Ok(y)) => x.dev() == y.dev() && x.ino() == y.ino(),
            _ => false,
        },
        _ => false,
    }
}

// =============================================================================
// SUBSHELLS AND GROUPS
// =============================================================================

/// `( ... )`: fork; variable changes do not propagate and traps reset.
pub fn exec_subshell(shell: &mut Shell, node: &SubshellNode) -> Result<i32, ExecError> {
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            signals::reset_child_signals();
            shell.in_forked_child = true;
            shell.enter_subshell();
            let status = match redirect::apply_redirects(shell, &node.redirects, None)
                .and_then(|_| exec_statements(shell, &node.body))
            {
                Ok(status) => status,
                Err(ExecError::Flow(ControlFlow::Exit(code))) => code,
                Err(ExecError::Flow(_)) => 0,
                Err(e) => {
                    shell.report_error(&e);
                    1
                }
            };
            shell.exit_process(status);
        }
        Ok(ForkResult::Parent { child }) => Ok(command_subst::wait_for_child(child)),
        Err(e) => Err(ExecError::Fatal {
            status: 1,
            message: format!("fork failed: {e}"),
        }),
    }
}

/// `{ ...; }`: current process, scoped redirects.
pub fn exec_brace_group(shell: &mut Shell, node: &BraceGroupNode) -> Result<i32, ExecError> {
    let mut guard = FdGuard::new();
    redirect::apply_redirects(shell, &node.redirects, Some(&mut guard))?;
    exec_statements(shell, &node.body)
}
