//! Evaluator
//!
//! Tree-walking execution of the AST. At every simple command the expansion
//! engine resolves arguments and redirect targets; dispatch then runs the
//! ordered strategy chain (special builtin, function, builtin, alias,
//! external). `$?` is updated after every pipeline, `errexit`/`nounset`/
//! `xtrace` semantics live here, and pending traps are drained between
//! simple commands.

use crate::ast::types::{
    AndOrListNode, AndOrOperator, ArrayAssignmentNode, CommandNode, CompoundCommandNode,
    PipelineNode, ProgramItem, ProgramNode, SimpleCommandNode, StatementNode,
};
use crate::exec::errors::{ControlFlow, ExecError};
use crate::exec::redirect::{self, FdGuard};
use crate::exec::strategy::{self, Resolved};
use crate::exec::{control_flow, launcher, pipeline};
use crate::expansion::{self, ExpansionError};
use crate::parser::lexer::{QuoteType, TokenType};
use crate::parser::parser::split_subscript;
use crate::shell::Shell;
use crate::vars::VarAttrs;

// =============================================================================
// PROGRAM AND STATEMENTS
// =============================================================================

pub fn run_program(shell: &mut Shell, program: &ProgramNode) -> Result<i32, ExecError> {
    let mut status = 0;
    for item in &program.items {
        match item {
            ProgramItem::FunctionDef(def) => {
                shell.functions.insert(def.name.clone(), def.clone());
                status = 0;
                shell.vars.last_status = 0;
            }
            ProgramItem::Statement(statement) => {
                status = exec_statement(shell, statement)?;
            }
        }
    }
    Ok(status)
}

pub fn exec_statements(
    shell: &mut Shell,
    statements: &[StatementNode],
) -> Result<i32, ExecError> {
    let mut status = 0;
    for statement in statements {
        status = exec_statement(shell, statement)?;
    }
    Ok(status)
}

pub fn exec_statement(shell: &mut Shell, statement: &StatementNode) -> Result<i32, ExecError> {
    if shell.options.noexec {
        return Ok(0);
    }
    match statement {
        StatementNode::FunctionDef(def) => {
            shell.functions.insert(def.name.clone(), def.clone());
            shell.vars.last_status = 0;
            Ok(0)
        }
        StatementNode::Break(levels) => {
            if shell.loop_depth == 0 {
                shell.print_error(
                    "break",
                    "only meaningful in a `for', `while', or `until' loop",
                );
                return Ok(0);
            }
            Err(ExecError::Flow(ControlFlow::Break(*levels)))
        }
        StatementNode::Continue(levels) => {
            if shell.loop_depth == 0 {
                shell.print_error(
                    "continue",
                    "only meaningful in a `for', `while', or `until' loop",
                );
                return Ok(0);
            }
            Err(ExecError::Flow(ControlFlow::Continue(*levels)))
        }
        StatementNode::AndOr(list) => exec_and_or(shell, list),
    }
}

pub fn exec_and_or(shell: &mut Shell, list: &AndOrListNode) -> Result<i32, ExecError> {
    shell.current_line = list.line;
    let mut status = 0;
    for (i, pipe) in list.pipelines.iter().enumerate() {
        if i > 0 {
            let run = match list.operators[i - 1] {
                AndOrOperator::And => status == 0,
                AndOrOperator::Or => status != 0,
            };
            if !run {
                continue;
            }
        }
        status = exec_pipeline(shell, pipe)?;

        let is_last = i == list.pipelines.len() - 1;
        if is_last
            && status != 0
            && shell.options.errexit
            && !shell.in_condition
            && !pipe.inverted
        {
            return Err(ExecError::exit(status));
        }
    }
    Ok(status)
}

pub fn exec_pipeline(shell: &mut Shell, pipe: &PipelineNode) -> Result<i32, ExecError> {
    if pipe.background {
        let text = pipeline_display(pipe);
        let status = pipeline::exec_background(shell, pipe, &text)?;
        shell.vars.last_status = status;
        return Ok(status);
    }

    let mut status = if pipe.commands.len() == 1 {
        exec_command(shell, &pipe.commands[0])?
    } else {
        let text = pipeline_display(pipe);
        pipeline::exec_multi_pipeline(shell, &pipe.commands, &text)?
    };

    if pipe.inverted {
        status = if status == 0 { 1 } else { 0 };
    }
    shell.vars.last_status = status;
    Ok(status)
}

pub fn exec_command(shell: &mut Shell, command: &CommandNode) -> Result<i32, ExecError> {
    let status = match command {
        CommandNode::Simple(simple) => exec_simple(shell, simple)?,
        CommandNode::Compound(compound) => control_flow::exec_compound_body(shell, compound)?,
    };
    shell.vars.last_status = status;
    Ok(status)
}

// =============================================================================
// SIMPLE COMMANDS
// =============================================================================

pub fn exec_simple(shell: &mut Shell, node: &SimpleCommandNode) -> Result<i32, ExecError> {
    debug_assert_eq!(node.args.len(), node.arg_token_kinds.len());
    debug_assert_eq!(node.args.len(), node.quote_types.len());
    shell.current_line = node.line;
    shell.vars.current_line = node.line;
    // Claimed here so nested commands (function bodies, substitutions)
    // never inherit the exec-in-place permission.
    let exec_final = std::mem::take(&mut shell.exec_final);

    run_debug_trap(shell)?;

    // Step 1: the leading run of NAME=value words is the assignment list.
    let mut split = 0;
    while split < node.args.len()
        && matches!(
            node.arg_token_kinds[split],
            TokenType::Assign | TokenType::PlusAssign
        )
    {
        split += 1;
    }

    // Alias substitution happens on the raw words, before expansion.
    if split < node.args.len()
        && node.quote_types[split] == QuoteType::None
        && node.arg_token_kinds[split] == TokenType::Word
    {
        let name = node.args[split].clone();
        if let Resolved::Alias(value) = strategy::resolve(shell, &name, true) {
            return run_alias(shell, node, split, &name, &value);
        }
    }

    // Step 2: expand and apply assignments.
    shell.last_cmdsub_status = 0;
    let has_command = split < node.args.len();

    if !has_command {
        // Assignment-only command: permanent assignments.
        for i in 0..split {
            apply_assignment_text(
                shell,
                &node.args[i],
                node.arg_token_kinds[i] == TokenType::PlusAssign,
            )?;
        }
        for assignment in &node.array_assignments {
            apply_array_assignment(shell, assignment)?;
        }
        let status = shell.last_cmdsub_status;
        if !node.redirects.is_empty() {
            let mut guard = FdGuard::new();
            if let Err(e) = redirect::apply_redirects(shell, &node.redirects, Some(&mut guard)) {
                return redirect_failure(shell, e);
            }
        }
        run_err_trap(shell, status)?;
        finish_command(shell);
        return Ok(status);
    }

    // Temporary assignments for the command's duration.
    let mut saved_vars = Vec::new();
    for i in 0..split {
        let (name, _) = assignment_parts(&node.args[i]);
        saved_vars.push((name.clone(), shell.vars.get_var(&name).cloned()));
    }
    let mut temp_result = Ok(());
    for i in 0..split {
        if let Err(e) = apply_assignment_text(
            shell,
            &node.args[i],
            node.arg_token_kinds[i] == TokenType::PlusAssign,
        ) {
            temp_result = Err(e);
            break;
        }
        let (name, _) = assignment_parts(&node.args[i]);
        let _ = shell.vars.add_attrs(&name, VarAttrs::EXPORTED);
    }
    if let Err(e) = temp_result {
        restore_vars(shell, saved_vars);
        return Err(e);
    }

    // Step 3: expand the remaining arguments.
    let fields = match expansion::expand_args(
        shell,
        &node.args[split..],
        &node.arg_token_kinds[split..],
        &node.quote_types[split..],
    ) {
        Ok(fields) => fields,
        Err(e) => {
            restore_vars(shell, saved_vars);
            return expansion_failure(shell, e);
        }
    };

    if shell.options.debug_expansion {
        eprintln!("psh: expanded: {fields:?}");
    }

    if fields.is_empty() {
        // Everything expanded away: assignments become permanent.
        saved_vars.clear();
        for assignment in &node.array_assignments {
            apply_array_assignment(shell, assignment)?;
        }
        let status = shell.last_cmdsub_status;
        finish_command(shell);
        return Ok(status);
    }

    if shell.options.xtrace {
        let ps4 = shell.vars.get("PS4").unwrap_or_else(|| "+ ".to_string());
        shell.write_stderr(&format!("{}{}\n", ps4, fields.join(" ")));
    }

    // Step 4: dispatch through the strategy chain.
    let name = fields[0].clone();
    if shell.options.debug_exec {
        eprintln!("psh: exec: {}", fields.join(" "));
    }
    let result = dispatch_command(shell, node, &name, &fields, exec_final);

    // Temporary assignments persist only for POSIX special builtins.
    let persists = shell.options.posix && crate::builtins::find_special(&name).is_some();
    if !persists {
        restore_vars(shell, saved_vars);
    }

    let status = match result {
        Ok(status) => status,
        Err(e) => {
            finish_command(shell);
            return Err(e);
        }
    };

    run_err_trap(shell, status)?;
    finish_command(shell);
    Ok(status)
}

fn dispatch_command(
    shell: &mut Shell,
    node: &SimpleCommandNode,
    name: &str,
    fields: &[String],
    exec_final: bool,
) -> Result<i32, ExecError> {
    match strategy::resolve(shell, name, false) {
        Resolved::SpecialBuiltin(builtin) | Resolved::Builtin(builtin) => {
            // `exec` applies its redirections permanently.
            let unguarded = name == "exec";
            let mut guard = FdGuard::new();
            let applied = if unguarded {
                redirect::apply_redirects(shell, &node.redirects, None)
            } else {
                redirect::apply_redirects(shell, &node.redirects, Some(&mut guard))
            };
            if let Err(e) = applied {
                return redirect_failure_keep_flow(shell, e);
            }
            let status = builtin(&fields[1..], shell);
            drop(guard);
            if let Some(flow) = shell.pending_flow.take() {
                return Err(ExecError::Flow(flow));
            }
            Ok(status)
        }
        Resolved::Function(func) => {
            strategy::call_function(shell, &func, &fields[1..], &node.redirects)
        }
        Resolved::Alias(_) => unreachable!("aliases resolved before expansion"),
        Resolved::External(path) => {
            let env = shell.vars.environment();
            shell.exec_final = exec_final;
            launcher::launch_external(
                shell,
                &path,
                fields,
                &node.redirects,
                env,
                node.background,
                &simple_display(node),
            )
        }
        Resolved::NotFound => {
            let mut guard = FdGuard::new();
            let _ = redirect::apply_redirects(shell, &node.redirects, Some(&mut guard));
            shell.print_error(name, "command not found");
            Ok(127)
        }
    }
}

// =============================================================================
// ALIASES
// =============================================================================

/// Re-quote an argument word so re-parsing reproduces the original.
fn requote_arg(text: &str, kind: TokenType, quote: QuoteType) -> String {
    match quote {
        QuoteType::Single => format!("'{text}'"),
        QuoteType::Double => format!("\"{text}\""),
        QuoteType::AnsiC => format!("$'{text}'"),
        QuoteType::None => match kind {
            TokenType::Variable => format!("${text}"),
            TokenType::ParamExpansion => format!("${{{text}}}"),
            TokenType::CommandSub => format!("$({text})"),
            TokenType::ArithExpansion => format!("$(({text}))"),
            TokenType::ProcessSubIn => format!("<({text})"),
            TokenType::ProcessSubOut => format!(">({text})"),
            _ => text.to_string(),
        },
    }
}

/// Textual alias substitution: rebuild the command line with the alias value
/// in place of the name, re-parse, and run with a recursion guard. A value
/// with a trailing space lets the following word be alias-checked too.
fn run_alias(
    shell: &mut Shell,
    node: &SimpleCommandNode,
    cmd_idx: usize,
    name: &str,
    value: &str,
) -> Result<i32, ExecError> {
    let mut source = String::new();
    for i in 0..cmd_idx {
        source.push_str(&requote_arg(
            &node.args[i],
            node.arg_token_kinds[i],
            node.quote_types[i],
        ));
        source.push(' ');
    }
    source.push_str(value);

    let mut check_next_alias = value.ends_with(' ');
    for i in cmd_idx + 1..node.args.len() {
        source.push(' ');
        let mut text = requote_arg(&node.args[i], node.arg_token_kinds[i], node.quote_types[i]);
        if check_next_alias
            && node.quote_types[i] == QuoteType::None
            && node.arg_token_kinds[i] == TokenType::Word
        {
            if let Some(next_value) = shell.aliases.get(&text) {
                let next_value = next_value.to_string();
                check_next_alias = next_value.ends_with(' ');
                text = next_value;
            } else {
                check_next_alias = false;
            }
        } else {
            check_next_alias = false;
        }
        source.push_str(&text);
    }

    shell.expanding_aliases.insert(name.to_string());
    let mut guard = FdGuard::new();
    let result = redirect::apply_redirects(shell, &node.redirects, Some(&mut guard))
        .and_then(|_| shell.run_source(&source));
    drop(guard);
    shell.expanding_aliases.remove(name);
    result
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

/// Split `NAME=value` / `NAME[sub]=value` / `NAME+=value` text at the
/// assignment operator, respecting subscript brackets.
fn assignment_parts(text: &str) -> (String, String) {
    let chars: Vec<char> = text.chars().collect();
    let mut depth = 0usize;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '+' if depth == 0 && chars.get(i + 1) == Some(&'=') => {
                return (
                    chars[..i].iter().collect(),
                    chars[i + 2..].iter().collect(),
                );
            }
            '=' if depth == 0 => {
                return (
                    chars[..i].iter().collect(),
                    chars[i + 1..].iter().collect(),
                );
            }
            _ => {}
        }
    }
    (text.to_string(), String::new())
}

/// Expand and apply one scalar assignment word.
fn apply_assignment_text(
    shell: &mut Shell,
    text: &str,
    append: bool,
) -> Result<(), ExecError> {
    let (lhs, value_text) = assignment_parts(text);
    let (name, subscript) = split_subscript(&lhs);

    let mut value =
        expansion::expand_to_string(shell, &value_text, TokenType::Word, QuoteType::None)?;
    // Tilde expansion applies at the value start and after each colon
    if value_text.starts_with('~') || value_text.contains(":~") {
        value = expansion::tilde::expand_tilde_assignment(shell, &value);
    }
    if shell
        .vars
        .get_var(&name)
        .is_some_and(|v| v.attrs.contains(VarAttrs::INTEGER))
    {
        value = shell
            .arith(&value)
            .map_err(|e| ExpansionError::Arithmetic(e.to_string()))?
            .to_string();
    }

    let result = if subscript.is_empty() {
        if append {
            shell.vars.append_scalar(&name, &value)
        } else {
            shell.vars.set_scalar(&name, value)
        }
    } else {
        apply_subscript_assignment(shell, &name, &subscript, append, value)?
    };
    result.map_err(|e| ExecError::Fatal {
        status: 1,
        message: format!("psh: {e}"),
    })?;

    if shell.options.allexport {
        let _ = shell.vars.add_attrs(&name, VarAttrs::EXPORTED);
    }
    Ok(())
}

fn apply_subscript_assignment(
    shell: &mut Shell,
    name: &str,
    subscript: &str,
    append: bool,
    value: String,
) -> Result<Result<(), crate::vars::VarError>, ExecError> {
    let is_assoc = shell
        .vars
        .get_var(name)
        .is_some_and(|v| v.attrs.contains(VarAttrs::ASSOC));
    if is_assoc {
        let key =
            expansion::expand_to_string(shell, subscript, TokenType::Word, QuoteType::None)?;
        let value = if append {
            let old = match shell.vars.get_var(name).map(|v| &v.value) {
                Some(crate::vars::Value::Assoc(map)) => {
                    map.get(&key).cloned().unwrap_or_default()
                }
                _ => String::new(),
            };
            format!("{old}{value}")
        } else {
            value
        };
        Ok(shell.vars.set_assoc_element(name, key, value))
    } else {
        let index = shell
            .arith(subscript)
            .map_err(|e| ExpansionError::Arithmetic(e.to_string()))?;
        let value = if append {
            let old = match shell.vars.get_var(name).map(|v| &v.value) {
                Some(crate::vars::Value::Indexed(map)) => {
                    map.get(&index).cloned().unwrap_or_default()
                }
                _ => String::new(),
            };
            format!("{old}{value}")
        } else {
            value
        };
        Ok(shell.vars.set_indexed_element(name, index, value))
    }
}

/// Apply a `NAME=(...)` / `NAME[idx]=value` node.
pub fn apply_array_assignment(
    shell: &mut Shell,
    node: &ArrayAssignmentNode,
) -> Result<(), ExecError> {
    if let Some(elements) = &node.elements {
        let is_assoc = shell
            .vars
            .get_var(&node.name)
            .is_some_and(|v| v.attrs.contains(VarAttrs::ASSOC));

        if is_assoc {
            for element in elements {
                let (lhs, value_text) = assignment_parts(&element.text);
                let (_, key_text) = split_subscript(&lhs);
                let key = expansion::expand_to_string(
                    shell,
                    &key_text,
                    TokenType::Word,
                    QuoteType::None,
                )?;
                let value = expansion::expand_to_string(
                    shell,
                    &value_text,
                    TokenType::Word,
                    QuoteType::None,
                )?;
                shell
                    .vars
                    .set_assoc_element(&node.name, key, value)
                    .map_err(var_fatal)?;
            }
            return Ok(());
        }

        // Indexed literal: full expansion of each element, [idx]= entries
        // reset the running index.
        let mut values: Vec<(Option<i64>, String)> = Vec::new();
        for element in elements {
            if element.quote == QuoteType::None
                && element.text.starts_with('[')
                && element.text.contains("]=")
            {
                let close = element.text.find("]=").unwrap();
                let index_text = &element.text[1..close];
                let index = shell
                    .arith(index_text)
                    .map_err(|e| ExpansionError::Arithmetic(e.to_string()))?;
                let value = expansion::expand_to_string(
                    shell,
                    &element.text[close + 2..],
                    TokenType::Word,
                    QuoteType::None,
                )?;
                values.push((Some(index), value));
            } else {
                for field in
                    expansion::expand_word(shell, &element.text, element.kind, element.quote)?
                {
                    values.push((None, field));
                }
            }
        }

        if node.append {
            for (index, value) in values {
                match index {
                    Some(i) => shell
                        .vars
                        .set_indexed_element(&node.name, i, value)
                        .map_err(var_fatal)?,
                    None => shell
                        .vars
                        .set_indexed(&node.name, vec![value], true)
                        .map_err(var_fatal)?,
                }
            }
        } else {
            shell
                .vars
                .set_indexed(&node.name, Vec::new(), false)
                .map_err(var_fatal)?;
            let mut next = 0i64;
            for (index, value) in values {
                let at = index.unwrap_or(next);
                shell
                    .vars
                    .set_indexed_element(&node.name, at, value)
                    .map_err(var_fatal)?;
                next = at + 1;
            }
        }
        Ok(())
    } else {
        let value = match &node.scalar_value {
            Some(word) => {
                expansion::expand_to_string(shell, &word.text, word.kind, word.quote)?
            }
            None => String::new(),
        };
        apply_subscript_assignment(shell, &node.name, &node.subscript, node.append, value)?
            .map_err(var_fatal)?;
        Ok(())
    }
}

fn var_fatal(e: crate::vars::VarError) -> ExecError {
    ExecError::Fatal {
        status: 1,
        message: format!("psh: {e}"),
    }
}

fn restore_vars(shell: &mut Shell, saved: Vec<(String, Option<crate::vars::Variable>)>) {
    for (name, old) in saved {
        match old {
            Some(var) => shell.vars.restore_variable(&name, var),
            None => {
                let _ = shell.vars.unset(&name);
            }
        }
    }
}

// =============================================================================
// FAILURE AND TRAP HELPERS
// =============================================================================

fn expansion_failure(shell: &mut Shell, error: ExpansionError) -> Result<i32, ExecError> {
    match &error {
        ExpansionError::UnsetVariable(name) => {
            shell.print_error(name, "unbound variable");
            if shell.interactive {
                shell.vars.last_status = 1;
                Ok(1)
            } else {
                Err(ExecError::exit(1))
            }
        }
        ExpansionError::RequiredParam { name, message } => {
            shell.print_error(name, message);
            let status = if shell.options.posix { 127 } else { 1 };
            if shell.interactive || !shell.options.posix {
                shell.vars.last_status = status;
                Ok(status)
            } else {
                Err(ExecError::exit(status))
            }
        }
        _ => {
            let message = error.to_string();
            shell.print_error_plain(&message);
            shell.vars.last_status = 1;
            Ok(1)
        }
    }
}

fn redirect_failure(shell: &mut Shell, error: ExecError) -> Result<i32, ExecError> {
    if shell.options.errexit {
        if let ExecError::Redirect { context, message } = &error {
            shell.print_error(context, message);
            return Err(ExecError::exit(1));
        }
    }
    redirect_failure_keep_flow(shell, error)
}

fn redirect_failure_keep_flow(shell: &mut Shell, error: ExecError) -> Result<i32, ExecError> {
    match error {
        ExecError::Redirect { context, message } => {
            shell.print_error(&context, &message);
            if shell.options.errexit {
                Err(ExecError::exit(1))
            } else {
                Ok(1)
            }
        }
        other => Err(other),
    }
}

fn run_debug_trap(shell: &mut Shell) -> Result<(), ExecError> {
    if shell.in_trap {
        return Ok(());
    }
    let command = match shell.traps.get("DEBUG") {
        Some(crate::jobs::TrapAction::Command(c)) => c.clone(),
        _ => return Ok(()),
    };
    shell.in_trap = true;
    let result = shell.run_source(&command);
    shell.in_trap = false;
    result.map(|_| ())
}

fn run_err_trap(shell: &mut Shell, status: i32) -> Result<(), ExecError> {
    if status == 0 || shell.in_trap {
        return Ok(());
    }
    let command = match shell.traps.get("ERR") {
        Some(crate::jobs::TrapAction::Command(c)) => c.clone(),
        _ => return Ok(()),
    };
    shell.in_trap = true;
    let result = shell.run_source(&command);
    shell.in_trap = false;
    result.map(|_| ())
}

fn finish_command(shell: &mut Shell) {
    shell.cleanup_procsubs();
    shell.drain_traps();
    if crate::jobs::signals::take_sigchld_flag() {
        shell.jobs.update();
        shell.notify_done_jobs();
    }
}

// =============================================================================
// DISPLAY TEXT
// =============================================================================

fn simple_display(node: &SimpleCommandNode) -> String {
    node.args.join(" ")
}

fn command_display(command: &CommandNode) -> String {
    match command {
        CommandNode::Simple(simple) => simple_display(simple),
        CommandNode::Compound(compound) => match compound {
            CompoundCommandNode::Subshell(_) => "( ... )".to_string(),
            CompoundCommandNode::BraceGroup(_) => "{ ...; }".to_string(),
            CompoundCommandNode::If(_) => "if ...".to_string(),
            CompoundCommandNode::While(_) => "while ...".to_string(),
            CompoundCommandNode::Until(_) => "until ...".to_string(),
            CompoundCommandNode::ForEach(_) | CompoundCommandNode::ForArith(_) => {
                "for ...".to_string()
            }
            CompoundCommandNode::Case(_) => "case ...".to_string(),
            CompoundCommandNode::Select(_) => "select ...".to_string(),
            CompoundCommandNode::ArithEval(node) => format!("(( {} ))", node.expression),
            CompoundCommandNode::Test(_) => "[[ ... ]]".to_string(),
        },
    }
}

pub fn pipeline_display(pipe: &PipelineNode) -> String {
    let mut text = pipe
        .commands
        .iter()
        .map(command_display)
        .collect::<Vec<_>>()
        .join(" | ");
    if pipe.background {
        text.push_str(" &");
    }
    text
}
