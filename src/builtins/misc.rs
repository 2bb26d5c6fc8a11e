//! Regular builtins: `alias`, `unalias`, `local`, `read`, `cd`, `echo`,
//! `true`/`false`, the job-table commands, and `command`.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::exec::launcher;
use crate::expansion::word_split::ifs_split;
use crate::jobs::JobState;
use crate::shell::Shell;

pub fn true_builtin(_args: &[String], _shell: &mut Shell) -> i32 {
    0
}

pub fn false_builtin(_args: &[String], _shell: &mut Shell) -> i32 {
    1
}

pub fn alias(args: &[String], shell: &mut Shell) -> i32 {
    if args.is_empty() {
        let mut out = String::new();
        for (name, value) in shell.aliases.iter() {
            out.push_str(&format!("alias {name}='{value}'\n"));
        }
        shell.write_stdout(&out);
        return 0;
    }
    let mut status = 0;
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => shell.aliases.set(name, value),
            None => match shell.aliases.get(arg) {
                Some(value) => {
                    let line = format!("alias {arg}='{value}'\n");
                    shell.write_stdout(&line);
                }
                None => {
                    shell.print_error("alias", &format!("{arg}: not found"));
                    status = 1;
                }
            },
        }
    }
    status
}

pub fn unalias(args: &[String], shell: &mut Shell) -> i32 {
    if args.first().map(String::as_str) == Some("-a") {
        shell.aliases.clear();
        return 0;
    }
    let mut status = 0;
    for name in args {
        if !shell.aliases.remove(name) {
            shell.print_error("unalias", &format!("{name}: not found"));
            status = 1;
        }
    }
    status
}

pub fn local(args: &[String], shell: &mut Shell) -> i32 {
    if shell.function_depth == 0 {
        shell.print_error("local", "can only be used in a function");
        return 1;
    }
    let mut status = 0;
    for arg in args {
        let (name, value) = match arg.split_once('=') {
            Some((n, v)) => (n, v.to_string()),
            None => (arg.as_str(), String::new()),
        };
        if let Err(e) = shell.vars.set_local(name, value) {
            shell.print_error("local", &e.to_string());
            status = 1;
        }
    }
    status
}

/// `read [-r] [name...]`: one line from stdin into variables, split on IFS;
/// the last name takes the remainder. Without names, `REPLY` gets the line.
pub fn read(args: &[String], shell: &mut Shell) -> i32 {
    let mut raw = false;
    let mut names: Vec<&String> = Vec::new();
    for arg in args {
        if arg == "-r" {
            raw = true;
        } else {
            names.push(arg);
        }
    }

    let mut line = String::new();
    loop {
        match shell.read_line_stdin() {
            None => {
                if line.is_empty() {
                    return 1;
                }
                break;
            }
            Some(text) => {
                if !raw && text.ends_with('\\') {
                    // Backslash-newline continues the line
                    line.push_str(&text[..text.len() - 1]);
                    continue;
                }
                let text = if raw {
                    text
                } else {
                    unescape_read_line(&text)
                };
                line.push_str(&text);
                break;
            }
        }
    }

    if names.is_empty() {
        let _ = shell.vars.set_scalar("REPLY", line);
        return 0;
    }

    let ifs = shell.ifs();
    let parts = ifs_split(&line, &ifs).parts;
    for (i, name) in names.iter().enumerate() {
        let value = if i + 1 == names.len() {
            // Remainder joins into the final variable
            if i < parts.len() {
                parts[i..].join(&ifs.chars().next().map(String::from).unwrap_or_default())
            } else {
                String::new()
            }
        } else {
            parts.get(i).cloned().unwrap_or_default()
        };
        if let Err(e) = shell.vars.set_scalar(name, value) {
            shell.print_error("read", &e.to_string());
            return 1;
        }
    }
    0
}

fn unescape_read_line(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn cd(args: &[String], shell: &mut Shell) -> i32 {
    let target = match args.first().map(String::as_str) {
        None | Some("") => match shell.vars.get("HOME") {
            Some(home) => home,
            None => {
                shell.print_error("cd", "HOME not set");
                return 1;
            }
        },
        Some("-") => match shell.vars.get("OLDPWD") {
            Some(oldpwd) => {
                shell.write_stdout(&format!("{oldpwd}\n"));
                oldpwd
            }
            None => {
                shell.print_error("cd", "OLDPWD not set");
                return 1;
            }
        },
        Some(path) => path.to_string(),
    };

    let oldpwd = std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Err(e) = std::env::set_current_dir(&target) {
        shell.print_error("cd", &format!("{target}: {e}"));
        return 1;
    }
    let pwd = std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or(target);
    let _ = shell.vars.set_scalar("OLDPWD", oldpwd);
    let _ = shell.vars.set_scalar("PWD", pwd);
    0
}

pub fn echo(args: &[String], shell: &mut Shell) -> i32 {
    let mut newline = true;
    let mut interpret = false;
    let mut start = 0;
    for arg in args {
        match arg.as_str() {
            "-n" => newline = false,
            "-e" => interpret = true,
            "-E" => interpret = false,
            "-ne" | "-en" => {
                newline = false;
                interpret = true;
            }
            _ => break,
        }
        start += 1;
    }

    let mut text = args[start..].join(" ");
    if interpret {
        text = crate::expansion::quote::ansi_c_unescape(&text);
    }
    if newline {
        text.push('\n');
    }
    shell.write_stdout(&text);
    0
}

// =============================================================================
// JOB TABLE COMMANDS
// =============================================================================

pub fn jobs(_args: &[String], shell: &mut Shell) -> i32 {
    shell.jobs.update();
    let numbers: Vec<usize> = shell.jobs.iter().map(|(n, _)| *n).collect();
    let mut out = String::new();
    for number in numbers {
        if let Some(line) = shell.jobs.format_job(number) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    shell.write_stdout(&out);
    shell.jobs.remove_done();
    0
}

pub fn fg(args: &[String], shell: &mut Shell) -> i32 {
    shell.jobs.update();
    let spec = args.first().map(String::as_str).unwrap_or("%+");
    let Some(number) = shell.jobs.lookup(spec) else {
        shell.print_error("fg", &format!("{spec}: no such job"));
        return 1;
    };
    let Some((pgid, text)) = shell.jobs.get(number).map(|j| (j.pgid, j.text.clone())) else {
        return 1;
    };
    shell.write_stderr(&format!("{text}\n"));

    let _ = kill(Pid::from_raw(-pgid.as_raw()), Signal::SIGCONT);
    if let Some(witness) = shell.interactive_signals.as_ref() {
        shell.jobs.take_terminal(witness, pgid);
    }
    let status = shell.jobs.wait_job(number);
    if let Some(witness) = shell.interactive_signals.as_ref() {
        shell.jobs.restore_terminal(witness);
    }
    if shell
        .jobs
        .get(number)
        .is_some_and(|j| j.state == JobState::Done)
    {
        shell.jobs.remove(number);
    }
    status
}

pub fn bg(args: &[String], shell: &mut Shell) -> i32 {
    shell.jobs.update();
    let spec = args.first().map(String::as_str).unwrap_or("%+");
    let Some(number) = shell.jobs.lookup(spec) else {
        shell.print_error("bg", &format!("{spec}: no such job"));
        return 1;
    };
    let Some(job) = shell.jobs.get_mut(number) else { return 1 };
    let pgid = job.pgid;
    job.state = JobState::Running;
    for entry in &mut job.procs {
        if entry.state == JobState::Stopped {
            entry.state = JobState::Running;
        }
    }
    let text = job.text.clone();
    let _ = kill(Pid::from_raw(-pgid.as_raw()), Signal::SIGCONT);
    shell.write_stderr(&format!("[{number}]+ {text} &\n"));
    0
}

pub fn wait_builtin(args: &[String], shell: &mut Shell) -> i32 {
    shell.jobs.update();
    if args.is_empty() {
        let numbers: Vec<usize> = shell.jobs.iter().map(|(n, _)| *n).collect();
        let mut status = 0;
        for number in numbers {
            status = shell.jobs.wait_job(number);
        }
        shell.jobs.remove_done();
        return status;
    }
    let mut status = 0;
    for spec in args {
        let number = match shell.jobs.lookup(spec) {
            Some(n) => n,
            None => {
                status = 127;
                continue;
            }
        };
        status = shell.jobs.wait_job(number);
    }
    shell.jobs.remove_done();
    status
}

pub fn disown(args: &[String], shell: &mut Shell) -> i32 {
    let mut keep = false;
    let mut specs: Vec<&String> = Vec::new();
    for arg in args {
        if arg == "-h" {
            keep = true;
        } else {
            specs.push(arg);
        }
    }

    let numbers: Vec<usize> = if specs.is_empty() {
        shell.jobs.lookup("%+").into_iter().collect()
    } else {
        specs
            .iter()
            .filter_map(|spec| shell.jobs.lookup(spec))
            .collect()
    };
    if numbers.is_empty() {
        shell.print_error("disown", "no current job");
        return 1;
    }
    for number in numbers {
        if keep {
            if let Some(job) = shell.jobs.get_mut(number) {
                job.keep_on_hup = true;
            }
        } else {
            shell.jobs.remove(number);
        }
    }
    0
}

/// `command name [args...]`: run `name` bypassing functions and aliases.
pub fn command(args: &[String], shell: &mut Shell) -> i32 {
    let mut idx = 0;
    while idx < args.len() && (args[idx] == "-p" || args[idx] == "-v" || args[idx] == "-V") {
        idx += 1;
    }
    let Some(name) = args.get(idx) else { return 0 };

    if let Some(builtin) = crate::builtins::find_special(name)
        .or_else(|| crate::builtins::find_regular(name))
    {
        return builtin(&args[idx + 1..], shell);
    }
    match launcher::find_in_path(shell, name) {
        Some(path) => {
            let env = shell.vars.environment();
            match launcher::launch_external(
                shell,
                &path,
                &args[idx..],
                &[],
                env,
                false,
                &args[idx..].join(" "),
            ) {
                Ok(status) => status,
                Err(e) => {
                    shell.report_error(&e);
                    1
                }
            }
        }
        None => {
            shell.print_error(name, "command not found");
            127
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_roundtrip() {
        let mut shell = Shell::new();
        assert_eq!(alias(&["ll=ls -l".to_string()], &mut shell), 0);
        assert_eq!(shell.aliases.get("ll"), Some("ls -l"));
        assert_eq!(unalias(&["ll".to_string()], &mut shell), 0);
        assert_eq!(unalias(&["ll".to_string()], &mut shell), 1);
    }

    #[test]
    fn test_local_outside_function() {
        let mut shell = Shell::new();
        assert_eq!(local(&["x=1".to_string()], &mut shell), 1);
    }

    #[test]
    fn test_cd_and_pwd_vars() {
        let mut shell = Shell::new();
        let before = std::env::current_dir().unwrap();
        assert_eq!(cd(&["/".to_string()], &mut shell), 0);
        assert_eq!(shell.vars.get("PWD").as_deref(), Some("/"));
        assert_eq!(
            shell.vars.get("OLDPWD").as_deref(),
            Some(before.to_string_lossy().as_ref())
        );
        let _ = std::env::set_current_dir(before);
    }

    #[test]
    fn test_cd_missing_dir() {
        let mut shell = Shell::new();
        assert_eq!(cd(&["/no/such/dir/zz".to_string()], &mut shell), 1);
    }
}
