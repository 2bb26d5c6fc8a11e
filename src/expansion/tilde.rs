//! Tilde expansion
//!
//! A leading unquoted `~` expands to `$HOME`; `~user` resolves through the
//! OS user database. Applied to word starts, to the value position of
//! assignments, and after each `:` in PATH-like assignment values.

use crate::shell::Shell;

/// Expand a leading tilde prefix in `value`. Returns the input unchanged
/// when there is nothing to expand (no `~`, or an unknown user).
pub fn expand_tilde(shell: &Shell, value: &str) -> String {
    if !value.starts_with('~') {
        return value.to_string();
    }

    let rest_idx = value[1..]
        .find('/')
        .map(|i| i + 1)
        .unwrap_or(value.len());
    let user = &value[1..rest_idx];
    let rest = &value[rest_idx..];

    if user.is_empty() {
        let home = shell
            .vars
            .get("HOME")
            .unwrap_or_else(|| "/".to_string());
        return format!("{home}{rest}");
    }

    // A tilde-prefix containing quote or expansion characters is literal
    if !user
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return value.to_string();
    }

    match nix::unistd::User::from_name(user) {
        Ok(Some(entry)) => format!("{}{rest}", entry.dir.display()),
        _ => value.to_string(),
    }
}

/// Tilde expansion for assignment values: the start of the value and the
/// position after each `:` are tilde-expandable.
pub fn expand_tilde_assignment(shell: &Shell, value: &str) -> String {
    value
        .split(':')
        .map(|part| expand_tilde(shell, part))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::Shell;

    fn shell_with_home(home: &str) -> Shell {
        let mut shell = Shell::new();
        shell.vars.set_scalar("HOME", home).unwrap();
        shell
    }

    #[test]
    fn test_bare_tilde() {
        let shell = shell_with_home("/home/u");
        assert_eq!(expand_tilde(&shell, "~"), "/home/u");
    }

    #[test]
    fn test_tilde_slash() {
        let shell = shell_with_home("/home/u");
        assert_eq!(expand_tilde(&shell, "~/src"), "/home/u/src");
    }

    #[test]
    fn test_unknown_user_literal() {
        let shell = shell_with_home("/home/u");
        assert_eq!(
            expand_tilde(&shell, "~no_such_user_zz/x"),
            "~no_such_user_zz/x"
        );
    }

    #[test]
    fn test_non_tilde_untouched() {
        let shell = shell_with_home("/home/u");
        assert_eq!(expand_tilde(&shell, "a~b"), "a~b");
    }

    #[test]
    fn test_assignment_colon_positions() {
        let shell = shell_with_home("/h");
        assert_eq!(
            expand_tilde_assignment(&shell, "~/bin:/usr/bin:~/sbin"),
            "/h/bin:/usr/bin:/h/sbin"
        );
    }
}
