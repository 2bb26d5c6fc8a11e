//! Pathname expansion
//!
//! Globbing of fields that still contain active metacharacters after word
//! splitting. Characters protected by the sentinel stay literal. A pattern
//! with no matches is kept literally; `noglob` suppresses the step entirely.
//! `**` recurses only when the `globstar` option is set, otherwise it
//! behaves as `*`.

use glob::{glob_with, MatchOptions, Pattern};

use crate::expansion::quote::{has_unprotected_glob, strip_sentinels, GLOB_SENTINEL};
use crate::expansion::ExpansionError;
use crate::shell::Shell;

/// Expand one field into pathnames, or return it literally (sentinels
/// stripped) when globbing is off or nothing matches.
pub fn expand_field(shell: &Shell, field: &str) -> Vec<String> {
    if shell.options.noglob || !has_unprotected_glob(field) {
        return vec![strip_sentinels(field)];
    }

    let pattern = build_glob_pattern(field, shell.options.globstar);
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let Ok(paths) = glob_with(&pattern, options) else {
        return vec![strip_sentinels(field)];
    };

    let mut matches: Vec<String> = paths
        .filter_map(Result::ok)
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    if matches.is_empty() {
        return vec![strip_sentinels(field)];
    }
    matches.sort();
    matches
}

/// Translate a sentinel-carrying field into a `glob` crate pattern:
/// protected characters are escaped, active ones pass through.
fn build_glob_pattern(field: &str, globstar: bool) -> String {
    let chars: Vec<char> = field.chars().collect();
    let mut pattern = String::with_capacity(field.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == GLOB_SENTINEL {
            if let Some(&next) = chars.get(i + 1) {
                pattern.push_str(&Pattern::escape(&next.to_string()));
                i += 2;
                continue;
            }
            i += 1;
            continue;
        }
        if c == '*' && !globstar {
            // Collapse runs of stars so `**` does not recurse
            while chars.get(i) == Some(&'*') {
                i += 1;
            }
            pattern.push('*');
            continue;
        }
        pattern.push(c);
        i += 1;
    }
    pattern
}

/// Expand a redirection target: all steps except word splitting. Globbing
/// must resolve to exactly one path; several matches make the redirect
/// ambiguous.
pub fn expand_redirect_target(
    shell: &Shell,
    expanded: &str,
) -> Result<String, ExpansionError> {
    if shell.options.noglob || !has_unprotected_glob(expanded) {
        return Ok(strip_sentinels(expanded));
    }
    let pattern = build_glob_pattern(expanded, shell.options.globstar);
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let matches: Vec<String> = match glob_with(&pattern, options) {
        Ok(paths) => paths
            .filter_map(Result::ok)
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        Err(_) => return Ok(strip_sentinels(expanded)),
    };
    match matches.len() {
        0 => Ok(strip_sentinels(expanded)),
        1 => Ok(matches.into_iter().next().unwrap()),
        _ => Err(ExpansionError::AmbiguousRedirect(strip_sentinels(expanded))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_pattern_escapes_protected() {
        let field = format!("a{}{}b", GLOB_SENTINEL, '*');
        let pattern = build_glob_pattern(&field, false);
        assert_eq!(pattern, format!("a{}b", Pattern::escape("*")));
    }

    #[test]
    fn test_double_star_collapses_without_globstar() {
        assert_eq!(build_glob_pattern("a/**/b", false), "a/*/b");
        assert_eq!(build_glob_pattern("a/**/b", true), "a/**/b");
    }
}
