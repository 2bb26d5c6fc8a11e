//! Expansion engine
//!
//! Transforms the raw argument words of a `SimpleCommand` (and redirect
//! targets, case words, patterns, heredoc bodies) into final fields. The
//! POSIX order is applied strictly:
//!
//! 1. brace expansion (already done at lex time)
//! 2. tilde expansion
//! 3. parameter/variable expansion
//! 4. command substitution
//! 5. arithmetic expansion
//! 6. word splitting (IFS)
//! 7. pathname expansion
//! 8. quote removal
//!
//! The scanner walks raw word text with quote tracking, producing
//! [`word_split::Seg`] fragments whose flags drive splitting and globbing.
//! Quoted text is protected from globbing with a sentinel byte stripped
//! after pathname expansion.

pub mod command_subst;
pub mod parameter;
pub mod pathname;
pub mod pattern;
pub mod quote;
pub mod tilde;
pub mod word_split;

use thiserror::Error;

use crate::parser::lexer::{QuoteType, TokenType};
use crate::shell::Shell;
use quote::{ansi_c_unescape, protect_char, protect_glob_chars, strip_sentinels};
use word_split::{split_fields, Piece, Seg};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpansionError {
    #[error("{0}: unbound variable")]
    UnsetVariable(String),
    #[error("{0}: bad substitution")]
    BadSubstitution(String),
    #[error("{0}")]
    Arithmetic(String),
    #[error("command substitution failed: {0}")]
    CommandSubstitutionFailed(String),
    #[error("{name}: {message}")]
    RequiredParam { name: String, message: String },
    #[error("{0}: ambiguous redirect")]
    AmbiguousRedirect(String),
    #[error("{0}: readonly variable")]
    Readonly(String),
    #[error("{0}")]
    Io(String),
}

impl From<crate::vars::VarError> for ExpansionError {
    fn from(e: crate::vars::VarError) -> Self {
        match e {
            crate::vars::VarError::Readonly(name) => ExpansionError::Readonly(name),
            other => ExpansionError::Io(other.to_string()),
        }
    }
}

/// Scanner context: what kind of text region is being expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Unquoted,
    DoubleQuoted,
    /// Heredoc bodies: `$`-expansions apply but quotes are literal and no
    /// field splitting or globbing follows.
    Heredoc,
}

// =============================================================================
// PUBLIC ENTRY POINTS
// =============================================================================

/// Expand the parallel argument sequences of a simple command into final
/// fields (the full pipeline: tilde through quote removal).
pub fn expand_args(
    shell: &mut Shell,
    args: &[String],
    kinds: &[TokenType],
    quotes: &[QuoteType],
) -> Result<Vec<String>, ExpansionError> {
    debug_assert_eq!(args.len(), kinds.len());
    debug_assert_eq!(args.len(), quotes.len());
    let mut fields = Vec::new();
    for i in 0..args.len() {
        fields.extend(expand_word(shell, &args[i], kinds[i], quotes[i])?);
    }
    Ok(fields)
}

/// Expand one argument word into zero or more fields.
pub fn expand_word(
    shell: &mut Shell,
    text: &str,
    kind: TokenType,
    quote: QuoteType,
) -> Result<Vec<String>, ExpansionError> {
    let segs = scan_arg(shell, text, kind, quote)?;
    let ifs = shell.ifs();
    let fields = split_fields(&segs, &ifs);
    let mut out = Vec::new();
    for field in fields {
        out.extend(pathname::expand_field(shell, &field));
    }
    Ok(out)
}

/// Expand a word to a single string: steps 2-5 plus quote removal, with no
/// word splitting or globbing. `"$@"`-style multi-field results join with a
/// space. Used for assignments, case words, `[[ ]]` operands and here-string
/// bodies.
pub fn expand_to_string(
    shell: &mut Shell,
    text: &str,
    kind: TokenType,
    quote: QuoteType,
) -> Result<String, ExpansionError> {
    let segs = scan_arg(shell, text, kind, quote)?;
    Ok(strip_sentinels(&join_segs(&segs)))
}

/// Like [`expand_to_string`] but keeping the glob sentinels, so quoted parts
/// stay literal during pattern matching (case patterns, `[[ == ]]`).
pub fn expand_to_pattern(
    shell: &mut Shell,
    text: &str,
    kind: TokenType,
    quote: QuoteType,
) -> Result<String, ExpansionError> {
    let segs = scan_arg(shell, text, kind, quote)?;
    Ok(join_segs(&segs))
}

/// Expand a heredoc body (unquoted delimiter): parameter, command and
/// arithmetic expansion only.
pub fn expand_heredoc_body(shell: &mut Shell, body: &str) -> Result<String, ExpansionError> {
    let segs = scan_text(shell, body, Mode::Heredoc, false)?;
    Ok(strip_sentinels(&join_segs(&segs)))
}

fn join_segs(segs: &[Seg]) -> String {
    let mut out = String::new();
    for seg in segs {
        match seg {
            Seg::Piece(p) => out.push_str(&p.text),
            Seg::Break => out.push(' '),
        }
    }
    out
}

// =============================================================================
// PER-TOKEN-KIND DISPATCH
// =============================================================================

pub(crate) fn scan_arg(
    shell: &mut Shell,
    text: &str,
    kind: TokenType,
    quote: QuoteType,
) -> Result<Vec<Seg>, ExpansionError> {
    match quote {
        QuoteType::Single => {
            return Ok(vec![Seg::Piece(Piece::quoted(protect_glob_chars(text)))])
        }
        QuoteType::AnsiC => {
            return Ok(vec![Seg::Piece(Piece::quoted(protect_glob_chars(
                &ansi_c_unescape(text),
            )))])
        }
        QuoteType::Double => {
            let segs = scan_text(shell, text, Mode::DoubleQuoted, false)?;
            if segs.is_empty() {
                // `""` (and `"$unset"`) anchor one empty field
                return Ok(vec![Seg::Piece(Piece::quoted(String::new()))]);
            }
            return Ok(segs);
        }
        QuoteType::None => {}
    }

    match kind {
        TokenType::Variable => expand_variable_segs(shell, text, false),
        TokenType::ParamExpansion => parameter::expand_param(shell, text, false),
        TokenType::CommandSub => {
            let output = command_subst::command_substitute(shell, text)?;
            Ok(vec![Seg::Piece(Piece::expansion(output))])
        }
        TokenType::ArithExpansion => {
            let value = shell
                .arith(text)
                .map_err(|e| ExpansionError::Arithmetic(e.to_string()))?;
            Ok(vec![Seg::Piece(Piece::expansion(value.to_string()))])
        }
        TokenType::ProcessSubIn => {
            let path = command_subst::process_substitute(shell, text, true)?;
            Ok(vec![Seg::Piece(Piece::literal(path))])
        }
        TokenType::ProcessSubOut => {
            let path = command_subst::process_substitute(shell, text, false)?;
            Ok(vec![Seg::Piece(Piece::literal(path))])
        }
        _ => scan_text(shell, text, Mode::Unquoted, true),
    }
}

// =============================================================================
// THE SCANNER
// =============================================================================

/// Scan raw word text, resolving `$`-constructs, quotes, backslashes and
/// process substitutions into split-ready segments.
pub(crate) fn scan_text(
    shell: &mut Shell,
    text: &str,
    mode: Mode,
    at_word_start: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    let chars: Vec<char> = text.chars().collect();
    let mut segs: Vec<Seg> = Vec::new();
    let mut buf = String::new();
    let mut buf_quoted = mode != Mode::Unquoted;
    let mut in_dq = mode == Mode::DoubleQuoted;
    let mut dq_marks: Vec<usize> = Vec::new();
    let mut i = 0;

    macro_rules! flush {
        () => {
            if !buf.is_empty() {
                let piece = if buf_quoted {
                    Piece::quoted(std::mem::take(&mut buf))
                } else {
                    // Unquoted text is subject to IFS splitting; escaped
                    // characters inside it carry the protecting sentinel.
                    Piece::expansion(std::mem::take(&mut buf))
                };
                segs.push(Seg::Piece(piece));
            }
        };
    }

    // Tilde expansion on the leading prefix of an unquoted word
    if at_word_start && mode == Mode::Unquoted && chars.first() == Some(&'~') {
        let mut end = 1;
        while end < chars.len() && chars[end] != '/' {
            let c = chars[end];
            if !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.') {
                break;
            }
            end += 1;
        }
        let stop_ok = end >= chars.len() || chars[end] == '/';
        if stop_ok {
            let prefix: String = chars[..end].iter().collect();
            let expanded = tilde::expand_tilde(shell, &prefix);
            if expanded != prefix {
                segs.push(Seg::Piece(Piece {
                    text: expanded,
                    splittable: false,
                    quoted: false,
                }));
                i = end;
            }
        }
    }

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' if !in_dq && mode == Mode::Unquoted => {
                flush!();
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                let inner: String = chars[start..i].iter().collect();
                segs.push(Seg::Piece(Piece::quoted(protect_glob_chars(&inner))));
                i += 1; // closing quote
            }
            '"' if mode != Mode::Heredoc => {
                flush!();
                if !in_dq {
                    in_dq = true;
                    buf_quoted = true;
                    // Track emptiness so "" anchors an empty field
                    dq_marks.push(segs.len());
                } else {
                    in_dq = false;
                    buf_quoted = false;
                    if let Some(mark) = dq_marks.pop() {
                        if segs.len() == mark {
                            segs.push(Seg::Piece(Piece::quoted(String::new())));
                        }
                    }
                }
                i += 1;
            }
            '\\' if mode == Mode::Unquoted && !in_dq => {
                if let Some(&next) = chars.get(i + 1) {
                    buf.push_str(&protect_char(next));
                    i += 2;
                } else {
                    buf.push('\\');
                    i += 1;
                }
            }
            '\\' if in_dq || mode == Mode::Heredoc => {
                match chars.get(i + 1) {
                    Some(&next) if matches!(next, '$' | '`' | '"' | '\\') => {
                        buf.push_str(&protect_char(next));
                        i += 2;
                    }
                    Some(&next) => {
                        buf.push('\\');
                        buf.push_str(&protect_char(next));
                        i += 2;
                    }
                    None => {
                        buf.push('\\');
                        i += 1;
                    }
                }
            }
            '$' => {
                // $'...' ANSI-C quoting (unquoted context only)
                if !in_dq && mode == Mode::Unquoted && chars.get(i + 1) == Some(&'\'') {
                    flush!();
                    i += 2;
                    let mut inner = String::new();
                    while i < chars.len() && chars[i] != '\'' {
                        if chars[i] == '\\' && i + 1 < chars.len() {
                            inner.push(chars[i]);
                            inner.push(chars[i + 1]);
                            i += 2;
                        } else {
                            inner.push(chars[i]);
                            i += 1;
                        }
                    }
                    i += 1;
                    segs.push(Seg::Piece(Piece::quoted(protect_glob_chars(
                        &ansi_c_unescape(&inner),
                    ))));
                    continue;
                }
                let (new_segs, consumed) =
                    scan_dollar(shell, &chars, i, in_dq || mode == Mode::Heredoc)?;
                if consumed == i {
                    // Lone dollar
                    buf.push('$');
                    i += 1;
                } else {
                    flush!();
                    segs.extend(new_segs);
                    i = consumed;
                }
            }
            '`' => {
                flush!();
                let (inner, end) = scan_backtick(&chars, i);
                let output = command_subst::command_substitute(shell, &inner)?;
                let piece = if in_dq || mode == Mode::Heredoc {
                    Piece::quoted(protect_glob_chars(&output))
                } else {
                    Piece::expansion(output)
                };
                segs.push(Seg::Piece(piece));
                i = end;
            }
            '<' | '>'
                if mode == Mode::Unquoted && !in_dq && chars.get(i + 1) == Some(&'(') =>
            {
                flush!();
                let Some(end) = find_closing_paren(&chars, i + 1) else {
                    buf.push(c);
                    i += 1;
                    continue;
                };
                let inner: String = chars[i + 2..end].iter().collect();
                let path = command_subst::process_substitute(shell, &inner, c == '<')?;
                segs.push(Seg::Piece(Piece::literal(path)));
                i = end + 1;
            }
            _ => {
                if in_dq || mode == Mode::Heredoc {
                    buf.push_str(&protect_char(c));
                } else {
                    buf.push(c);
                }
                i += 1;
            }
        }
    }
    flush!();
    Ok(segs)
}

/// Resolve a `$`-construct starting at `chars[start] == '$'`. Returns the
/// produced segments and the index after the construct; returns
/// `(vec![], start)` when the dollar is literal.
fn scan_dollar(
    shell: &mut Shell,
    chars: &[char],
    start: usize,
    quoted: bool,
) -> Result<(Vec<Seg>, usize), ExpansionError> {
    let next = chars.get(start + 1).copied();
    match next {
        Some('{') => {
            let Some(end) = find_closing_brace(chars, start + 1) else {
                return Ok((vec![], start));
            };
            let inner: String = chars[start + 2..end].iter().collect();
            let segs = parameter::expand_param(shell, &inner, quoted)?;
            Ok((segs, end + 1))
        }
        Some('(') => {
            if chars.get(start + 2) == Some(&'(') {
                // $(( ... )): but fall back to command substitution when no
                // matching )) exists
                if let Some(end) = find_closing_double_paren(chars, start + 3) {
                    let inner: String = chars[start + 3..end].iter().collect();
                    let value = shell
                        .arith(&inner)
                        .map_err(|e| ExpansionError::Arithmetic(e.to_string()))?;
                    let piece = if quoted {
                        Piece::quoted(value.to_string())
                    } else {
                        Piece::expansion(value.to_string())
                    };
                    return Ok((vec![Seg::Piece(piece)], end + 2));
                }
            }
            let Some(end) = find_closing_paren(chars, start + 1) else {
                return Ok((vec![], start));
            };
            let inner: String = chars[start + 2..end].iter().collect();
            let output = command_subst::command_substitute(shell, &inner)?;
            let piece = if quoted {
                Piece::quoted(protect_glob_chars(&output))
            } else {
                Piece::expansion(output)
            };
            Ok((vec![Seg::Piece(piece)], end + 1))
        }
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            let mut end = start + 1;
            while end < chars.len()
                && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
            {
                end += 1;
            }
            let name: String = chars[start + 1..end].iter().collect();
            let segs = expand_variable_segs(shell, &name, quoted)?;
            Ok((segs, end))
        }
        Some(c) if c.is_ascii_digit() || matches!(c, '#' | '?' | '$' | '!' | '@' | '*' | '-') => {
            let segs = expand_variable_segs(shell, &c.to_string(), quoted)?;
            Ok((segs, start + 2))
        }
        _ => Ok((vec![], start)),
    }
}

/// Expand `$NAME` / `$?` / `$@` into segments.
pub(crate) fn expand_variable_segs(
    shell: &mut Shell,
    name: &str,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    match name {
        "@" | "*" => {
            let params: Vec<String> = shell.vars.positional().to_vec();
            Ok(positional_like_segs(shell, &params, name, quoted))
        }
        _ => match shell.vars.get(name) {
            Some(value) => {
                let piece = if quoted {
                    Piece::quoted(protect_glob_chars(&value))
                } else {
                    Piece::expansion(value)
                };
                Ok(vec![Seg::Piece(piece)])
            }
            None => {
                if shell.options.nounset {
                    Err(ExpansionError::UnsetVariable(name.to_string()))
                } else {
                    Ok(vec![])
                }
            }
        },
    }
}

/// Segments for `$@`/`$*` (and array `[@]`/`[*]`) given the element list.
pub(crate) fn positional_like_segs(
    shell: &Shell,
    elements: &[String],
    which: &str,
    quoted: bool,
) -> Vec<Seg> {
    if elements.is_empty() {
        // A placeholder that yields no field but suppresses the
        // empty-string anchor of surrounding double quotes: `"$@"` with no
        // positional parameters expands to zero fields, not one empty one.
        return vec![Seg::Piece(Piece::literal(String::new()))];
    }
    if quoted && which.ends_with('*') {
        // "$*": one field joined with the first IFS character
        let sep = shell.ifs().chars().next().map(String::from).unwrap_or_default();
        let joined = elements.join(&sep);
        return vec![Seg::Piece(Piece::quoted(protect_glob_chars(&joined)))];
    }
    let mut segs = Vec::new();
    for (i, element) in elements.iter().enumerate() {
        if i > 0 {
            segs.push(Seg::Break);
        }
        let piece = if quoted {
            Piece::quoted(protect_glob_chars(element))
        } else {
            Piece::expansion(element.clone())
        };
        segs.push(Seg::Piece(piece));
    }
    segs
}

// =============================================================================
// BALANCED-CONSTRUCT SCANNING
// =============================================================================

/// `chars[open] == '('`; find the matching `)`, quote-aware.
pub(crate) fn find_closing_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// After `$((`, find the index of the first `)` of the closing `))`.
fn find_closing_double_paren(chars: &[char], from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    if chars.get(i + 1) == Some(&')') {
                        return Some(i);
                    }
                    return None;
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// `chars[open] == '{'` (of `${`); find the matching `}`.
pub(crate) fn find_closing_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Scan a backtick substitution starting at `chars[start] == '`'`; returns
/// the unescaped inner command and the index after the closing backtick.
fn scan_backtick(chars: &[char], start: usize) -> (String, usize) {
    let mut inner = String::new();
    let mut i = start + 1;
    while i < chars.len() && chars[i] != '`' {
        if chars[i] == '\\' && matches!(chars.get(i + 1), Some('`' | '\\' | '$')) {
            inner.push(chars[i + 1]);
            i += 2;
        } else {
            inner.push(chars[i]);
            i += 1;
        }
    }
    (inner, (i + 1).min(chars.len()))
}
