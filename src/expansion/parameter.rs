//! Parameter expansion
//!
//! The full `${...}` operator set: defaults, assignment, error-if-unset,
//! alternatives, length, prefix/suffix removal, replacement, case
//! modification, substrings, indirection, name listing, and the array forms.
//!
//! ANSI-C `$'...'` quoting is not recognized inside patterns here; it is a
//! word-level construct only.

use crate::expansion::pattern::{pattern_matches, remove_pattern, replace_pattern};
use crate::expansion::quote::{protect_glob_chars, strip_sentinels};
use crate::expansion::word_split::{Piece, Seg};
use crate::expansion::{positional_like_segs, scan_text, ExpansionError, Mode};
use crate::shell::Shell;
use crate::vars::{Value, VarAttrs};

/// Resolved value of a parameter before operators apply.
#[derive(Debug, Clone)]
enum ParamValue {
    Unset,
    Scalar(String),
    /// Multiple elements; `star` selects `$*`-style joining when quoted.
    Fields(Vec<String>, bool),
}

impl ParamValue {
    fn is_unset(&self) -> bool {
        matches!(self, ParamValue::Unset)
    }

    fn is_empty(&self) -> bool {
        match self {
            ParamValue::Unset => true,
            ParamValue::Scalar(s) => s.is_empty(),
            ParamValue::Fields(f, _) => f.is_empty(),
        }
    }
}

/// Expand the inner text of `${...}` into segments.
pub fn expand_param(
    shell: &mut Shell,
    inner: &str,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    if inner.is_empty() {
        return Err(ExpansionError::BadSubstitution(format!("${{{inner}}}")));
    }

    // ${#...}: length forms (but ${#} alone is $#)
    if let Some(operand) = inner.strip_prefix('#') {
        if !operand.is_empty() && !matches!(operand, "-" | "?" | "!" | "$") {
            return expand_length(shell, operand, quoted);
        }
    }

    // ${!...}: indirection, name listing, array keys
    if let Some(operand) = inner.strip_prefix('!') {
        if !operand.is_empty() {
            return expand_indirect(shell, operand, quoted);
        }
    }

    let (name, subscript, rest) = parse_param_name(inner)
        .ok_or_else(|| ExpansionError::BadSubstitution(format!("${{{inner}}}")))?;

    let value = get_param_value(shell, &name, subscript.as_deref())?;

    if rest.is_empty() {
        return plain_value_segs(shell, &name, value, quoted);
    }

    apply_operator(shell, &name, value, &rest, quoted)
}

// =============================================================================
// NAME PARSING
// =============================================================================

/// Split `NAME`, `NAME[sub]`, or a special parameter off the front of the
/// inner text. Returns (name, subscript, rest).
fn parse_param_name(inner: &str) -> Option<(String, Option<String>, String)> {
    let chars: Vec<char> = inner.chars().collect();
    let mut i = 0;

    let name: String = if chars[0].is_ascii_digit() {
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        chars[..i].iter().collect()
    } else if matches!(chars[0], '@' | '*' | '#' | '?' | '$' | '!' | '-') {
        i = 1;
        chars[0].to_string()
    } else if chars[0].is_ascii_alphabetic() || chars[0] == '_' {
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        chars[..i].iter().collect()
    } else {
        return None;
    };

    let mut subscript = None;
    if chars.get(i) == Some(&'[') {
        let mut depth = 0usize;
        let start = i + 1;
        let mut j = i;
        loop {
            match chars.get(j) {
                Some('[') => depth += 1,
                Some(']') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                Some(_) => {}
                None => return None,
            }
            j += 1;
        }
        subscript = Some(chars[start..j].iter().collect());
        i = j + 1;
    }

    let rest: String = chars[i..].iter().collect();
    Some((name, subscript, rest))
}

// =============================================================================
// VALUE RETRIEVAL
// =============================================================================

fn get_param_value(
    shell: &mut Shell,
    name: &str,
    subscript: Option<&str>,
) -> Result<ParamValue, ExpansionError> {
    match subscript {
        None => {
            if matches!(name, "@" | "*") {
                let params = shell.vars.positional().to_vec();
                if params.is_empty() {
                    return Ok(ParamValue::Unset);
                }
                return Ok(ParamValue::Fields(params, name == "*"));
            }
            match shell.vars.get(name) {
                Some(v) => Ok(ParamValue::Scalar(v)),
                None => Ok(ParamValue::Unset),
            }
        }
        Some(sub) if sub == "@" || sub == "*" => {
            match shell.vars.get_var(name) {
                Some(var) => Ok(ParamValue::Fields(var.value.elements(), sub == "*")),
                None => Ok(ParamValue::Unset),
            }
        }
        Some(sub) => {
            let is_assoc = shell
                .vars
                .get_var(name)
                .is_some_and(|v| v.attrs.contains(VarAttrs::ASSOC));
            if is_assoc {
                let key = expand_subscript_key(shell, sub)?;
                match shell.vars.get_var(name).map(|v| &v.value) {
                    Some(Value::Assoc(map)) => match map.get(&key) {
                        Some(v) => Ok(ParamValue::Scalar(v.clone())),
                        None => Ok(ParamValue::Unset),
                    },
                    _ => Ok(ParamValue::Unset),
                }
            } else {
                let mut index = shell
                    .arith(sub)
                    .map_err(|e| ExpansionError::Arithmetic(e.to_string()))?;
                match shell.vars.get_var(name).map(|v| &v.value) {
                    Some(Value::Indexed(map)) => {
                        if index < 0 {
                            let max = map.keys().max().copied().unwrap_or(-1);
                            index += max + 1;
                        }
                        match map.get(&index) {
                            Some(v) => Ok(ParamValue::Scalar(v.clone())),
                            None => Ok(ParamValue::Unset),
                        }
                    }
                    Some(Value::Str(s)) => {
                        if index == 0 {
                            Ok(ParamValue::Scalar(s.clone()))
                        } else {
                            Ok(ParamValue::Unset)
                        }
                    }
                    Some(Value::Assoc(map)) => match map.get(&index.to_string()) {
                        Some(v) => Ok(ParamValue::Scalar(v.clone())),
                        None => Ok(ParamValue::Unset),
                    },
                    None => Ok(ParamValue::Unset),
                }
            }
        }
    }
}

fn expand_subscript_key(shell: &mut Shell, sub: &str) -> Result<String, ExpansionError> {
    let segs = scan_text(shell, sub, Mode::Unquoted, false)?;
    let mut out = String::new();
    for seg in segs {
        if let Seg::Piece(p) = seg {
            out.push_str(&strip_sentinels(&p.text));
        }
    }
    Ok(out)
}

fn plain_value_segs(
    shell: &mut Shell,
    name: &str,
    value: ParamValue,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    match value {
        ParamValue::Unset => {
            if shell.options.nounset && !matches!(name, "@" | "*") {
                Err(ExpansionError::UnsetVariable(name.to_string()))
            } else {
                Ok(vec![])
            }
        }
        ParamValue::Scalar(s) => Ok(vec![scalar_piece(s, quoted)]),
        ParamValue::Fields(fields, star) => Ok(positional_like_segs(
            shell,
            &fields,
            if star { "*" } else { "@" },
            quoted,
        )),
    }
}

fn scalar_piece(value: String, quoted: bool) -> Seg {
    if quoted {
        Seg::Piece(Piece::quoted(protect_glob_chars(&value)))
    } else {
        Seg::Piece(Piece::expansion(value))
    }
}

fn value_to_fields(value: &ParamValue) -> Vec<String> {
    match value {
        ParamValue::Unset => vec![],
        ParamValue::Scalar(s) => vec![s.clone()],
        ParamValue::Fields(f, _) => f.clone(),
    }
}

// =============================================================================
// OPERATORS
// =============================================================================

fn apply_operator(
    shell: &mut Shell,
    name: &str,
    value: ParamValue,
    rest: &str,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    let word_mode = if quoted {
        Mode::DoubleQuoted
    } else {
        Mode::Unquoted
    };

    // Default-class operators, with and without the empty-check colon
    let (op, check_empty, word) = if let Some(w) = rest.strip_prefix(":-") {
        ('-', true, w)
    } else if let Some(w) = rest.strip_prefix(":=") {
        ('=', true, w)
    } else if let Some(w) = rest.strip_prefix(":+") {
        ('+', true, w)
    } else if let Some(w) = rest.strip_prefix(":?") {
        ('?', true, w)
    } else if let Some(w) = rest.strip_prefix('-') {
        ('-', false, w)
    } else if let Some(w) = rest.strip_prefix('+') {
        ('+', false, w)
    } else if let Some(w) = rest.strip_prefix('=') {
        ('=', false, w)
    } else if let Some(w) = rest.strip_prefix('?') {
        ('?', false, w)
    } else if let Some(w) = rest.strip_prefix("##") {
        return pattern_removal(shell, value, w, true, true, quoted);
    } else if let Some(w) = rest.strip_prefix('#') {
        return pattern_removal(shell, value, w, true, false, quoted);
    } else if let Some(w) = rest.strip_prefix("%%") {
        return pattern_removal(shell, value, w, false, true, quoted);
    } else if let Some(w) = rest.strip_prefix('%') {
        return pattern_removal(shell, value, w, false, false, quoted);
    } else if let Some(w) = rest.strip_prefix('/') {
        return pattern_replacement(shell, value, w, quoted);
    } else if let Some(w) = rest.strip_prefix("^^") {
        return case_modification(shell, value, w, true, true, quoted);
    } else if let Some(w) = rest.strip_prefix('^') {
        return case_modification(shell, value, w, true, false, quoted);
    } else if let Some(w) = rest.strip_prefix(",,") {
        return case_modification(shell, value, w, false, true, quoted);
    } else if let Some(w) = rest.strip_prefix(',') {
        return case_modification(shell, value, w, false, false, quoted);
    } else if let Some(w) = rest.strip_prefix(':') {
        return substring(shell, name, value, w, quoted);
    } else {
        return Err(ExpansionError::BadSubstitution(format!(
            "${{{name}{rest}}}"
        )));
    };

    let needs_word = value.is_unset() || (check_empty && value.is_empty());
    match op {
        '-' => {
            if needs_word {
                scan_text(shell, word, word_mode, false)
            } else {
                plain_value_segs(shell, name, value, quoted)
            }
        }
        '+' => {
            if needs_word {
                Ok(vec![])
            } else {
                scan_text(shell, word, word_mode, false)
            }
        }
        '=' => {
            if needs_word {
                let segs = scan_text(shell, word, Mode::Unquoted, false)?;
                let mut assigned = String::new();
                for seg in segs {
                    if let Seg::Piece(p) = seg {
                        assigned.push_str(&strip_sentinels(&p.text));
                    }
                }
                shell.vars.set_scalar(name, assigned.clone())?;
                Ok(vec![scalar_piece(assigned, quoted)])
            } else {
                plain_value_segs(shell, name, value, quoted)
            }
        }
        '?' => {
            if needs_word {
                let message = if word.is_empty() {
                    "parameter null or not set".to_string()
                } else {
                    let segs = scan_text(shell, word, Mode::Unquoted, false)?;
                    let mut m = String::new();
                    for seg in segs {
                        if let Seg::Piece(p) = seg {
                            m.push_str(&strip_sentinels(&p.text));
                        }
                    }
                    m
                };
                Err(ExpansionError::RequiredParam {
                    name: name.to_string(),
                    message,
                })
            } else {
                plain_value_segs(shell, name, value, quoted)
            }
        }
        _ => unreachable!(),
    }
}

fn expand_word_to_pattern(shell: &mut Shell, word: &str) -> Result<String, ExpansionError> {
    let segs = scan_text(shell, word, Mode::Unquoted, false)?;
    let mut out = String::new();
    for seg in segs {
        if let Seg::Piece(p) = seg {
            out.push_str(&p.text);
        }
    }
    Ok(out)
}

fn expand_word_to_string(shell: &mut Shell, word: &str) -> Result<String, ExpansionError> {
    Ok(strip_sentinels(&expand_word_to_pattern(shell, word)?))
}

fn pattern_removal(
    shell: &mut Shell,
    value: ParamValue,
    word: &str,
    prefix: bool,
    greedy: bool,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    let pattern = expand_word_to_pattern(shell, word)?;
    let fields: Vec<String> = value_to_fields(&value)
        .iter()
        .map(|v| remove_pattern(v, &pattern, prefix, greedy))
        .collect();
    fields_result(shell, value, fields, quoted)
}

fn pattern_replacement(
    shell: &mut Shell,
    value: ParamValue,
    rest: &str,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    let (all, anchor, rest) = if let Some(r) = rest.strip_prefix('/') {
        (true, None, r)
    } else if let Some(r) = rest.strip_prefix('#') {
        (false, Some('#'), r)
    } else if let Some(r) = rest.strip_prefix('%') {
        (false, Some('%'), r)
    } else {
        (false, None, rest)
    };

    // Split pattern/replacement at the first unescaped `/`
    let chars: Vec<char> = rest.chars().collect();
    let mut split = None;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '/' => {
                split = Some(i);
                break;
            }
            _ => i += 1,
        }
    }
    let (pattern_text, replacement_text) = match split {
        Some(at) => (
            chars[..at].iter().collect::<String>(),
            chars[at + 1..].iter().collect::<String>(),
        ),
        None => (rest.to_string(), String::new()),
    };

    let pattern = expand_word_to_pattern(shell, &pattern_text)?;
    let replacement = expand_word_to_string(shell, &replacement_text)?;
    let fields: Vec<String> = value_to_fields(&value)
        .iter()
        .map(|v| replace_pattern(v, &pattern, &replacement, all, anchor))
        .collect();
    fields_result(shell, value, fields, quoted)
}

fn case_modification(
    shell: &mut Shell,
    value: ParamValue,
    word: &str,
    upper: bool,
    all: bool,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    let pattern = if word.is_empty() {
        "?".to_string()
    } else {
        expand_word_to_pattern(shell, word)?
    };
    let transform = |v: &String| -> String {
        let mut out = String::with_capacity(v.len());
        let mut done_first = false;
        for c in v.chars() {
            let apply = (all || !done_first) && pattern_matches(&pattern, &c.to_string());
            if !done_first {
                done_first = true;
            }
            if apply {
                if upper {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
            } else {
                out.push(c);
            }
        }
        out
    };
    let fields: Vec<String> = value_to_fields(&value).iter().map(transform).collect();
    fields_result(shell, value, fields, quoted)
}

fn substring(
    shell: &mut Shell,
    name: &str,
    value: ParamValue,
    spec: &str,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    // Split offset:length at the first top-level colon
    let chars: Vec<char> = spec.chars().collect();
    let mut depth = 0i32;
    let mut split = None;
    for (i, c) in chars.iter().enumerate() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ':' if depth == 0 => {
                split = Some(i);
                break;
            }
            _ => {}
        }
    }
    let (offset_text, length_text) = match split {
        Some(at) => (
            chars[..at].iter().collect::<String>(),
            Some(chars[at + 1..].iter().collect::<String>()),
        ),
        None => (spec.to_string(), None),
    };

    let offset = shell
        .arith(&offset_text)
        .map_err(|e| ExpansionError::Arithmetic(e.to_string()))?;
    let length = match &length_text {
        Some(t) => Some(
            shell
                .arith(t)
                .map_err(|e| ExpansionError::Arithmetic(e.to_string()))?,
        ),
        None => None,
    };

    match &value {
        ParamValue::Fields(fields, star) => {
            // Slice fields; for $@/$* offset 0 starts at $0
            let mut list: Vec<String> = Vec::new();
            if matches!(name, "@" | "*") {
                list.push(shell.vars.script_name.clone());
            }
            list.extend(fields.iter().cloned());
            let len = list.len() as i64;
            let mut start = offset;
            if start < 0 {
                start += len;
            }
            let start = start.clamp(0, len) as usize;
            let end = match length {
                Some(l) if l >= 0 => (start + l as usize).min(len as usize),
                Some(l) => ((len + l).max(start as i64)) as usize,
                None => len as usize,
            };
            let sliced: Vec<String> = list[start..end.max(start)].to_vec();
            Ok(positional_like_segs(
                shell,
                &sliced,
                if *star { "*" } else { "@" },
                quoted,
            ))
        }
        _ => {
            let text = match &value {
                ParamValue::Scalar(s) => s.clone(),
                _ => String::new(),
            };
            let chars: Vec<char> = text.chars().collect();
            let len = chars.len() as i64;
            let mut start = offset;
            if start < 0 {
                start += len;
            }
            let start = start.clamp(0, len) as usize;
            let end = match length {
                Some(l) if l >= 0 => (start + l as usize).min(len as usize),
                Some(l) => ((len + l).max(start as i64)) as usize,
                None => len as usize,
            };
            let out: String = chars[start..end.max(start)].iter().collect();
            Ok(vec![scalar_piece(out, quoted)])
        }
    }
}

fn fields_result(
    shell: &mut Shell,
    original: ParamValue,
    fields: Vec<String>,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    match original {
        ParamValue::Fields(_, star) => Ok(positional_like_segs(
            shell,
            &fields,
            if star { "*" } else { "@" },
            quoted,
        )),
        _ => Ok(vec![scalar_piece(
            fields.into_iter().next().unwrap_or_default(),
            quoted,
        )]),
    }
}

// =============================================================================
// LENGTH AND INDIRECTION
// =============================================================================

fn expand_length(
    shell: &mut Shell,
    operand: &str,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    let count = match operand {
        "@" | "*" => shell.vars.positional().len(),
        _ => {
            let (name, subscript, rest) = parse_param_name(operand)
                .ok_or_else(|| ExpansionError::BadSubstitution(format!("${{#{operand}}}")))?;
            if !rest.is_empty() {
                return Err(ExpansionError::BadSubstitution(format!("${{#{operand}}}")));
            }
            match subscript.as_deref() {
                Some("@") | Some("*") => shell
                    .vars
                    .get_var(&name)
                    .map(|v| v.value.element_count())
                    .unwrap_or(0),
                _ => {
                    let value = get_param_value(shell, &name, subscript.as_deref())?;
                    match value {
                        ParamValue::Scalar(s) => s.chars().count(),
                        ParamValue::Fields(f, _) => f.len(),
                        ParamValue::Unset => {
                            if shell.options.nounset {
                                return Err(ExpansionError::UnsetVariable(name));
                            }
                            0
                        }
                    }
                }
            }
        }
    };
    Ok(vec![scalar_piece(count.to_string(), quoted)])
}

fn expand_indirect(
    shell: &mut Shell,
    operand: &str,
    quoted: bool,
) -> Result<Vec<Seg>, ExpansionError> {
    // ${!arr[@]} / ${!arr[*]}: array keys
    if let Some((name, Some(sub), rest)) = parse_param_name(operand) {
        if (sub == "@" || sub == "*") && rest.is_empty() {
            let keys = shell
                .vars
                .get_var(&name)
                .map(|v| v.value.keys())
                .unwrap_or_default();
            return Ok(positional_like_segs(
                shell,
                &keys,
                if sub == "*" { "*" } else { "@" },
                quoted,
            ));
        }
    }

    // ${!prefix*} / ${!prefix@}: names matching prefix, sorted
    if let Some(prefix) = operand
        .strip_suffix('*')
        .or_else(|| operand.strip_suffix('@'))
    {
        if !prefix.is_empty() && !prefix.contains('[') {
            let star = operand.ends_with('*');
            let names = shell.vars.names_with_prefix(prefix);
            return Ok(positional_like_segs(
                shell,
                &names,
                if star { "*" } else { "@" },
                quoted,
            ));
        }
    }

    // ${!VAR}: indirect reference
    let (name, subscript, rest) = parse_param_name(operand)
        .ok_or_else(|| ExpansionError::BadSubstitution(format!("${{!{operand}}}")))?;
    if !rest.is_empty() {
        return Err(ExpansionError::BadSubstitution(format!("${{!{operand}}}")));
    }
    let target = match get_param_value(shell, &name, subscript.as_deref())? {
        ParamValue::Scalar(s) => s,
        _ => String::new(),
    };
    if target.is_empty() {
        if shell.options.nounset {
            return Err(ExpansionError::UnsetVariable(operand.to_string()));
        }
        return Ok(vec![]);
    }
    let (tname, tsub, trest) = parse_param_name(&target)
        .ok_or_else(|| ExpansionError::BadSubstitution(format!("${{!{operand}}}")))?;
    if !trest.is_empty() {
        return Err(ExpansionError::BadSubstitution(target));
    }
    let value = get_param_value(shell, &tname, tsub.as_deref())?;
    plain_value_segs(shell, &tname, value, quoted)
}
