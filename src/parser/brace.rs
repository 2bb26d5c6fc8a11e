//! Brace expansion preprocessing
//!
//! Brace expansion runs over the literal input text before tokenization,
//! producing a flat string in which `{a,b,c}` and `{1..5}` have been
//! expanded. Invalid patterns (`{}`, `{a}`, ranges with incompatible
//! endpoints) are preserved literally. Quoted text, `$`-expansions and
//! here-document bodies are never touched.

/// Expand brace patterns in a full input string.
pub fn preprocess_braces(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    // Heredoc delimiters whose bodies must be copied verbatim after the
    // next newline.
    let mut pending_heredocs: Vec<String> = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' if !pending_heredocs.is_empty() => {
                out.push('\n');
                i += 1;
                for delim in std::mem::take(&mut pending_heredocs) {
                    // Copy body lines verbatim up to (and including) the
                    // delimiter line.
                    loop {
                        let line_start = i;
                        while i < chars.len() && chars[i] != '\n' {
                            i += 1;
                        }
                        let line: String = chars[line_start..i].iter().collect();
                        out.push_str(&line);
                        if i < chars.len() {
                            out.push('\n');
                            i += 1;
                        }
                        let stripped = line.trim_start_matches('\t');
                        if line == delim || stripped == delim || line_start >= chars.len() {
                            break;
                        }
                        if i >= chars.len() {
                            break;
                        }
                    }
                }
            }
            '<' if chars.get(i + 1) == Some(&'<') && chars.get(i + 2) != Some(&'<') => {
                out.push('<');
                out.push('<');
                i += 2;
                if chars.get(i) == Some(&'-') {
                    out.push('-');
                    i += 1;
                }
                // Record the (unquoted) delimiter
                let mut j = i;
                while matches!(chars.get(j), Some(' ' | '\t')) {
                    j += 1;
                }
                let mut delim = String::new();
                while let Some(&c2) = chars.get(j) {
                    match c2 {
                        '\'' | '"' => {
                            let q = c2;
                            j += 1;
                            while let Some(&c3) = chars.get(j) {
                                if c3 == q {
                                    break;
                                }
                                delim.push(c3);
                                j += 1;
                            }
                            j += 1;
                        }
                        '\\' => {
                            j += 1;
                            if let Some(&c3) = chars.get(j) {
                                delim.push(c3);
                                j += 1;
                            }
                        }
                        ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>' => break,
                        c3 => {
                            delim.push(c3);
                            j += 1;
                        }
                    }
                }
                if !delim.is_empty() {
                    pending_heredocs.push(delim);
                }
            }
            '#' if at_comment_start(&chars, i) => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(chars[i]);
                    i += 1;
                }
            }
            ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>' => {
                out.push(c);
                i += 1;
            }
            _ => {
                // A word chunk: consume up to the next unquoted separator,
                // then expand braces within it.
                let start = i;
                i = scan_word_chunk(&chars, i);
                let word: String = chars[start..i].iter().collect();
                if word.contains('{') {
                    let expanded = expand_word(&word);
                    out.push_str(&expanded.join(" "));
                } else {
                    out.push_str(&word);
                }
            }
        }
    }
    out
}

fn at_comment_start(chars: &[char], i: usize) -> bool {
    i == 0
        || matches!(
            chars.get(i - 1),
            Some(' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')')
        )
}

/// Advance past one word chunk, honoring quotes and `$`-constructs.
fn scan_word_chunk(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>' => break,
            '\\' => i = (i + 2).min(chars.len()),
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                i += 1;
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            '`' => {
                i += 1;
                while i < chars.len() && chars[i] != '`' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            '$' if matches!(chars.get(i + 1), Some('(' | '{')) => {
                let open = chars[i + 1];
                let close = if open == '(' { ')' } else { '}' };
                i += 2;
                let mut depth = 1;
                while i < chars.len() && depth > 0 {
                    match chars[i] {
                        c if c == open => depth += 1,
                        c if c == close => depth -= 1,
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
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    i
}

/// Expand all brace patterns within a single word, producing the resulting
/// word list. A word without a valid pattern expands to itself.
pub fn expand_word(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let Some(found) = find_brace_expr(&chars, 0) else {
        return vec![word.to_string()];
    };

    let prefix: String = chars[..found.open].iter().collect();
    let suffix: String = chars[found.close + 1..].iter().collect();
    let mut out = Vec::new();
    for item in found.items {
        for rest in expand_word(&format!("{item}{suffix}")) {
            out.push(format!("{prefix}{rest}"));
        }
    }
    out
}

struct BraceExpr {
    open: usize,
    close: usize,
    items: Vec<String>,
}

/// Locate the first valid brace expression at or after `from`.
fn find_brace_expr(chars: &[char], from: usize) -> Option<BraceExpr> {
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                i += 1;
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            '$' if matches!(chars.get(i + 1), Some('{' | '(')) => {
                // Skip the whole $-construct
                let open = chars[i + 1];
                let close = if open == '{' { '}' } else { ')' };
                i += 2;
                let mut depth = 1;
                while i < chars.len() && depth > 0 {
                    if chars[i] == open {
                        depth += 1;
                    } else if chars[i] == close {
                        depth -= 1;
                    }
                    i += 1;
                }
            }
            '{' => {
                if let Some(expr) = parse_brace_at(chars, i) {
                    return Some(expr);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Try to parse a valid brace expression whose `{` is at index `open`.
fn parse_brace_at(chars: &[char], open: usize) -> Option<BraceExpr> {
    let mut i = open + 1;
    let mut depth = 0usize;
    let mut items: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut commas = 0usize;

    let close = loop {
        let &c = chars.get(i)?;
        match c {
            '\\' => {
                current.push(c);
                if let Some(&c2) = chars.get(i + 1) {
                    current.push(c2);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let q = c;
                current.push(c);
                i += 1;
                while let Some(&c2) = chars.get(i) {
                    current.push(c2);
                    if c2 == q {
                        break;
                    }
                    i += 1;
                }
            }
            '$' if matches!(chars.get(i + 1), Some('{')) => {
                current.push('$');
                current.push('{');
                i += 2;
                let mut d = 1;
                while let Some(&c2) = chars.get(i) {
                    current.push(c2);
                    if c2 == '{' {
                        d += 1;
                    } else if c2 == '}' {
                        d -= 1;
                        if d == 0 {
                            break;
                        }
                    }
                    i += 1;
                }
            }
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                if depth == 0 {
                    break i;
                }
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                commas += 1;
                items.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
        i += 1;
    };
    items.push(current);

    if commas > 0 {
        return Some(BraceExpr {
            open,
            close,
            items,
        });
    }

    // No commas: a sequence expression {x..y} or {x..y..step}
    let inner = &items[0];
    let seq = expand_sequence(inner)?;
    Some(BraceExpr {
        open,
        close,
        items: seq,
    })
}

/// Expand `{x..y[..step]}` sequences. Returns None for invalid forms, which
/// are then preserved literally.
fn expand_sequence(inner: &str) -> Option<Vec<String>> {
    let parts: Vec<&str> = inner.split("..").collect();
    if parts.len() != 2 && parts.len() != 3 {
        return None;
    }
    let step: i64 = match parts.get(2) {
        Some(s) => s.parse().ok()?,
        None => 1,
    };
    if step == 0 {
        return None;
    }

    // Numeric range
    if let (Ok(start), Ok(end)) = (parts[0].parse::<i64>(), parts[1].parse::<i64>()) {
        let width = if has_leading_zeros(parts[0]) || has_leading_zeros(parts[1]) {
            parts[0]
                .trim_start_matches('-')
                .len()
                .max(parts[1].trim_start_matches('-').len())
        } else {
            0
        };
        let step = step.abs();
        let mut out = Vec::new();
        if start <= end {
            let mut v = start;
            while v <= end {
                out.push(pad_number(v, width));
                v += step;
            }
        } else {
            let mut v = start;
            while v >= end {
                out.push(pad_number(v, width));
                v -= step;
            }
        }
        return Some(out);
    }

    // Character range
    let (s, e) = (single_char(parts[0])?, single_char(parts[1])?);
    if !s.is_ascii_alphabetic() || !e.is_ascii_alphabetic() {
        return None;
    }
    let step = step.unsigned_abs() as u32;
    let (a, b) = (s as u32, e as u32);
    let mut out = Vec::new();
    if a <= b {
        let mut v = a;
        while v <= b {
            out.push(char::from_u32(v)?.to_string());
            v += step.max(1);
        }
    } else {
        let mut v = a;
        while v >= b {
            out.push(char::from_u32(v)?.to_string());
            if v < step.max(1) {
                break;
            }
            v -= step.max(1);
        }
    }
    Some(out)
}

fn has_leading_zeros(s: &str) -> bool {
    let t = s.trim_start_matches('-');
    t.len() > 1 && t.starts_with('0')
}

fn pad_number(v: i64, width: usize) -> String {
    if width == 0 {
        v.to_string()
    } else if v < 0 {
        format!("-{:0width$}", -v, width = width)
    } else {
        format!("{v:0width$}")
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut it = s.chars();
    let c = it.next()?;
    if it.next().is_some() {
        return None;
    }
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_list() {
        assert_eq!(expand_word("{a,b,c}"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_prefix_suffix() {
        assert_eq!(expand_word("x{a,b}y"), vec!["xay", "xby"]);
    }

    #[test]
    fn test_nested() {
        assert_eq!(expand_word("{a,{b,c}}"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_numeric_range() {
        assert_eq!(expand_word("{1..5}"), vec!["1", "2", "3", "4", "5"]);
        assert_eq!(expand_word("{5..1}"), vec!["5", "4", "3", "2", "1"]);
    }

    #[test]
    fn test_numeric_range_step() {
        assert_eq!(expand_word("{1..10..3}"), vec!["1", "4", "7", "10"]);
    }

    #[test]
    fn test_zero_padded_range() {
        assert_eq!(expand_word("{01..03}"), vec!["01", "02", "03"]);
    }

    #[test]
    fn test_char_range() {
        assert_eq!(expand_word("{a..e}"), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_invalid_patterns_literal() {
        assert_eq!(expand_word("{}"), vec!["{}"]);
        assert_eq!(expand_word("{a}"), vec!["{a}"]);
        assert_eq!(expand_word("{a..1}"), vec!["{a..1}"]);
    }

    #[test]
    fn test_empty_alternative() {
        assert_eq!(expand_word("a{,b}"), vec!["a", "ab"]);
    }

    #[test]
    fn test_quoted_braces_untouched() {
        assert_eq!(preprocess_braces("echo '{a,b}'"), "echo '{a,b}'");
        assert_eq!(preprocess_braces("echo \"{a,b}\""), "echo \"{a,b}\"");
    }

    #[test]
    fn test_param_expansion_untouched() {
        assert_eq!(preprocess_braces("echo ${X:-a,b}"), "echo ${X:-a,b}");
    }

    #[test]
    fn test_full_line() {
        assert_eq!(preprocess_braces("echo {a,b} end"), "echo a b end");
    }

    #[test]
    fn test_heredoc_body_untouched() {
        let input = "cat <<EOF\n{a,b}\nEOF\n";
        assert_eq!(preprocess_braces(input), input);
    }

    #[test]
    fn test_cartesian() {
        assert_eq!(
            expand_word("{a,b}{1,2}"),
            vec!["a1", "a2", "b1", "b2"]
        );
    }
}
