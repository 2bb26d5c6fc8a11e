//! Shell pattern matching
//!
//! Converts shell glob patterns to regex form for parameter expansion
//! (`${var%pattern}`, `${var/pattern/replacement}`), `case` patterns, and
//! `[[ == ]]` matching. Characters protected by the glob sentinel (see
//! [`crate::expansion::quote`]) always match literally.

use std::collections::HashMap;

use regex_lite::Regex;

use crate::expansion::quote::GLOB_SENTINEL;

lazy_static::lazy_static! {
    /// Valid POSIX character class names
    static ref POSIX_CLASSES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("alnum", "a-zA-Z0-9");
        m.insert("alpha", "a-zA-Z");
        m.insert("ascii", "\\x00-\\x7F");
        m.insert("blank", " \\t");
        m.insert("cntrl", "\\x00-\\x1F\\x7F");
        m.insert("digit", "0-9");
        m.insert("graph", "!-~");
        m.insert("lower", "a-z");
        m.insert("print", " -~");
        m.insert("punct", "!-/:-@\\[-`{-~");
        m.insert("space", " \\t\\n\\r\\x0b\\x0c");
        m.insert("upper", "A-Z");
        m.insert("word", "a-zA-Z0-9_");
        m.insert("xdigit", "0-9A-Fa-f");
        m
    };
}

/// Convert a shell pattern to an (unanchored) regex string.
///
/// `greedy` controls whether `*` prefers the longest match, which matters
/// for `${var##p}` vs `${var#p}`.
pub fn pattern_to_regex(pattern: &str, greedy: bool) -> String {
    let mut regex = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let star = if greedy { ".*" } else { ".*?" };
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            GLOB_SENTINEL => {
                // Next char is literal
                if let Some(&next) = chars.get(i + 1) {
                    push_literal(&mut regex, next);
                    i += 2;
                    continue;
                }
                i += 1;
            }
            '*' => {
                regex.push_str(star);
                i += 1;
            }
            '?' => {
                regex.push('.');
                i += 1;
            }
            '\\' => {
                if let Some(&next) = chars.get(i + 1) {
                    push_literal(&mut regex, next);
                    i += 2;
                } else {
                    regex.push_str("\\\\");
                    i += 1;
                }
            }
            '[' => {
                match scan_bracket(&chars, i) {
                    Some(end) => {
                        regex.push_str(&convert_bracket(&chars[i + 1..end]));
                        i = end + 1;
                    }
                    None => {
                        // Unclosed class is a literal [
                        regex.push_str("\\[");
                        i += 1;
                    }
                }
            }
            _ => {
                push_literal(&mut regex, c);
                i += 1;
            }
        }
    }
    regex
}

fn push_literal(regex: &mut String, c: char) {
    if "\\^$.|?*+()[]{}".contains(c) {
        regex.push('\\');
    }
    regex.push(c);
}

/// Find the index of the `]` closing a bracket expression starting at `[`.
fn scan_bracket(chars: &[char], open: usize) -> Option<usize> {
    let mut i = open + 1;
    if matches!(chars.get(i), Some('!' | '^')) {
        i += 1;
    }
    // A `]` immediately after the (possibly negated) opening is literal
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            ']' => return Some(i),
            '[' if chars.get(i + 1) == Some(&':') => {
                // POSIX class: skip to :]
                let mut j = i + 2;
                while j + 1 < chars.len() && !(chars[j] == ':' && chars[j + 1] == ']') {
                    j += 1;
                }
                i = j + 2;
            }
            _ => i += 1,
        }
    }
    None
}

/// Convert the inside of a bracket expression.
fn convert_bracket(inner: &[char]) -> String {
    let mut out = String::from("[");
    let mut i = 0;
    if matches!(inner.first(), Some('!' | '^')) {
        out.push('^');
        i = 1;
    }
    while i < inner.len() {
        let c = inner[i];
        if c == '[' && inner.get(i + 1) == Some(&':') {
            let mut j = i + 2;
            let mut name = String::new();
            while j + 1 < inner.len() && !(inner[j] == ':' && inner[j + 1] == ']') {
                name.push(inner[j]);
                j += 1;
            }
            if let Some(expansion) = POSIX_CLASSES.get(name.as_str()) {
                out.push_str(expansion);
            }
            i = j + 2;
            continue;
        }
        match c {
            '\\' => out.push_str("\\\\"),
            '^' if i != 0 => out.push_str("\\^"),
            ']' => out.push_str("\\]"),
            GLOB_SENTINEL => {}
            _ => out.push(c),
        }
        i += 1;
    }
    out.push(']');
    out
}

/// Full-string match of a shell pattern against text.
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    let regex_src = format!("^(?:{})$", pattern_to_regex(pattern, true));
    match Regex::new(&regex_src) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// True when the (sentinel-stripped view of the) pattern contains an active
/// glob metacharacter.
pub fn has_glob_chars(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            GLOB_SENTINEL => i += 2,
            '\\' => i += 2,
            '*' | '?' => return true,
            '[' => {
                if scan_bracket(&chars, i).is_some() {
                    return true;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    false
}

/// Remove the shortest or longest prefix/suffix matching `pattern`.
pub fn remove_pattern(text: &str, pattern: &str, prefix: bool, greedy: bool) -> String {
    let body = pattern_to_regex(pattern, greedy);
    let regex_src = if prefix {
        format!("^(?:{body})")
    } else {
        format!("(?:{body})$")
    };
    let Ok(re) = Regex::new(&regex_src) else {
        return text.to_string();
    };

    if prefix {
        if greedy {
            if let Some(m) = re.find(text) {
                return text[m.end()..].to_string();
            }
        } else {
            // Shortest prefix: try successively longer prefixes
            let chars: Vec<char> = text.chars().collect();
            let mut byte_idx = 0;
            for i in 0..=chars.len() {
                let candidate = &text[..byte_idx];
                if full_match(&body, candidate) {
                    return text[byte_idx..].to_string();
                }
                if i < chars.len() {
                    byte_idx += chars[i].len_utf8();
                }
            }
        }
        text.to_string()
    } else {
        // Suffix removal: find the match whose end is the end of the string
        let chars: Vec<char> = text.chars().collect();
        let indices: Vec<usize> = {
            let mut v = Vec::with_capacity(chars.len() + 1);
            let mut b = 0;
            for c in &chars {
                v.push(b);
                b += c.len_utf8();
            }
            v.push(b);
            v
        };
        if greedy {
            for &start in &indices {
                if full_match(&body, &text[start..]) {
                    return text[..start].to_string();
                }
            }
        } else {
            for &start in indices.iter().rev() {
                if full_match(&body, &text[start..]) {
                    return text[..start].to_string();
                }
            }
        }
        text.to_string()
    }
}

fn full_match(regex_body: &str, text: &str) -> bool {
    Regex::new(&format!("^(?:{regex_body})$"))
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Replace the first (or all) occurrences of `pattern` in `text`.
/// `anchor` is `Some('#')` for prefix-anchored and `Some('%')` for
/// suffix-anchored replacement.
pub fn replace_pattern(
    text: &str,
    pattern: &str,
    replacement: &str,
    all: bool,
    anchor: Option<char>,
) -> String {
    let body = pattern_to_regex(pattern, true);
    let regex_src = match anchor {
        Some('#') => format!("^(?:{body})"),
        Some('%') => format!("(?:{body})$"),
        _ => format!("(?:{body})"),
    };
    let Ok(re) = Regex::new(&regex_src) else {
        return text.to_string();
    };
    let replacement = replacement.replace('$', "$$");
    if all && anchor.is_none() {
        re.replace_all(text, replacement.as_str()).into_owned()
    } else {
        re.replace(text, replacement.as_str()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_and_question() {
        assert!(pattern_matches("*.txt", "file.txt"));
        assert!(!pattern_matches("*.txt", "file.rs"));
        assert!(pattern_matches("a?c", "abc"));
        assert!(!pattern_matches("a?c", "abbc"));
    }

    #[test]
    fn test_bracket_sets() {
        assert!(pattern_matches("[abc]x", "bx"));
        assert!(!pattern_matches("[abc]x", "dx"));
        assert!(pattern_matches("[!abc]x", "dx"));
        assert!(pattern_matches("[a-f]1", "d1"));
    }

    #[test]
    fn test_posix_class() {
        assert!(pattern_matches("[[:digit:]]*", "42abc"));
        assert!(!pattern_matches("[[:digit:]]*", "abc"));
    }

    #[test]
    fn test_escaped_star_literal() {
        assert!(pattern_matches(r"\*", "*"));
        assert!(!pattern_matches(r"\*", "x"));
    }

    #[test]
    fn test_sentinel_protects() {
        let protected = format!("{}{}", GLOB_SENTINEL, '*');
        assert!(pattern_matches(&protected, "*"));
        assert!(!pattern_matches(&protected, "anything"));
    }

    #[test]
    fn test_remove_prefix() {
        assert_eq!(remove_pattern("a.b.c", "*.", true, false), "b.c");
        assert_eq!(remove_pattern("a.b.c", "*.", true, true), "c");
    }

    #[test]
    fn test_remove_suffix() {
        assert_eq!(remove_pattern("a.b.c", ".*", false, false), "a.b");
        assert_eq!(remove_pattern("a.b.c", ".*", false, true), "a");
    }

    #[test]
    fn test_remove_no_match() {
        assert_eq!(remove_pattern("hello", "x*", true, false), "hello");
    }

    #[test]
    fn test_replace() {
        assert_eq!(replace_pattern("aaa", "a", "b", false, None), "baa");
        assert_eq!(replace_pattern("aaa", "a", "b", true, None), "bbb");
    }

    #[test]
    fn test_replace_anchored() {
        assert_eq!(
            replace_pattern("abcabc", "abc", "X", false, Some('#')),
            "Xabc"
        );
        assert_eq!(
            replace_pattern("abcabc", "abc", "X", false, Some('%')),
            "abcX"
        );
    }

    #[test]
    fn test_replace_glob_pattern() {
        assert_eq!(
            replace_pattern("foo.rs", "*.rs", "lib", false, None),
            "lib"
        );
    }

    #[test]
    fn test_has_glob_chars() {
        assert!(has_glob_chars("*.txt"));
        assert!(has_glob_chars("a?b"));
        assert!(has_glob_chars("[ab]"));
        assert!(!has_glob_chars("plain"));
        assert!(!has_glob_chars(r"\*"));
        assert!(!has_glob_chars("[unclosed"));
    }

    #[test]
    fn test_unclosed_bracket_literal() {
        assert!(pattern_matches("[abc", "[abc"));
    }
}
