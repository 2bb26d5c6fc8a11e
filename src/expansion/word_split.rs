//! Word splitting
//!
//! IFS-based field splitting of unquoted expansion results. The IFS value is
//! partitioned into whitespace and non-whitespace characters: runs of IFS
//! whitespace collapse into a single separator, while every non-whitespace
//! IFS character delimits a field on its own, producing empty fields when
//! adjacent (`IFS=:` splits `a::b` into `a`, ``, `b`, and `:a:` into three
//! fields with leading and trailing empties).
//!
//! Characters protected by the glob sentinel never act as separators.

use crate::expansion::quote::GLOB_SENTINEL;

/// A scanned fragment of a word awaiting field splitting.
#[derive(Debug, Clone, PartialEq)]
pub enum Seg {
    Piece(Piece),
    /// Hard field boundary, produced between the elements of `"$@"` and
    /// `"${arr[@]}"`.
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub text: String,
    /// Expansion results outside quotes are splittable; literals and quoted
    /// text are not.
    pub splittable: bool,
    /// Quoted pieces anchor empty fields.
    pub quoted: bool,
}

impl Piece {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            splittable: false,
            quoted: false,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            splittable: false,
            quoted: true,
        }
    }

    pub fn expansion(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            splittable: true,
            quoted: false,
        }
    }
}

/// Result of splitting one piece of text.
#[derive(Debug, Clone)]
pub struct IfsSplit {
    pub parts: Vec<String>,
    pub had_leading: bool,
    pub had_trailing: bool,
}

/// Split `text` on the IFS character set.
pub fn ifs_split(text: &str, ifs: &str) -> IfsSplit {
    if ifs.is_empty() {
        return IfsSplit {
            parts: if text.is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            },
            had_leading: false,
            had_trailing: false,
        };
    }

    let ws: Vec<char> = ifs.chars().filter(|c| c.is_whitespace()).collect();
    let nws: Vec<char> = ifs.chars().filter(|c| !c.is_whitespace()).collect();
    let chars: Vec<char> = text.chars().collect();

    let had_leading = chars.first().is_some_and(|c| ifs.contains(*c));
    let had_trailing = chars.last().is_some_and(|c| ifs.contains(*c));

    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut have = false;
    let mut field_open = false;
    let mut i = 0;

    // Leading IFS whitespace delimits nothing
    while i < chars.len() && ws.contains(&chars[i]) {
        i += 1;
    }

    while i < chars.len() {
        let c = chars[i];
        if c == GLOB_SENTINEL {
            // Protected character: literal, never a separator
            cur.push(c);
            if let Some(&next) = chars.get(i + 1) {
                cur.push(next);
            }
            have = true;
            i += 2;
            continue;
        }
        if nws.contains(&c) {
            parts.push(std::mem::take(&mut cur));
            have = false;
            field_open = true;
            i += 1;
            // Whitespace around a non-whitespace separator is part of it
            while i < chars.len() && ws.contains(&chars[i]) {
                i += 1;
            }
        } else if ws.contains(&c) {
            parts.push(std::mem::take(&mut cur));
            have = false;
            field_open = false;
            while i < chars.len() && ws.contains(&chars[i]) {
                i += 1;
            }
            // One non-whitespace separator may close the whitespace run
            if i < chars.len() && nws.contains(&chars[i]) {
                i += 1;
                field_open = true;
                while i < chars.len() && ws.contains(&chars[i]) {
                    i += 1;
                }
            }
        } else {
            cur.push(c);
            have = true;
            i += 1;
        }
    }
    if have || field_open {
        parts.push(cur);
    }

    IfsSplit {
        parts,
        had_leading,
        had_trailing,
    }
}

/// Merge scanned segments into final fields.
///
/// Non-splittable pieces join with whatever field is open; splittable pieces
/// are IFS-split, with boundaries created at their internal separators and
/// at their leading/trailing separators. A word that produces no content and
/// contains no quoted piece yields no field at all.
pub fn split_fields(segs: &[Seg], ifs: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut started = false;

    for seg in segs {
        match seg {
            Seg::Break => {
                if started {
                    fields.push(std::mem::take(&mut cur));
                    started = false;
                }
            }
            Seg::Piece(piece) => {
                if !piece.splittable {
                    if !piece.text.is_empty() || piece.quoted {
                        started = true;
                    }
                    cur.push_str(&piece.text);
                    continue;
                }
                if piece.text.is_empty() {
                    continue;
                }
                let split = ifs_split(&piece.text, ifs);
                if split.parts.is_empty() {
                    // All separators: close the open field
                    if started {
                        fields.push(std::mem::take(&mut cur));
                        started = false;
                    }
                    continue;
                }
                if split.had_leading && started {
                    fields.push(std::mem::take(&mut cur));
                    started = false;
                }
                for (i, part) in split.parts.iter().enumerate() {
                    if i > 0 {
                        fields.push(std::mem::take(&mut cur));
                    }
                    cur.push_str(part);
                    started = true;
                }
                if split.had_trailing {
                    fields.push(std::mem::take(&mut cur));
                    started = false;
                }
            }
        }
    }
    if started {
        fields.push(cur);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str, ifs: &str) -> Vec<String> {
        ifs_split(text, ifs).parts
    }

    #[test]
    fn test_colon_ifs_counts() {
        assert_eq!(split("a::b", ":"), vec!["a", "", "b"]);
        assert_eq!(split("a:b", ":"), vec!["a", "b"]);
        assert_eq!(split(":a:", ":"), vec!["", "a", ""]);
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(split("  a   b  ", " \t\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_mixed_ifs() {
        // whitespace around a non-whitespace separator is one delimiter
        assert_eq!(split("a : b", ": "), vec!["a", "b"]);
        assert_eq!(split("a : : b", ": "), vec!["a", "", "b"]);
    }

    #[test]
    fn test_empty_ifs_no_split() {
        assert_eq!(split("a b c", ""), vec!["a b c"]);
    }

    #[test]
    fn test_split_fields_literal_not_split() {
        let segs = vec![Seg::Piece(Piece::literal("a b"))];
        assert_eq!(split_fields(&segs, " \t\n"), vec!["a b"]);
    }

    #[test]
    fn test_split_fields_expansion_split() {
        let segs = vec![Seg::Piece(Piece::expansion("a b c"))];
        assert_eq!(split_fields(&segs, " \t\n"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_fields_join_with_literal() {
        // x$y with y="1 2": the "1" joins the literal prefix
        let segs = vec![
            Seg::Piece(Piece::literal("x")),
            Seg::Piece(Piece::expansion("1 2")),
        ];
        assert_eq!(split_fields(&segs, " \t\n"), vec!["x1", "2"]);
    }

    #[test]
    fn test_split_fields_empty_expansion_no_field() {
        let segs = vec![Seg::Piece(Piece::expansion(""))];
        assert!(split_fields(&segs, " \t\n").is_empty());
    }

    #[test]
    fn test_split_fields_quoted_empty_kept() {
        let segs = vec![Seg::Piece(Piece::quoted(""))];
        assert_eq!(split_fields(&segs, " \t\n"), vec![""]);
    }

    #[test]
    fn test_split_fields_breaks() {
        let segs = vec![
            Seg::Piece(Piece::quoted("a")),
            Seg::Break,
            Seg::Piece(Piece::quoted("b")),
        ];
        assert_eq!(split_fields(&segs, " \t\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_split_fields_break_with_affixes() {
        // x"$@"y with two params: x joins first, y joins last
        let segs = vec![
            Seg::Piece(Piece::literal("x")),
            Seg::Piece(Piece::quoted("1")),
            Seg::Break,
            Seg::Piece(Piece::quoted("2")),
            Seg::Piece(Piece::literal("y")),
        ];
        assert_eq!(split_fields(&segs, " \t\n"), vec!["x1", "2y"]);
    }

    #[test]
    fn test_leading_separator_closes_prefix() {
        // a$x with x=":b" and IFS=: gives "a" and "b"
        let segs = vec![
            Seg::Piece(Piece::literal("a")),
            Seg::Piece(Piece::expansion(":b")),
        ];
        assert_eq!(split_fields(&segs, ":"), vec!["a", "b"]);
    }
}
