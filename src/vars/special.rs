//! Special parameters
//!
//! `$?`, `$$`, `$!`, `$#`, `$0`, `$-` and the positional parameters are
//! answered here, before the scope stack is consulted. `$@` and `$*` are
//! resolved by the expansion engine because their field behavior depends on
//! quoting context; the unquoted scalar join lives here for `${#@}` and
//! plain lookups.

use crate::vars::VarStore;

/// True for names the store answers without consulting scopes.
pub fn is_special(name: &str) -> bool {
    matches!(name, "?" | "$" | "!" | "#" | "0" | "-" | "@" | "*")
        || (!name.is_empty() && name.chars().all(|c| c.is_ascii_digit()))
}

pub fn get_special(store: &VarStore, name: &str) -> Option<String> {
    match name {
        "?" => Some(store.last_status.to_string()),
        "$" => Some(store.shell_pid.to_string()),
        "!" => store.last_bg_pid.map(|pid| pid.to_string()),
        "#" => Some(store.positional().len().to_string()),
        "0" => Some(store.script_name.clone()),
        "-" => Some(store.option_flags.clone()),
        "LINENO" => Some(store.current_line.to_string()),
        "@" | "*" => {
            if store.positional().is_empty() {
                None
            } else {
                Some(store.positional().join(" "))
            }
        }
        _ if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) => {
            let n: usize = name.parse().ok()?;
            store.positional().get(n.wrapping_sub(1)).cloned()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_special() {
        assert!(is_special("?"));
        assert!(is_special("12"));
        assert!(is_special("@"));
        assert!(!is_special("HOME"));
        assert!(!is_special(""));
    }

    #[test]
    fn test_positional_lookup() {
        let mut store = VarStore::new();
        store.set_positional(vec!["one".into(), "two".into()]);
        assert_eq!(get_special(&store, "1").as_deref(), Some("one"));
        assert_eq!(get_special(&store, "2").as_deref(), Some("two"));
        assert_eq!(get_special(&store, "3"), None);
        assert_eq!(get_special(&store, "*").as_deref(), Some("one two"));
    }

    #[test]
    fn test_dollar_zero() {
        let mut store = VarStore::new();
        store.script_name = "script.sh".into();
        assert_eq!(get_special(&store, "0").as_deref(), Some("script.sh"));
    }
}
