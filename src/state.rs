//! Shell options
//!
//! The closed option set reachable through the CLI and the `set` builtin,
//! plus the debug flags. `$-` reports the short-letter options currently
//! enabled.

/// Shell options (`set -e`, `set -o pipefail`, ...).
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// set -e: exit on non-zero status outside conditional contexts
    pub errexit: bool,
    /// set -u: expanding an unset variable is an error
    pub nounset: bool,
    /// set -x: trace expanded commands, prefixed by PS4
    pub xtrace: bool,
    /// set -o pipefail: pipeline status is the first non-zero stage
    pub pipefail: bool,
    /// set -C: `>` refuses to overwrite existing files
    pub noclobber: bool,
    /// set -f: disable pathname expansion
    pub noglob: bool,
    /// set -a: export every assigned variable
    pub allexport: bool,
    /// set -b: report background job status immediately
    pub notify: bool,
    /// set -n: read commands but do not execute
    pub noexec: bool,
    /// set -v: echo input lines as read
    pub verbose: bool,
    /// set -h: remember command locations
    pub hashcmds: bool,
    /// set -m: job control
    pub monitor: bool,
    /// set -o ignoreeof: interactive EOF does not exit
    pub ignoreeof: bool,
    /// set -o nolog: do not record function definitions in history
    pub nolog: bool,
    /// strict POSIX mode
    pub posix: bool,
    /// `**` recursive globbing
    pub globstar: bool,
    // Editor modes (honored by the external line editor)
    pub vi: bool,
    pub emacs: bool,
    // Debug flags
    pub debug_ast: bool,
    pub debug_tokens: bool,
    pub debug_expansion: bool,
    pub debug_exec: bool,
    pub debug_exec_fork: bool,
}

impl ShellOptions {
    /// Apply a short-letter option (the `set -e` form). Returns false for
    /// unknown letters.
    pub fn set_by_letter(&mut self, letter: char, on: bool) -> bool {
        match letter {
            'e' => self.errexit = on,
            'u' => self.nounset = on,
            'x' => self.xtrace = on,
            'f' => self.noglob = on,
            'C' => self.noclobber = on,
            'a' => self.allexport = on,
            'b' => self.notify = on,
            'n' => self.noexec = on,
            'v' => self.verbose = on,
            'h' => self.hashcmds = on,
            'm' => self.monitor = on,
            _ => return false,
        }
        true
    }

    /// Apply a named option (the `set -o name` form). Returns false for
    /// unknown names.
    pub fn set_by_name(&mut self, name: &str, on: bool) -> bool {
        match name {
            "errexit" => self.errexit = on,
            "nounset" => self.nounset = on,
            "xtrace" => self.xtrace = on,
            "pipefail" => self.pipefail = on,
            "noclobber" => self.noclobber = on,
            "noglob" => self.noglob = on,
            "allexport" => self.allexport = on,
            "notify" => self.notify = on,
            "noexec" => self.noexec = on,
            "verbose" => self.verbose = on,
            "hashcmds" => self.hashcmds = on,
            "monitor" => self.monitor = on,
            "ignoreeof" => self.ignoreeof = on,
            "nolog" => self.nolog = on,
            "posix" => self.posix = on,
            "globstar" => self.globstar = on,
            "vi" => {
                self.vi = on;
                if on {
                    self.emacs = false;
                }
            }
            "emacs" => {
                self.emacs = on;
                if on {
                    self.vi = false;
                }
            }
            "debug-ast" => self.debug_ast = on,
            "debug-tokens" => self.debug_tokens = on,
            "debug-expansion" => self.debug_expansion = on,
            "debug-exec" => self.debug_exec = on,
            "debug-exec-fork" => self.debug_exec_fork = on,
            _ => return false,
        }
        true
    }

    /// The short-letter flags for `$-`.
    pub fn flag_string(&self, interactive: bool) -> String {
        let mut flags = String::new();
        for (letter, on) in [
            ('a', self.allexport),
            ('b', self.notify),
            ('C', self.noclobber),
            ('e', self.errexit),
            ('f', self.noglob),
            ('h', self.hashcmds),
            ('m', self.monitor),
            ('n', self.noexec),
            ('u', self.nounset),
            ('v', self.verbose),
            ('x', self.xtrace),
        ] {
            if on {
                flags.push(letter);
            }
        }
        if interactive {
            flags.push('i');
        }
        flags
    }

    /// (name, enabled) pairs for `set -o` output.
    pub fn listing(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("allexport", self.allexport),
            ("emacs", self.emacs),
            ("errexit", self.errexit),
            ("hashcmds", self.hashcmds),
            ("ignoreeof", self.ignoreeof),
            ("monitor", self.monitor),
            ("noclobber", self.noclobber),
            ("noexec", self.noexec),
            ("noglob", self.noglob),
            ("nolog", self.nolog),
            ("notify", self.notify),
            ("nounset", self.nounset),
            ("pipefail", self.pipefail),
            ("posix", self.posix),
            ("verbose", self.verbose),
            ("vi", self.vi),
            ("xtrace", self.xtrace),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters() {
        let mut options = ShellOptions::default();
        assert!(options.set_by_letter('e', true));
        assert!(options.errexit);
        assert!(options.set_by_letter('e', false));
        assert!(!options.errexit);
        assert!(!options.set_by_letter('Z', true));
    }

    #[test]
    fn test_names() {
        let mut options = ShellOptions::default();
        assert!(options.set_by_name("pipefail", true));
        assert!(options.pipefail);
        assert!(!options.set_by_name("bogus", true));
    }

    #[test]
    fn test_flag_string() {
        let mut options = ShellOptions::default();
        options.errexit = true;
        options.nounset = true;
        options.xtrace = true;
        assert_eq!(options.flag_string(false), "eux");
        assert_eq!(options.flag_string(true), "euxi");
    }

    #[test]
    fn test_editor_modes_exclusive() {
        let mut options = ShellOptions::default();
        options.set_by_name("vi", true);
        options.set_by_name("emacs", true);
        assert!(options.emacs);
        assert!(!options.vi);
    }
}
