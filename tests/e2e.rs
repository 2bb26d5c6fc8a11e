//! End-to-end scenarios driven through a real shell.
//!
//! Each script runs inside a brace group whose stdout is redirected to a
//! temp file, which the test then reads back. The tests fork real child
//! processes and dup the shell's descriptors, so they are serialized.

use serial_test::serial;

use psh::Shell;

/// Run a script, capturing stdout via an in-script redirection.
fn run(script: &str) -> (String, i32) {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out.txt");
    let mut shell = Shell::new();
    let wrapped = format!("{{\n{script}\n}} > {}", out.display());
    let status = shell.run_string(&wrapped);
    let stdout = std::fs::read_to_string(&out).unwrap_or_default();
    (stdout, status)
}

#[test]
#[serial]
fn pipeline_with_substitution() {
    let mut shell = Shell::new();
    shell.vars.set_scalar("USER", "alice").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let status = shell.run_string(&format!(
        "{{ echo \"Hello $USER\" | wc -w; }} > {}",
        out.display()
    ));
    assert_eq!(status, 0);
    let stdout = std::fs::read_to_string(&out).unwrap();
    assert_eq!(stdout.trim(), "2");
}

#[test]
#[serial]
fn parameter_expansion_defaults() {
    let (stdout, status) = run("unset X; echo ${X:-default}; echo ${X:=assigned}; echo $X");
    assert_eq!(stdout, "default\nassigned\nassigned\n");
    assert_eq!(status, 0);
}

#[test]
#[serial]
fn ifs_splitting_of_positional_params() {
    let (stdout, _) = run("IFS=:; set -- a::b; for f in \"$@\"; do echo \"<$f>\"; done");
    assert_eq!(stdout, "<a>\n<>\n<b>\n");
}

#[test]
#[serial]
fn arithmetic_command_status() {
    let (stdout, _) = run("(( 2 + 2 == 4 )); echo $?; (( 0 )); echo $?");
    assert_eq!(stdout, "0\n1\n");
}

#[test]
#[serial]
fn control_flow_in_pipeline_stage() {
    let (stdout, _) =
        run("while read l; do echo \"[$l]\"; done <<EOF | sort\nfoo\nbar\nEOF");
    assert_eq!(stdout, "[bar]\n[foo]\n");
}

#[test]
#[serial]
fn function_local_and_return() {
    let (stdout, _) = run("f(){ local x=1; echo $x; return 7; }; f; echo $?");
    assert_eq!(stdout, "1\n7\n");
}

#[test]
#[serial]
fn local_scope_isolation() {
    let (stdout, _) = run("x=outer; f(){ local x=inner; }; f; echo $x");
    assert_eq!(stdout, "outer\n");
}

#[test]
#[serial]
fn subshell_isolation() {
    let (stdout, _) = run("( X_SUB=1 ); echo ${X_SUB:-unset}");
    assert_eq!(stdout, "unset\n");
}

#[test]
#[serial]
fn command_substitution_strips_trailing_newlines() {
    let (stdout, _) = run("X=$(printf 'x\\n\\n\\n'); echo \"${X}y\"");
    assert_eq!(stdout, "xy\n");
}

#[test]
#[serial]
fn inverted_pipeline_status() {
    let (stdout, _) = run("! false; echo $?; ! true; echo $?");
    assert_eq!(stdout, "0\n1\n");
}

#[test]
#[serial]
fn last_status_updates() {
    let (stdout, _) = run("false; echo $?; true; echo $?");
    assert_eq!(stdout, "1\n0\n");
}

#[test]
#[serial]
fn errexit_neutral_inside_if() {
    let (stdout, status) = run("set -e; if false; then :; fi; echo ok");
    assert_eq!(stdout, "ok\n");
    assert_eq!(status, 0);
}

#[test]
#[serial]
fn errexit_exits_on_failure() {
    let (stdout, status) = run("set -e; false; echo unreachable");
    assert_eq!(stdout, "");
    assert_eq!(status, 1);
}

#[test]
#[serial]
fn pipefail_determinism() {
    let (stdout, _) = run("false | true; echo $?; set -o pipefail; false | true; echo $?");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "0");
    assert_ne!(lines[1], "0");
}

#[test]
#[serial]
fn arithmetic_wraps_on_overflow() {
    let (stdout, _) = run("echo $((9223372036854775807 + 1))");
    assert_eq!(stdout, "-9223372036854775808\n");
}

#[test]
#[serial]
fn heredoc_quoted_delimiter_is_literal() {
    let (stdout, _) = run("X=value\ncat <<'E'\n$X\nE\ncat <<E2\n$X\nE2");
    assert_eq!(stdout, "$X\nvalue\n");
}

#[test]
#[serial]
fn herestring_feeds_stdin() {
    let (stdout, _) = run("cat <<< 'one line'");
    assert_eq!(stdout, "one line\n");
}

#[test]
#[serial]
fn case_patterns_and_fallthrough() {
    let (stdout, _) = run("case abc in a*) echo first;; *) echo other;; esac");
    assert_eq!(stdout, "first\n");
    let (stdout, _) = run("case x in x) echo one;& y) echo two;; z) echo three;; esac");
    assert_eq!(stdout, "one\ntwo\n");
}

#[test]
#[serial]
fn for_arith_loop() {
    let (stdout, _) = run("for ((i=0; i<3; i++)); do echo $i; done");
    assert_eq!(stdout, "0\n1\n2\n");
}

#[test]
#[serial]
fn break_and_continue_levels() {
    let (stdout, _) = run("for i in 1 2 3; do if [[ $i == 2 ]]; then break; fi; echo $i; done");
    assert_eq!(stdout, "1\n");
    let (stdout, _) =
        run("for i in 1 2 3; do if [[ $i == 2 ]]; then continue; fi; echo $i; done");
    assert_eq!(stdout, "1\n3\n");
}

#[test]
#[serial]
fn test_command_pattern_match() {
    let (stdout, _) = run("[[ abcdef == a*f ]] && echo glob; [[ 10 -gt 9 ]] && echo num");
    assert_eq!(stdout, "glob\nnum\n");
}

#[test]
#[serial]
fn brace_expansion_cartesian() {
    let (stdout, _) = run("echo {a,b}{1,2}");
    assert_eq!(stdout, "a1 a2 b1 b2\n");
}

#[test]
#[serial]
fn quoted_braces_stay_literal() {
    let (stdout, _) = run("echo '{a,b}'");
    assert_eq!(stdout, "{a,b}\n");
}

#[test]
#[serial]
fn alias_substitution() {
    let (stdout, _) = run("alias zz='echo aliased'; zz now");
    assert_eq!(stdout, "aliased now\n");
}

#[test]
#[serial]
fn exported_variables_reach_children() {
    let (stdout, _) = run("export PSH_E2E=payload; sh -c 'echo $PSH_E2E'");
    assert_eq!(stdout, "payload\n");
}

#[test]
#[serial]
fn command_substitution_runs_in_subshell() {
    let (stdout, _) = run("Y=before; Z=$(Y=inside; echo $Y); echo $Y $Z");
    assert_eq!(stdout, "before inside\n");
}

#[test]
#[serial]
fn process_substitution_input() {
    let (stdout, _) = run("cat <(echo from-procsub)");
    assert_eq!(stdout, "from-procsub\n");
}

#[test]
#[serial]
fn eval_reenters_pipeline() {
    let (stdout, _) = run("eval 'echo ev\"al\"ed'");
    assert_eq!(stdout, "evaled\n");
}

#[test]
#[serial]
fn exit_status_propagates_from_eval() {
    let mut shell = Shell::new();
    assert_eq!(shell.run_string("eval 'exit 9'; echo unreachable"), 9);
}

#[test]
#[serial]
fn subshell_exit_trap_fires() {
    let (stdout, _) = run("(trap 'echo bye' EXIT; echo in); echo after");
    assert_eq!(stdout, "in\nbye\nafter\n");
}

#[test]
#[serial]
fn redirect_append_and_input() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data.txt");
    let (stdout, _) = run(&format!(
        "echo one > {p}; echo two >> {p}; cat < {p}",
        p = data.display()
    ));
    assert_eq!(stdout, "one\ntwo\n");
}

#[test]
#[serial]
fn fd_duplication() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("both.txt");
    let mut shell = Shell::new();
    shell.run_string(&format!(
        "{{ echo to-stdout; echo to-stderr >&2; }} > {} 2>&1",
        out.display()
    ));
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("to-stdout"));
    assert!(text.contains("to-stderr"));
}

#[test]
#[serial]
fn noclobber_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("keep.txt");
    std::fs::write(&file, "original").unwrap();
    let mut shell = Shell::new();
    let status = shell.run_string(&format!("set -C; echo new > {}", file.display()));
    assert_ne!(status, 0);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "original");
    // >| overrides
    shell.run_string(&format!("set -C; echo new >| {}", file.display()));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "new\n");
}

#[test]
#[serial]
fn background_job_and_wait() {
    let (stdout, status) = run("true & wait; echo waited");
    assert_eq!(stdout, "waited\n");
    assert_eq!(status, 0);
}

#[test]
#[serial]
fn command_not_found_is_127() {
    let mut shell = Shell::new();
    assert_eq!(shell.run_string("definitely-no-such-command-zz 2>/dev/null"), 127);
}

#[test]
#[serial]
fn nounset_unset_variable_fails() {
    let mut shell = Shell::new();
    let status = shell.run_string("set -u; echo $NO_SUCH_VAR_ZZ 2>/dev/null");
    assert_ne!(status, 0);
}

#[test]
#[serial]
fn arrays_and_expansion_forms() {
    let (stdout, _) = run(
        "arr=(alpha beta gamma); echo ${arr[1]}; echo ${#arr[@]}; echo ${arr[@]}",
    );
    assert_eq!(stdout, "beta\n3\nalpha beta gamma\n");
}

#[test]
#[serial]
fn star_joins_with_first_ifs_char() {
    let (stdout, _) = run("set -- a b c; IFS=-; echo \"$*\"");
    assert_eq!(stdout, "a-b-c\n");
}

#[test]
#[serial]
fn shift_moves_positionals() {
    let (stdout, _) = run("set -- a b c; shift 2; echo $1 $#");
    assert_eq!(stdout, "c 1\n");
}

#[test]
#[serial]
fn until_loop_runs_until_success() {
    let (stdout, _) = run("n=0; until [[ $n == 3 ]]; do echo $n; n=$((n+1)); done");
    assert_eq!(stdout, "0\n1\n2\n");
}

#[test]
#[serial]
fn nested_command_substitution() {
    let (stdout, _) = run("echo $(echo $(echo deep))");
    assert_eq!(stdout, "deep\n");
}

#[test]
#[serial]
fn pattern_removal_operators() {
    let (stdout, _) = run("p=/usr/local/bin/tool.sh; echo ${p##*/}; echo ${p%.*}");
    assert_eq!(stdout, "tool.sh\n/usr/local/bin/tool\n");
}

#[test]
#[serial]
fn pattern_replacement_operators() {
    let (stdout, _) = run("s=aaa; echo ${s/a/b}; echo ${s//a/b}");
    assert_eq!(stdout, "baa\nbbb\n");
}

#[test]
#[serial]
fn glob_leaves_nonmatching_literal() {
    let (stdout, _) = run("echo /no/such/dir-zz/*");
    assert_eq!(stdout, "/no/such/dir-zz/*\n");
}

#[test]
#[serial]
fn glob_matches_real_files() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["one.txt", "two.txt", "other.log"] {
        std::fs::write(dir.path().join(name), "").unwrap();
    }
    let (stdout, _) = run(&format!("echo {}/*.txt", dir.path().display()));
    let line = stdout.trim();
    assert!(line.contains("one.txt"));
    assert!(line.contains("two.txt"));
    assert!(!line.contains("other.log"));
}
