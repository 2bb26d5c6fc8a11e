use std::io::{IsTerminal, Read};

use clap::Parser as ClapParser;

use psh::shell::Shell;

#[derive(ClapParser)]
#[command(name = "psh")]
#[command(about = "A POSIX-style shell")]
#[command(version)]
#[command(disable_help_flag = false)]
struct Cli {
    /// Execute the given command string; remaining args become $0, $1, ...
    #[arg(short = 'c', value_name = "STRING")]
    command: Option<String>,

    /// Read commands from stdin even when arguments are present
    #[arg(short = 's')]
    stdin: bool,

    /// Force an interactive shell
    #[arg(short = 'i')]
    interactive: bool,

    /// Login shell: source the profile files
    #[arg(short = 'l', long = "login")]
    login: bool,

    /// Do not source the rc file
    #[arg(long = "norc")]
    norc: bool,

    /// Source this file instead of ~/.pshrc
    #[arg(long = "rcfile", value_name = "PATH")]
    rcfile: Option<String>,

    /// Strict POSIX mode
    #[arg(long = "posix")]
    posix: bool,

    /// Trace commands as they execute (same as -o xtrace)
    #[arg(short = 'x')]
    xtrace: bool,

    /// Exit on non-zero status (same as -o errexit)
    #[arg(short = 'e')]
    errexit: bool,

    /// Error on unset variables (same as -o nounset)
    #[arg(short = 'u')]
    nounset: bool,

    /// Enable a named option
    #[arg(short = 'o', value_name = "OPT", action = clap::ArgAction::Append)]
    set_options: Vec<String>,

    /// Disable a named option (`+o OPT`)
    #[arg(long = "disable-option", value_name = "OPT", action = clap::ArgAction::Append, hide = true)]
    unset_options: Vec<String>,

    /// Script file and its arguments
    #[arg(trailing_var_arg = true)]
    script_args: Vec<String>,
}

fn main() {
    // clap has no native `+o` support; translate it before parsing.
    let mut raw_args: Vec<String> = Vec::new();
    let mut args = std::env::args().peekable();
    while let Some(arg) = args.next() {
        if arg == "+o" {
            if let Some(opt) = args.next() {
                raw_args.push("--disable-option".to_string());
                raw_args.push(opt);
            }
        } else {
            raw_args.push(arg);
        }
    }
    let cli = Cli::parse_from(raw_args);

    let mut shell = Shell::new();
    shell.options.posix = cli.posix;
    shell.options.xtrace = cli.xtrace;
    shell.options.errexit = cli.errexit;
    shell.options.nounset = cli.nounset;
    for name in &cli.set_options {
        if !shell.options.set_by_name(name, true) {
            eprintln!("psh: -o {name}: invalid option name");
            std::process::exit(2);
        }
    }
    for name in &cli.unset_options {
        if !shell.options.set_by_name(name, false) {
            eprintln!("psh: +o {name}: invalid option name");
            std::process::exit(2);
        }
    }
    shell.sync_option_flags();

    // -c STRING: remaining operands become $0 and the positional parameters
    if let Some(command) = &cli.command {
        let mut operands = cli.script_args.iter();
        if let Some(zero) = operands.next() {
            shell.vars.script_name = zero.clone();
        }
        shell
            .vars
            .set_positional(operands.cloned().collect());
        std::process::exit(shell.run_command_string(command));
    }

    // Script file (unless -s forces stdin)
    if !cli.stdin && !cli.script_args.is_empty() {
        let script = cli.script_args[0].clone();
        shell
            .vars
            .set_positional(cli.script_args[1..].to_vec());
        std::process::exit(shell.run_script_file(&script));
    }

    if cli.stdin && !cli.script_args.is_empty() {
        shell.vars.set_positional(cli.script_args.clone());
    }

    let interactive = cli.interactive || std::io::stdin().is_terminal();
    if interactive {
        if cli.login {
            shell.source_login_profiles();
        }
        if !cli.norc {
            shell.source_rc_file(cli.rcfile.as_deref());
        }
        std::process::exit(shell.run_interactive());
    }

    // Batch mode: read the whole of stdin and run it as one unit
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        std::process::exit(1);
    }
    std::process::exit(shell.run_command_string(&input));
}
