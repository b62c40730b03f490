//! Kite CLI: run script files, evaluate one-liners, or start the REPL.

use std::env;
use std::path::Path;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Start the REPL
    Repl,
    /// Run a script file
    Run { file: String },
    /// Evaluate a string and print the result
    Eval { code: String },
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    show_bytecode: bool,
}

fn print_usage() {
    eprintln!("Kite {} - bytecode interpreter", VERSION);
    eprintln!();
    eprintln!("Usage: kite [options] [script.kite]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  kite                 Start the interactive REPL");
    eprintln!("  kite script.kite     Run a script file");
    eprintln!("  kite -e <code>       Evaluate code and print the result");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --bytecode      Dump compiled bytecode before running");
    eprintln!("  --help, -h      Show this help message");
    eprintln!("  --version, -v   Show version");
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut command = None;
    let mut show_bytecode = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => return Err(String::new()),
            "--version" | "-v" => {
                println!("kite {}", VERSION);
                process::exit(0);
            }
            "--bytecode" => show_bytecode = true,
            "-e" => {
                i += 1;
                let code = args
                    .get(i)
                    .ok_or_else(|| "-e requires an argument".to_string())?;
                command = Some(Command::Eval { code: code.clone() });
            }
            arg if arg.starts_with('-') => {
                return Err(format!("unknown option: {}", arg));
            }
            file => {
                if command.is_some() {
                    return Err(format!("unexpected argument: {}", file));
                }
                command = Some(Command::Run {
                    file: file.to_string(),
                });
            }
        }
        i += 1;
    }

    Ok(Options {
        command: command.unwrap_or(Command::Repl),
        show_bytecode,
    })
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("Error: {}", message);
                eprintln!();
            }
            print_usage();
            process::exit(if message.is_empty() { 0 } else { 1 });
        }
    };

    match options.command {
        Command::Repl => kitelang::repl::start(),

        Command::Run { file } => {
            if let Err(e) = kitelang::run_file(Path::new(&file), options.show_bytecode) {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }

        Command::Eval { code } => {
            match kitelang::run_with_options(&code, options.show_bytecode) {
                Ok(value) => println!("{}", value),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            }
        }
    }
}
