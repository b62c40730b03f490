//! Interactive REPL. Compilation state and globals persist across lines,
//! so bindings from one input are visible in the next.

use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::bytecode::builtins::BUILTINS;
use crate::bytecode::{disassemble, new_globals, Compiler, SymbolTable, Value, Vm};
use crate::lexer::Scanner;
use crate::parser::Parser;

const HISTORY_FILE: &str = ".kite_history";
const PROMPT: &str = ">> ";

pub struct Repl {
    symbol_table: SymbolTable,
    constants: Vec<Value>,
    globals: Rc<RefCell<Vec<Value>>>,
    history: Vec<String>,
    history_file: PathBuf,
    show_bytecode: bool,
}

impl Repl {
    pub fn new() -> Self {
        let history_file = Self::history_path();
        let mut repl = Self {
            symbol_table: new_symbol_table(),
            constants: Vec::new(),
            globals: new_globals(),
            history: Vec::new(),
            history_file,
            show_bytecode: false,
        };
        repl.load_history();
        repl
    }

    fn history_path() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            home.join(HISTORY_FILE)
        } else {
            PathBuf::from(HISTORY_FILE)
        }
    }

    fn load_history(&mut self) {
        if let Ok(content) = std::fs::read_to_string(&self.history_file) {
            for line in content.lines() {
                if !line.trim().is_empty() {
                    self.history.push(line.to_string());
                }
            }
        }
    }

    fn save_history(&self) {
        let content = self.history.join("\n");
        let _ = std::fs::write(&self.history_file, content);
    }

    pub fn run(&mut self) {
        println!("Kite REPL");
        println!("Type .help for available commands.\n");

        let mut rl = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(_) => {
                println!("Warning: using basic input (no history or editing)");
                self.run_basic();
                return;
            }
        };
        for entry in &self.history {
            let _ = rl.add_history_entry(entry);
        }

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "exit" || line == ".exit" || line == "quit" {
                        self.save_history();
                        break;
                    }
                    let _ = rl.add_history_entry(line);
                    self.history.push(line.to_string());

                    if line.starts_with('.') {
                        self.handle_command(line);
                    } else {
                        self.execute(line);
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    self.save_history();
                    break;
                }
                Err(e) => {
                    println!("Error: {}", e);
                    self.save_history();
                    break;
                }
            }
        }
    }

    fn run_basic(&mut self) {
        let stdin = std::io::stdin();
        loop {
            print!("{}", PROMPT);
            std::io::stdout().flush().unwrap();
            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "exit" || line == "quit" {
                        break;
                    }
                    self.history.push(line.to_string());
                    if line.starts_with('.') {
                        self.handle_command(line);
                    } else {
                        self.execute(line);
                    }
                }
                Err(e) => {
                    println!("Error: {}", e);
                    break;
                }
            }
        }
        self.save_history();
    }

    fn handle_command(&mut self, line: &str) {
        match line {
            ".help" => self.cmd_help(),
            ".history" => self.cmd_history(),
            ".reset" => self.cmd_reset(),
            ".bytecode" => {
                self.show_bytecode = !self.show_bytecode;
                println!(
                    "Bytecode dump {}.",
                    if self.show_bytecode { "enabled" } else { "disabled" }
                );
            }
            _ => println!(
                "Unknown command: {}. Type .help for available commands.",
                line
            ),
        }
    }

    fn cmd_help(&self) {
        println!();
        println!("Kite REPL commands");
        println!();
        println!(".help          - Show this help message");
        println!(".history       - Show input history");
        println!(".reset         - Discard all bindings and start fresh");
        println!(".bytecode      - Toggle per-input bytecode dump");
        println!("exit / Ctrl+D  - Leave the REPL");
        println!();
    }

    fn cmd_history(&self) {
        for (i, entry) in self.history.iter().enumerate() {
            println!("{:4}  {}", i + 1, entry);
        }
    }

    fn cmd_reset(&mut self) {
        self.symbol_table = new_symbol_table();
        self.constants = Vec::new();
        self.globals = new_globals();
        println!("Environment reset.");
    }

    /// Compile and run one line, printing the resulting value.
    fn execute(&mut self, line: &str) {
        let tokens = match Scanner::new(line).scan_tokens() {
            Ok(tokens) => tokens,
            Err(e) => {
                println!("{}", e.to_string().red());
                return;
            }
        };
        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(e) => {
                println!("{}", e.to_string().red());
                return;
            }
        };

        let symbol_table = std::mem::take(&mut self.symbol_table);
        let constants = std::mem::take(&mut self.constants);
        let mut compiler = Compiler::with_state(symbol_table, constants);

        let compiled = compiler.compile(&program);
        let bytecode = compiler.bytecode();
        // A failed compile may have defined symbols or constants already;
        // keeping them matches the mutate-in-place contract.
        (self.symbol_table, self.constants) = compiler.into_state();

        if let Err(e) = compiled {
            println!("{}", format!("compilation failed: {}", e).red());
            return;
        }

        if self.show_bytecode {
            print!("{}", disassemble(&bytecode.instructions));
        }

        let mut vm = Vm::with_globals(bytecode, Rc::clone(&self.globals));
        if let Err(e) = vm.run() {
            println!("{}", format!("runtime error: {}", e).red());
            return;
        }

        println!("{}", vm.last_popped_stack_elem());
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

fn new_symbol_table() -> SymbolTable {
    let mut table = SymbolTable::new();
    for (index, builtin) in BUILTINS.iter().enumerate() {
        table.define_builtin(index, builtin.name);
    }
    table
}

/// Start the REPL and run it until EOF.
pub fn start() {
    Repl::new().run();
}
