//! Kite: a small dynamically-typed language compiled to a compact
//! bytecode and executed on a stack-based virtual machine.
//!
//! The pipeline is `source -> tokens -> AST -> bytecode -> VM`:
//!
//! - [`lexer`]: hand-written scanner
//! - [`parser`]: Pratt parser producing the [`ast`]
//! - [`bytecode`]: instruction set, single-pass compiler and the VM
//! - [`repl`]: interactive loop with persistent state

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod span;

use bytecode::{Bytecode, Compiler, Value, Vm};
use error::KiteError;

/// Parse source code into an AST without compiling.
pub fn parse(source: &str) -> Result<ast::Program, KiteError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code to bytecode without executing.
pub fn compile(source: &str) -> Result<Bytecode, KiteError> {
    let program = parse(source)?;
    let mut compiler = Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}

/// Compile and run source code, returning the value of its final
/// expression statement.
pub fn run(source: &str) -> Result<Value, KiteError> {
    run_with_options(source, false)
}

/// Like [`run`], optionally dumping the compiled bytecode first.
pub fn run_with_options(source: &str, dump_bytecode: bool) -> Result<Value, KiteError> {
    let bytecode = compile(source)?;

    if dump_bytecode {
        print!("{}", bytecode::disassembler::disassemble_bytecode(&bytecode));
        println!("---");
    }

    let mut vm = Vm::new(bytecode);
    vm.run()?;
    Ok(vm.last_popped_stack_elem())
}

/// Read and run a script file.
pub fn run_file(path: &std::path::Path, dump_bytecode: bool) -> Result<Value, KiteError> {
    let source = std::fs::read_to_string(path)?;
    run_with_options(&source, dump_bytecode)
}

/// Disassemble compiled bytecode to a string.
pub fn disassemble(bytecode: &Bytecode) -> String {
    bytecode::disassembler::disassemble_bytecode(bytecode)
}
