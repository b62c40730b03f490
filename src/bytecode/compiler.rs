//! Single-pass bytecode compiler: AST to instructions plus a constant pool.

use std::rc::Rc;

use crate::ast::{BlockStatement, Expr, ExprKind, Program, Stmt, StmtKind};
use crate::bytecode::builtins::BUILTINS;
use crate::bytecode::instruction::{make, Instructions, Op};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::bytecode::value::{CompiledFunction, Value};
use crate::bytecode::vm::GLOBALS_SIZE;
use crate::error::CompileError;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Operand capacity limits implied by the instruction encoding.
const MAX_CONSTANTS: usize = 65536;
const MAX_LOCALS: usize = 256;
const MAX_FREE_VARIABLES: usize = 256;

/// The compiled unit handed to the VM.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// The opcode and start position of an instruction already in the buffer.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Op,
    position: usize,
}

/// One function body under construction. Scopes stack: entering a function
/// literal pushes, leaving pops and yields the accumulated instructions.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Compiler {
    /// Create a compiler with a fresh symbol table, builtins pre-registered.
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Self::with_state(symbol_table, Vec::new())
    }

    /// Create a compiler that continues from existing state. The REPL uses
    /// this to keep the symbol table and constant pool across inputs.
    pub fn with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Hand the symbol table and constants back, e.g. for the next REPL
    /// input. A failed compile may have left partial definitions behind;
    /// callers that care must discard the state instead.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    /// Compile a whole program into the current scope.
    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// The finished instructions plus constant pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_instructions().clone(),
            constants: self.constants.clone(),
        }
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Op::Pop, &[]);
            }

            StmtKind::Let { name, value } => {
                self.compile_expression(value)?;

                let symbol = self.symbol_table.define(name);
                match symbol.scope {
                    SymbolScope::Global => {
                        if symbol.index >= GLOBALS_SIZE {
                            return Err(CompileError::TooManyGlobals);
                        }
                        self.emit(Op::SetGlobal, &[symbol.index]);
                    }
                    _ => {
                        if symbol.index >= MAX_LOCALS {
                            return Err(CompileError::TooManyLocals);
                        }
                        self.emit(Op::SetLocal, &[symbol.index]);
                    }
                }
            }

            StmtKind::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Op::ReturnValue, &[]);
            }
        }

        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> CompileResult<()> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::IntegerLiteral(value) => {
                let index = self.add_constant(Value::Int(*value))?;
                self.emit(Op::Constant, &[index]);
            }

            ExprKind::StringLiteral(value) => {
                let index = self.add_constant(Value::string(value.clone()))?;
                self.emit(Op::Constant, &[index]);
            }

            ExprKind::Boolean(value) => {
                if *value {
                    self.emit(Op::True, &[]);
                } else {
                    self.emit(Op::False, &[]);
                }
            }

            ExprKind::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol);
            }

            ExprKind::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(Op::Bang, &[]),
                    "-" => self.emit(Op::Minus, &[]),
                    other => return Err(CompileError::UnknownOperator(other.to_string())),
                };
            }

            ExprKind::Infix {
                operator,
                left,
                right,
            } => {
                // `<` is rewritten at compile time: operands swap and the
                // VM only ever sees a greater-than.
                if operator == "<" {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Op::GreaterThan, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;

                match operator.as_str() {
                    "+" => self.emit(Op::Add, &[]),
                    "-" => self.emit(Op::Sub, &[]),
                    "*" => self.emit(Op::Mul, &[]),
                    "/" => self.emit(Op::Div, &[]),
                    ">" => self.emit(Op::GreaterThan, &[]),
                    "==" => self.emit(Op::Equal, &[]),
                    "!=" => self.emit(Op::NotEqual, &[]),
                    other => return Err(CompileError::UnknownOperator(other.to_string())),
                };
            }

            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;

                // Placeholder operand, patched once the consequence length
                // is known.
                let jump_not_truthy_pos = self.emit(Op::JumpNotTruthy, &[9999]);

                self.compile_block(consequence)?;
                // The if-expression itself must leave a value on the stack.
                if self.last_instruction_is(Op::Pop) {
                    self.remove_last_pop();
                }

                let jump_pos = self.emit(Op::Jump, &[9999]);

                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_not_truthy_pos, after_consequence);

                match alternative {
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(Op::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_instructions().len();
                self.change_operand(jump_pos, after_alternative);
            }

            ExprKind::FunctionLiteral {
                parameters,
                body,
                name,
            } => {
                self.enter_scope();

                if let Some(name) = name {
                    self.symbol_table.define_function_name(name);
                }
                for parameter in parameters {
                    self.symbol_table.define(parameter);
                }

                self.compile_block(body)?;

                if self.last_instruction_is(Op::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Op::ReturnValue) {
                    self.emit(Op::Return, &[]);
                }

                let free_symbols = self.symbol_table.free_symbols.clone();
                let num_locals = self.symbol_table.num_definitions;
                let instructions = self.leave_scope();

                // The free count travels in a 1-byte operand.
                if free_symbols.len() >= MAX_FREE_VARIABLES {
                    return Err(CompileError::TooManyFreeVariables);
                }
                // Captured values are loaded in the enclosing scope, from
                // each free symbol's original home.
                for symbol in &free_symbols {
                    self.load_symbol(symbol);
                }

                let function = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len(),
                };
                let index = self.add_constant(Value::Function(Rc::new(function)))?;
                self.emit(Op::Closure, &[index, free_symbols.len()]);
            }

            ExprKind::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Op::Call, &[arguments.len()]);
            }

            ExprKind::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Op::Array, &[elements.len()]);
            }

            ExprKind::HashLiteral(pairs) => {
                // Source order is whatever the program wrote; sorting by the
                // keys' stringified form keeps constant pools reproducible.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Op::Hash, &[pairs.len() * 2]);
            }

            ExprKind::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Op::Index, &[]);
            }
        }

        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Op::CurrentClosure, &[]),
        };
    }

    // ===== Emitter =====

    /// Encode and append an instruction; returns its start position.
    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: Vec<u8>) -> usize {
        let position = self.current_instructions().len();
        self.current_scope_mut().instructions.extend(instruction);
        position
    }

    fn add_constant(&mut self, value: Value) -> CompileResult<usize> {
        if self.constants.len() >= MAX_CONSTANTS {
            return Err(CompileError::TooManyConstants);
        }
        self.constants.push(value);
        Ok(self.constants.len() - 1)
    }

    fn set_last_instruction(&mut self, opcode: Op, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: Op) -> bool {
        self.scopes[self.scope_index]
            .last_instruction
            .map_or(false, |last| last.opcode == op)
    }

    /// Truncate the trailing `OpPop` and roll `last_instruction` back.
    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        let last = scope.last_instruction.expect("no instruction to remove");
        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.previous_instruction;
    }

    /// Overwrite the instruction at `position` with a same-length encoding.
    fn replace_instruction(&mut self, position: usize, new_instruction: Vec<u8>) {
        let instructions = &mut self.current_scope_mut().instructions;
        instructions[position..position + new_instruction.len()].copy_from_slice(&new_instruction);
    }

    /// Re-encode the instruction at `op_pos` with a new operand. Only valid
    /// for opcodes whose encoded length does not change.
    fn change_operand(&mut self, op_pos: usize, operand: usize) {
        let op = Op::from_u8(self.current_instructions()[op_pos]).expect("invalid opcode at patch");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(op_pos, new_instruction);
    }

    fn replace_last_pop_with_return(&mut self) {
        let last_pos = self.scopes[self.scope_index]
            .last_instruction
            .expect("no instruction to replace")
            .position;
        self.replace_instruction(last_pos, make(Op::ReturnValue, &[]));

        if let Some(last) = &mut self.current_scope_mut().last_instruction {
            last.opcode = Op::ReturnValue;
        }
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scope_index].instructions
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        &mut self.scopes[self.scope_index]
    }

    // ===== Scope stack =====

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;

        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("scope stack underflow");
        self.scope_index -= 1;

        let table = std::mem::take(&mut self.symbol_table);
        self.symbol_table = table.into_outer().expect("symbol table underflow");

        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
