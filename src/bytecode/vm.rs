//! Stack-based virtual machine executing compiled bytecode.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::builtins::{Builtin, BUILTINS};
use crate::bytecode::compiler::Bytecode;
use crate::bytecode::instruction::{read_u16, read_u8, Op};
use crate::bytecode::value::{Closure, CompiledFunction, HashPair, Value};
use crate::error::RuntimeError;

/// Value stack capacity; the 2049th push without a pop overflows.
pub const STACK_SIZE: usize = 2048;
/// Global binding slots, bounded by the 2-byte operand width.
pub const GLOBALS_SIZE: usize = 65536;
/// Call depth bound.
pub const MAX_FRAMES: usize = 1024;

/// Result type for VM execution.
pub type VmResult<T> = Result<T, RuntimeError>;

/// One active call: the closure being executed, its instruction pointer,
/// and where its locals start on the value stack.
#[derive(Debug)]
struct Frame {
    closure: Rc<Closure>,
    /// Starts at -1 so the fetch loop's pre-increment lands on 0.
    ip: i64,
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    fn instructions(&self) -> &[u8] {
        &self.closure.func.instructions
    }
}

/// A fresh globals slab, shareable between VM instances (the REPL reuses
/// one slab across inputs).
pub fn new_globals() -> Rc<RefCell<Vec<Value>>> {
    Rc::new(RefCell::new(vec![Value::Null; GLOBALS_SIZE]))
}

/// The virtual machine.
pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Always points at the next free slot; the top of the stack is
    /// `stack[sp - 1]`.
    sp: usize,
    globals: Rc<RefCell<Vec<Value>>>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, new_globals())
    }

    /// Build a VM over an existing globals slab.
    pub fn with_globals(bytecode: Bytecode, globals: Rc<RefCell<Vec<Value>>>) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_fn,
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// The value most recently popped off the stack. After a full run this
    /// is the result of the program's final expression statement.
    pub fn last_popped_stack_elem(&self) -> Value {
        self.stack[self.sp].clone()
    }

    /// The fetch/decode/execute loop. A returned error aborts the run; the
    /// VM must be rebuilt before being run again.
    pub fn run(&mut self) -> VmResult<()> {
        while self.current_frame().ip < self.current_frame().instructions().len() as i64 - 1 {
            self.current_frame_mut().ip += 1;
            let ip = self.current_frame().ip as usize;
            let op = Op::lookup(self.current_frame().instructions()[ip])?;

            match op {
                Op::Constant => {
                    let const_index = self.read_u16_operand(ip);
                    let constant = self.constants[const_index].clone();
                    self.push(constant)?;
                }

                Op::Add | Op::Sub | Op::Mul | Op::Div => {
                    self.execute_binary_operation(op)?;
                }

                Op::Pop => {
                    self.pop();
                }

                Op::True => self.push(Value::Bool(true))?,
                Op::False => self.push(Value::Bool(false))?,
                Op::Null => self.push(Value::Null)?,

                Op::Equal | Op::NotEqual | Op::GreaterThan => {
                    self.execute_comparison(op)?;
                }

                Op::Bang => {
                    let operand = self.pop();
                    self.push(Value::Bool(!operand.is_truthy()))?;
                }

                Op::Minus => {
                    let operand = self.pop();
                    match operand {
                        Value::Int(value) => self.push(Value::Int(value.wrapping_neg()))?,
                        other => {
                            return Err(RuntimeError::UnsupportedNegation(other.type_name()));
                        }
                    }
                }

                Op::Jump => {
                    let target = self.read_u16_operand(ip);
                    // The loop pre-increments, so land one byte short.
                    self.current_frame_mut().ip = target as i64 - 1;
                }

                Op::JumpNotTruthy => {
                    let target = self.read_u16_operand(ip);
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target as i64 - 1;
                    }
                }

                Op::SetGlobal => {
                    let global_index = self.read_u16_operand(ip);
                    let value = self.pop();
                    self.globals.borrow_mut()[global_index] = value;
                }

                Op::GetGlobal => {
                    let global_index = self.read_u16_operand(ip);
                    let value = self.globals.borrow()[global_index].clone();
                    self.push(value)?;
                }

                Op::Array => {
                    let num_elements = self.read_u16_operand(ip);
                    let array = self.build_array(self.sp - num_elements, self.sp);
                    self.sp -= num_elements;
                    self.push(array)?;
                }

                Op::Hash => {
                    let num_elements = self.read_u16_operand(ip);
                    let hash = self.build_hash(self.sp - num_elements, self.sp)?;
                    self.sp -= num_elements;
                    self.push(hash)?;
                }

                Op::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index_expression(left, index)?;
                }

                Op::Call => {
                    let num_args = self.read_u8_operand(ip);
                    self.execute_call(num_args)?;
                }

                Op::ReturnValue => {
                    let return_value = self.pop();
                    let frame = self.pop_frame();
                    if self.frames.is_empty() {
                        // A `return` at the top level ends the program with
                        // the returned value as the final result.
                        self.sp = frame.base_pointer;
                        self.stack[self.sp] = return_value;
                        return Ok(());
                    }
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }

                Op::Return => {
                    let frame = self.pop_frame();
                    if self.frames.is_empty() {
                        self.sp = frame.base_pointer;
                        self.stack[self.sp] = Value::Null;
                        return Ok(());
                    }
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }

                Op::SetLocal => {
                    let local_index = self.read_u8_operand(ip);
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base_pointer + local_index] = value;
                }

                Op::GetLocal => {
                    let local_index = self.read_u8_operand(ip);
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + local_index].clone();
                    self.push(value)?;
                }

                Op::GetBuiltin => {
                    let builtin_index = self.read_u8_operand(ip);
                    self.push(Value::Builtin(&BUILTINS[builtin_index]))?;
                }

                Op::Closure => {
                    let ins = self.current_frame().instructions();
                    let const_index = read_u16(&ins[ip + 1..]) as usize;
                    let num_free = read_u8(&ins[ip + 3..]) as usize;
                    self.current_frame_mut().ip += 3;
                    self.push_closure(const_index, num_free)?;
                }

                Op::GetFree => {
                    let free_index = self.read_u8_operand(ip);
                    let current = Rc::clone(&self.current_frame().closure);
                    self.push(current.free[free_index].clone())?;
                }

                Op::CurrentClosure => {
                    let current = Rc::clone(&self.current_frame().closure);
                    self.push(Value::Closure(current))?;
                }
            }
        }

        Ok(())
    }

    // ===== Operand decoding =====

    fn read_u16_operand(&mut self, ip: usize) -> usize {
        let value = read_u16(&self.current_frame().instructions()[ip + 1..]) as usize;
        self.current_frame_mut().ip += 2;
        value
    }

    fn read_u8_operand(&mut self, ip: usize) -> usize {
        let value = read_u8(&self.current_frame().instructions()[ip + 1..]) as usize;
        self.current_frame_mut().ip += 1;
        value
    }

    // ===== Stack =====

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        let value = self.stack[self.sp - 1].clone();
        self.sp -= 1;
        value
    }

    // ===== Frames =====

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    fn push_frame(&mut self, frame: Frame) -> VmResult<()> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }
        self.frames.push(frame);
        Ok(())
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("frame stack underflow")
    }

    // ===== Operators =====

    fn execute_binary_operation(&mut self, op: Op) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        match (left, right) {
            (Value::Int(left), Value::Int(right)) => {
                self.execute_binary_integer_operation(op, left, right)
            }
            (Value::Str(left), Value::Str(right)) => {
                self.execute_binary_string_operation(op, &left, &right)
            }
            (left, right) => Err(RuntimeError::UnsupportedBinaryTypes(
                left.type_name(),
                right.type_name(),
            )),
        }
    }

    fn execute_binary_integer_operation(&mut self, op: Op, left: i64, right: i64) -> VmResult<()> {
        let result = match op {
            Op::Add => left.wrapping_add(right),
            Op::Sub => left.wrapping_sub(right),
            Op::Mul => left.wrapping_mul(right),
            Op::Div => left.wrapping_div(right),
            other => return Err(RuntimeError::UnknownIntegerOperator(other.name())),
        };
        self.push(Value::Int(result))
    }

    fn execute_binary_string_operation(&mut self, op: Op, left: &str, right: &str) -> VmResult<()> {
        if op != Op::Add {
            return Err(RuntimeError::UnknownStringOperator(op.name()));
        }
        self.push(Value::string(format!("{}{}", left, right)))
    }

    fn execute_comparison(&mut self, op: Op) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        if let (Value::Int(left), Value::Int(right)) = (&left, &right) {
            return self.execute_integer_comparison(op, *left, *right);
        }

        match op {
            Op::Equal => self.push(Value::Bool(left == right)),
            Op::NotEqual => self.push(Value::Bool(left != right)),
            other => Err(RuntimeError::UnknownComparisonOperator {
                op: other.name(),
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn execute_integer_comparison(&mut self, op: Op, left: i64, right: i64) -> VmResult<()> {
        let result = match op {
            Op::Equal => left == right,
            Op::NotEqual => left != right,
            Op::GreaterThan => left > right,
            other => return Err(RuntimeError::UnknownIntegerOperator(other.name())),
        };
        self.push(Value::Bool(result))
    }

    // ===== Composites =====

    fn build_array(&self, start: usize, end: usize) -> Value {
        Value::Array(Rc::new(self.stack[start..end].to_vec()))
    }

    fn build_hash(&self, start: usize, end: usize) -> VmResult<Value> {
        let mut pairs = IndexMap::new();

        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let hash_key = key
                .hash_key()
                .ok_or_else(|| RuntimeError::UnusableHashKey(key.type_name()))?;
            pairs.insert(hash_key, HashPair { key, value });

            i += 2;
        }

        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> VmResult<()> {
        match (left, index) {
            (Value::Array(elements), Value::Int(index)) => {
                let value = if index < 0 || index as usize >= elements.len() {
                    Value::Null
                } else {
                    elements[index as usize].clone()
                };
                self.push(value)
            }
            (Value::Hash(pairs), index) => {
                let hash_key = index
                    .hash_key()
                    .ok_or_else(|| RuntimeError::UnusableHashKey(index.type_name()))?;
                let value = pairs
                    .get(&hash_key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            (left, _) => Err(RuntimeError::UnsupportedIndex(left.type_name())),
        }
    }

    // ===== Calls =====

    fn execute_call(&mut self, num_args: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => Err(RuntimeError::CallingNonFunction),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> VmResult<()> {
        if num_args != closure.func.num_parameters {
            return Err(RuntimeError::WrongArgumentCount {
                want: closure.func.num_parameters,
                got: num_args,
            });
        }

        let base_pointer = self.sp - num_args;
        let num_locals = closure.func.num_locals;
        if base_pointer + num_locals > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.push_frame(Frame::new(closure, base_pointer))?;
        // Arguments already sit in the first `num_args` local slots; the
        // rest are reserved by bumping sp.
        self.sp = base_pointer + num_locals;

        Ok(())
    }

    fn call_builtin(&mut self, builtin: &'static Builtin, num_args: usize) -> VmResult<()> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = (builtin.func)(&args);

        // Drop the arguments and the callee slot, then push the result.
        self.sp = self.sp - num_args - 1;
        self.push(result)
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> VmResult<()> {
        let constant = self.constants[const_index].clone();
        let Value::Function(func) = constant else {
            return Err(RuntimeError::NotAFunction(constant.to_string()));
        };

        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;

        self.push(Value::Closure(Rc::new(Closure { func, free })))
    }
}
