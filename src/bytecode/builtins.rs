//! Built-in functions.
//!
//! The registry order is part of the compile/run contract: the compiler
//! resolves builtin names to indices into this table and the VM fetches
//! them back by the same index. Type and arity mistakes are returned as
//! error *values* so user code can observe them.

use std::rc::Rc;

use crate::bytecode::value::{Value, ARRAY};

/// A built-in function with its registry name.
pub struct Builtin {
    pub name: &'static str,
    pub func: fn(&[Value]) -> Value,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

/// The fixed, ordered builtin registry.
pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "puts",
        func: builtin_puts,
    },
    Builtin {
        name: "first",
        func: builtin_first,
    },
    Builtin {
        name: "last",
        func: builtin_last,
    },
    Builtin {
        name: "rest",
        func: builtin_rest,
    },
    Builtin {
        name: "push",
        func: builtin_push,
    },
];

/// Look up a builtin by name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

fn wrong_arguments(got: usize, want: usize) -> Value {
    Value::error(format!("wrong number of arguments. got={}, want={}", got, want))
}

fn builtin_len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }
    match &args[0] {
        Value::Str(s) => Value::Int(s.len() as i64),
        Value::Array(elements) => Value::Int(elements.len() as i64),
        other => Value::error(format!(
            "argument to 'len' not supported, got {}",
            other.type_name()
        )),
    }
}

fn builtin_puts(args: &[Value]) -> Value {
    for arg in args {
        println!("{}", arg);
    }
    Value::Null
}

fn builtin_first(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => elements.first().cloned().unwrap_or(Value::Null),
        other => Value::error(format!(
            "argument to 'first' must be {}, got {}",
            ARRAY,
            other.type_name()
        )),
    }
}

fn builtin_last(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => elements.last().cloned().unwrap_or(Value::Null),
        other => Value::error(format!(
            "argument to 'last' must be {}, got {}",
            ARRAY,
            other.type_name()
        )),
    }
}

fn builtin_rest(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arguments(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                Value::Null
            } else {
                Value::Array(Rc::new(elements[1..].to_vec()))
            }
        }
        other => Value::error(format!(
            "argument to 'rest' must be {}, got {}",
            ARRAY,
            other.type_name()
        )),
    }
}

fn builtin_push(args: &[Value]) -> Value {
    if args.len() != 2 {
        return wrong_arguments(args.len(), 2);
    }
    match &args[0] {
        Value::Array(elements) => {
            let mut extended = elements.as_ref().clone();
            extended.push(args[1].clone());
            Value::Array(Rc::new(extended))
        }
        other => Value::error(format!(
            "argument to 'push' must be {}, got {}",
            ARRAY,
            other.type_name()
        )),
    }
}
