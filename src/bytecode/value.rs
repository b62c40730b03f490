//! Runtime value domain shared by the compiler's constant pool and the VM.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::builtins::Builtin;
use crate::bytecode::instruction::Instructions;

/// Runtime type tags, used in error messages and hash keys.
pub const INTEGER: &str = "INTEGER";
pub const BOOLEAN: &str = "BOOLEAN";
pub const NULL: &str = "NULL";
pub const STRING: &str = "STRING";
pub const ARRAY: &str = "ARRAY";
pub const HASH: &str = "HASH";
pub const FUNCTION: &str = "COMPILED_FUNCTION";
pub const CLOSURE: &str = "CLOSURE";
pub const BUILTIN: &str = "BUILTIN";
pub const ERROR: &str = "ERROR";

/// A runtime value. Aggregates are reference-counted and immutable, so a
/// value may be shared between the constant pool, the stack, globals and
/// closure captures without copying.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Null,
    Str(Rc<String>),
    Array(Rc<Vec<Value>>),
    Hash(Rc<IndexMap<HashKey, HashPair>>),
    Function(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(&'static Builtin),
    Error(Rc<String>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::new(message.into()))
    }

    /// The runtime type tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => INTEGER,
            Value::Bool(_) => BOOLEAN,
            Value::Null => NULL,
            Value::Str(_) => STRING,
            Value::Array(_) => ARRAY,
            Value::Hash(_) => HASH,
            Value::Function(_) => FUNCTION,
            Value::Closure(_) => CLOSURE,
            Value::Builtin(_) => BUILTIN,
            Value::Error(_) => ERROR,
        }
    }

    /// Everything is truthy except `null` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    /// The hash key for this value, if it is hashable. Only integers,
    /// booleans and strings are.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Int(value) => Some(HashKey {
                kind: INTEGER,
                value: *value as u64,
            }),
            Value::Bool(value) => Some(HashKey {
                kind: BOOLEAN,
                value: u64::from(*value),
            }),
            Value::Str(value) => Some(HashKey {
                kind: STRING,
                value: fnv1a_64(value.as_bytes()),
            }),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// The `inspect` form shown by `puts` and the REPL.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{}", value),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Null => write!(f, "null"),
            Value::Str(value) => write!(f, "{}", value),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::Function(_) => write!(f, "<fn>"),
            Value::Closure(_) => write!(f, "<closure>"),
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            Value::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}

/// Key identity for hash entries: the value's type tag plus a 64-bit hash.
/// Collisions across distinct keys are resolved by the host map, which
/// compares full `HashKey`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub kind: &'static str,
    pub value: u64,
}

/// A key/value entry of a hash, keeping the original key for display.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// A unit of compiled code: the body's instructions plus the frame layout
/// the VM needs to execute it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function paired with the values of its free variables,
/// captured when the closure was built.
#[derive(Debug, Clone)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// FNV-1a, 64-bit. Fixed by the hash-key contract for string keys.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_keys_match_by_content() {
        let hello1 = Value::string("Hello World");
        let hello2 = Value::string("Hello World");
        let diff = Value::string("My name is johnny");

        assert_eq!(hello1.hash_key(), hello2.hash_key());
        assert_ne!(hello1.hash_key(), diff.hash_key());
    }

    #[test]
    fn test_hash_keys_distinguish_types() {
        let one = Value::Int(1);
        let yes = Value::Bool(true);
        assert_ne!(one.hash_key(), yes.hash_key());
    }

    #[test]
    fn test_negative_integer_hash_key() {
        let key = Value::Int(-1).hash_key().unwrap();
        assert_eq!(key.value, (-1i64) as u64);
    }

    #[test]
    fn test_only_primitives_are_hashable() {
        assert!(Value::Null.hash_key().is_none());
        assert!(Value::Array(Rc::new(vec![])).hash_key().is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Int(0).is_truthy());
        assert!(Value::string("").is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_aggregate_equality_is_identity() {
        let shared = Rc::new(vec![Value::Int(1)]);
        let a = Value::Array(shared.clone());
        let b = Value::Array(shared);
        let c = Value::Array(Rc::new(vec![Value::Int(1)]));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_inspect_forms() {
        assert_eq!(Value::Int(5).to_string(), "5");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::string("hi").to_string(), "hi");
        assert_eq!(
            Value::Array(Rc::new(vec![Value::Int(1), Value::Int(2)])).to_string(),
            "[1, 2]"
        );
        assert_eq!(Value::error("boom").to_string(), "ERROR: boom");
    }

    #[test]
    fn test_fnv1a_reference_vector() {
        // Published FNV-1a/64 test vector.
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
    }
}
