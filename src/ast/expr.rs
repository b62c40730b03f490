//! Expression AST nodes.

use std::fmt;

use crate::ast::stmt::BlockStatement;
use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Variable reference: `foo`
    Identifier(String),
    /// Integer literal: `42`
    IntegerLiteral(i64),
    /// Boolean literal: `true`, `false`
    Boolean(bool),
    /// String literal: `"hello"`
    StringLiteral(String),

    /// Prefix operation: `!x`, `-x`
    Prefix { operator: String, right: Box<Expr> },

    /// Infix operation: `a + b`
    Infix {
        operator: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Conditional expression: `if (cond) { ... } else { ... }`
    If {
        condition: Box<Expr>,
        consequence: BlockStatement,
        alternative: Option<BlockStatement>,
    },

    /// Function literal: `fn(x, y) { ... }`. `name` is filled in by the
    /// parser when the literal is the value of a `let`, so the body can
    /// refer to itself under that binding.
    FunctionLiteral {
        parameters: Vec<String>,
        body: BlockStatement,
        name: Option<String>,
    },

    /// Function call: `f(a, b)`
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },

    /// Array literal: `[1, 2, 3]`
    ArrayLiteral(Vec<Expr>),

    /// Hash literal: `{"a": 1, "b": 2}`
    HashLiteral(Vec<(Expr, Expr)>),

    /// Index expression: `arr[0]`, `hash["key"]`
    Index { left: Box<Expr>, index: Box<Expr> },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Identifier(name) => write!(f, "{}", name),
            ExprKind::IntegerLiteral(value) => write!(f, "{}", value),
            ExprKind::Boolean(value) => write!(f, "{}", value),
            ExprKind::StringLiteral(value) => write!(f, "{}", value),
            ExprKind::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            ExprKind::Infix {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{} {}", condition, consequence)?;
                if let Some(alt) = alternative {
                    write!(f, "else {}", alt)?;
                }
                Ok(())
            }
            ExprKind::FunctionLiteral {
                parameters,
                body,
                name,
            } => {
                write!(f, "fn")?;
                if let Some(name) = name {
                    write!(f, "<{}>", name)?;
                }
                write!(f, "({}) {}", parameters.join(", "), body)
            }
            ExprKind::Call {
                function,
                arguments,
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, args.join(", "))
            }
            ExprKind::ArrayLiteral(elements) => {
                let elems: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elems.join(", "))
            }
            ExprKind::HashLiteral(pairs) => {
                let pairs: Vec<String> = pairs.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            ExprKind::Index { left, index } => write!(f, "({}[{}])", left, index),
        }
    }
}
