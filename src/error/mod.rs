//! Error types for every phase of the pipeline.

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("invalid escape sequence '\\{0}' at {1}")]
    InvalidEscape(char, Span),

    #[error("integer literal '{0}' out of range at {1}")]
    IntegerOutOfRange(String, Span),
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidEscape(_, span) => *span,
            Self::IntegerOutOfRange(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("expected {expected}, found '{found}' at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("no prefix parse rule for '{0}' at {1}")]
    NoPrefixRule(String, Span),

    #[error("unexpected end of input at {0}")]
    UnexpectedEof(Span),
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::NoPrefixRule(_, span) => *span,
            Self::UnexpectedEof(span) => *span,
        }
    }
}

impl From<LexerError> for ParserError {
    fn from(err: LexerError) -> Self {
        Self::UnexpectedToken {
            expected: "valid token".to_string(),
            found: err.to_string(),
            span: err.span(),
        }
    }
}

/// Bytecode compilation errors. Bytecode carries no source positions, so
/// these are message-shaped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown operator {0}")]
    UnknownOperator(String),

    #[error("undefined variable {0}")]
    UndefinedVariable(String),

    #[error("too many global bindings")]
    TooManyGlobals,

    #[error("too many constants")]
    TooManyConstants,

    #[error("too many local bindings in function")]
    TooManyLocals,

    #[error("too many free variables in function")]
    TooManyFreeVariables,
}

/// Runtime errors raised by the virtual machine. Each aborts the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("frame overflow")]
    FrameOverflow,

    #[error("opcode {0} undefined")]
    UndefinedOpcode(u8),

    #[error("unsupported types for binary operation: {0} {1}")]
    UnsupportedBinaryTypes(&'static str, &'static str),

    #[error("unknown operator: {op} ({left} {right})")]
    UnknownComparisonOperator {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("unknown integer operator: {0}")]
    UnknownIntegerOperator(&'static str),

    #[error("unknown string operator: {0}")]
    UnknownStringOperator(&'static str),

    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),

    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),

    #[error("index operator not supported: {0}")]
    UnsupportedIndex(&'static str),

    #[error("calling non-function")]
    CallingNonFunction,

    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArgumentCount { want: usize, got: usize },

    #[error("not a function: {0}")]
    NotAFunction(String),
}

/// A unified error type for callers that drive the whole pipeline.
#[derive(Debug, Error)]
pub enum KiteError {
    #[error("lex error: {0}")]
    Lexer(#[from] LexerError),

    #[error("parse error: {0}")]
    Parser(#[from] ParserError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
