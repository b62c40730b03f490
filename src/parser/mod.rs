//! Pratt parser: tokens to AST.

use crate::ast::{BlockStatement, Expr, ExprKind, Program, Stmt, StmtKind};
use crate::error::ParserError;
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub type ParseResult<T> = Result<T, ParserError>;

/// Operator precedence levels (higher binds tighter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest = 0,
    Equals = 1,      // == !=
    LessGreater = 2, // < >
    Sum = 3,         // + -
    Product = 4,     // * /
    Prefix = 5,      // !x -x
    Call = 6,        // f(x)
    Index = 7,       // a[0]
}

fn precedence_of(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equals,
        TokenKind::Lt | TokenKind::Gt => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Asterisk | TokenKind::Slash => Precedence::Product,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// The parser for Kite.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    /// Parse a complete program.
    pub fn parse(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            statements.push(self.statement()?);
        }

        Ok(Program::new(statements))
    }

    // ===== Statements =====

    fn statement(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::Let => self.let_statement(),
            TokenKind::Return => self.return_statement(),
            _ => self.expression_statement(),
        }
    }

    fn let_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Let)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Assign)?;

        let mut value = self.expression(Precedence::Lowest)?;

        // Carry the binding name onto a bound function literal so its body
        // can refer to itself.
        if let ExprKind::FunctionLiteral {
            name: fn_name @ None,
            ..
        } = &mut value.kind
        {
            *fn_name = Some(name.clone());
        }

        let span = start_span.merge(self.previous_span());
        self.match_token(&TokenKind::Semicolon);

        Ok(Stmt::new(StmtKind::Let { name, value }, span))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Return)?;

        let value = self.expression(Precedence::Lowest)?;
        let span = start_span.merge(self.previous_span());
        self.match_token(&TokenKind::Semicolon);

        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression(Precedence::Lowest)?;
        let span = expr.span;
        self.match_token(&TokenKind::Semicolon);

        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    fn block_statement(&mut self) -> ParseResult<BlockStatement> {
        let start_span = self.current_span();
        self.expect(&TokenKind::LBrace)?;

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }

        self.expect(&TokenKind::RBrace)?;
        let span = start_span.merge(self.previous_span());

        Ok(BlockStatement { statements, span })
    }

    // ===== Expressions =====

    fn expression(&mut self, precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.prefix()?;

        while precedence < precedence_of(&self.peek().kind) {
            left = self.infix(left)?;
        }

        Ok(left)
    }

    fn prefix(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), span))
            }
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::IntegerLiteral(value), span))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::StringLiteral(value), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Boolean(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Boolean(false), span))
            }
            TokenKind::Bang | TokenKind::Minus => {
                let operator = self.advance().kind.to_string();
                let right = self.expression(Precedence::Prefix)?;
                let span = span.merge(right.span);
                Ok(Expr::new(
                    ExprKind::Prefix {
                        operator,
                        right: Box::new(right),
                    },
                    span,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression(Precedence::Lowest)?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::If => self.if_expression(),
            TokenKind::Fn => self.function_literal(),
            TokenKind::LBracket => self.array_literal(),
            TokenKind::LBrace => self.hash_literal(),
            TokenKind::Eof => Err(ParserError::UnexpectedEof(span)),
            other => Err(ParserError::NoPrefixRule(other.to_string(), span)),
        }
    }

    fn infix(&mut self, left: Expr) -> ParseResult<Expr> {
        match self.peek().kind {
            TokenKind::LParen => self.call_expression(left),
            TokenKind::LBracket => self.index_expression(left),
            _ => {
                let token = self.advance();
                let operator = token.kind.to_string();
                let precedence = precedence_of(&token.kind);
                let right = self.expression(precedence)?;
                let span = left.span.merge(right.span);
                Ok(Expr::new(
                    ExprKind::Infix {
                        operator,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                ))
            }
        }
    }

    fn if_expression(&mut self) -> ParseResult<Expr> {
        let start_span = self.current_span();
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LParen)?;
        let condition = self.expression(Precedence::Lowest)?;
        self.expect(&TokenKind::RParen)?;

        let consequence = self.block_statement()?;

        let alternative = if self.match_token(&TokenKind::Else) {
            Some(self.block_statement()?)
        } else {
            None
        };

        let span = start_span.merge(self.previous_span());
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            span,
        ))
    }

    fn function_literal(&mut self) -> ParseResult<Expr> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Fn)?;
        self.expect(&TokenKind::LParen)?;

        let mut parameters = Vec::new();
        if !self.check(&TokenKind::RParen) {
            parameters.push(self.expect_identifier()?);
            while self.match_token(&TokenKind::Comma) {
                parameters.push(self.expect_identifier()?);
            }
        }
        self.expect(&TokenKind::RParen)?;

        let body = self.block_statement()?;
        let span = start_span.merge(self.previous_span());

        Ok(Expr::new(
            ExprKind::FunctionLiteral {
                parameters,
                body,
                name: None,
            },
            span,
        ))
    }

    fn call_expression(&mut self, function: Expr) -> ParseResult<Expr> {
        self.expect(&TokenKind::LParen)?;

        let mut arguments = Vec::new();
        if !self.check(&TokenKind::RParen) {
            arguments.push(self.expression(Precedence::Lowest)?);
            while self.match_token(&TokenKind::Comma) {
                arguments.push(self.expression(Precedence::Lowest)?);
            }
        }
        self.expect(&TokenKind::RParen)?;

        let span = function.span.merge(self.previous_span());
        Ok(Expr::new(
            ExprKind::Call {
                function: Box::new(function),
                arguments,
            },
            span,
        ))
    }

    fn array_literal(&mut self) -> ParseResult<Expr> {
        let start_span = self.current_span();
        self.expect(&TokenKind::LBracket)?;

        let mut elements = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            elements.push(self.expression(Precedence::Lowest)?);
            while self.match_token(&TokenKind::Comma) {
                elements.push(self.expression(Precedence::Lowest)?);
            }
        }
        self.expect(&TokenKind::RBracket)?;

        let span = start_span.merge(self.previous_span());
        Ok(Expr::new(ExprKind::ArrayLiteral(elements), span))
    }

    fn hash_literal(&mut self) -> ParseResult<Expr> {
        let start_span = self.current_span();
        self.expect(&TokenKind::LBrace)?;

        let mut pairs = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key = self.expression(Precedence::Lowest)?;
            self.expect(&TokenKind::Colon)?;
            let value = self.expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;

        let span = start_span.merge(self.previous_span());
        Ok(Expr::new(ExprKind::HashLiteral(pairs), span))
    }

    fn index_expression(&mut self, left: Expr) -> ParseResult<Expr> {
        self.expect(&TokenKind::LBracket)?;
        let index = self.expression(Precedence::Lowest)?;
        self.expect(&TokenKind::RBracket)?;

        let span = left.span.merge(self.previous_span());
        Ok(Expr::new(
            ExprKind::Index {
                left: Box::new(left),
                index: Box::new(index),
            },
            span,
        ))
    }

    // ===== Token manipulation =====

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current - 1].clone()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParserError::unexpected_token(
                format!("'{}'", kind),
                format!("{}", self.peek().kind),
                self.current_span(),
            ))
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(ParserError::unexpected_token(
                "identifier",
                format!("{}", self.peek().kind),
                self.current_span(),
            )),
        }
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn previous_span(&self) -> Span {
        self.previous().span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;

    fn parse_program(source: &str) -> Program {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_expr(source: &str) -> Expr {
        let program = parse_program(source);
        assert_eq!(program.statements.len(), 1, "program: {}", program);
        match program.statements.into_iter().next().unwrap().kind {
            StmtKind::Expression(expr) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_let_statements() {
        let program = parse_program("let x = 5; let y = true; let foobar = y;");
        let names: Vec<_> = program
            .statements
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Let { name, .. } => name.clone(),
                other => panic!("expected let statement, got {:?}", other),
            })
            .collect();
        assert_eq!(names, vec!["x", "y", "foobar"]);
    }

    #[test]
    fn test_return_statement() {
        let program = parse_program("return 5;");
        assert!(matches!(
            program.statements[0].kind,
            StmtKind::Return(Expr {
                kind: ExprKind::IntegerLiteral(5),
                ..
            })
        ));
    }

    #[test]
    fn test_operator_precedence() {
        let tests = [
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b + c", "((a + b) + c)"),
            ("a + b - c", "((a + b) - c)"),
            ("a * b * c", "((a * b) * c)"),
            ("a + b / c", "(a + (b / c))"),
            ("a + b * c + d / e - f", "(((a + (b * c)) + (d / e)) - f)"),
            ("5 > 4 == 3 < 4", "((5 > 4) == (3 < 4))"),
            ("5 < 4 != 3 > 4", "((5 < 4) != (3 > 4))"),
            (
                "3 + 4 * 5 == 3 * 1 + 4 * 5",
                "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))",
            ),
            ("true", "true"),
            ("3 > 5 == false", "((3 > 5) == false)"),
            ("1 + (2 + 3) + 4", "((1 + (2 + 3)) + 4)"),
            ("(5 + 5) * 2", "((5 + 5) * 2)"),
            ("-(5 + 5)", "(-(5 + 5))"),
            ("!(true == true)", "(!(true == true))"),
            ("a + add(b * c) + d", "((a + add((b * c))) + d)"),
            (
                "add(a, b, 1, 2 * 3, 4 + 5, add(6, 7 * 8))",
                "add(a, b, 1, (2 * 3), (4 + 5), add(6, (7 * 8)))",
            ),
            (
                "a * [1, 2, 3, 4][b * c] * d",
                "((a * ([1, 2, 3, 4][(b * c)])) * d)",
            ),
            (
                "add(a * b[2], b[1], 2 * [1, 2][1])",
                "add((a * (b[2])), (b[1]), (2 * ([1, 2][1])))",
            ),
        ];

        for (input, expected) in tests {
            let program = parse_program(input);
            assert_eq!(program.to_string(), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_if_expression() {
        let expr = parse_expr("if (x < y) { x }");
        match expr.kind {
            ExprKind::If { alternative, .. } => assert!(alternative.is_none()),
            other => panic!("expected if expression, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_expression() {
        let expr = parse_expr("if (x < y) { x } else { y }");
        match expr.kind {
            ExprKind::If { alternative, .. } => assert!(alternative.is_some()),
            other => panic!("expected if expression, got {:?}", other),
        }
    }

    #[test]
    fn test_function_literal() {
        let expr = parse_expr("fn(x, y) { x + y; }");
        match expr.kind {
            ExprKind::FunctionLiteral {
                parameters, name, ..
            } => {
                assert_eq!(parameters, vec!["x", "y"]);
                assert_eq!(name, None);
            }
            other => panic!("expected function literal, got {:?}", other),
        }
    }

    #[test]
    fn test_let_names_function_literal() {
        let program = parse_program("let myFunction = fn() { };");
        match &program.statements[0].kind {
            StmtKind::Let { value, .. } => match &value.kind {
                ExprKind::FunctionLiteral { name, .. } => {
                    assert_eq!(name.as_deref(), Some("myFunction"));
                }
                other => panic!("expected function literal, got {:?}", other),
            },
            other => panic!("expected let statement, got {:?}", other),
        }
    }

    #[test]
    fn test_call_expression() {
        let expr = parse_expr("add(1, 2 * 3, 4 + 5);");
        match expr.kind {
            ExprKind::Call { arguments, .. } => assert_eq!(arguments.len(), 3),
            other => panic!("expected call expression, got {:?}", other),
        }
    }

    #[test]
    fn test_string_literal() {
        let expr = parse_expr(r#""hello world";"#);
        assert_eq!(
            expr.kind,
            ExprKind::StringLiteral("hello world".to_string())
        );
    }

    #[test]
    fn test_array_literal() {
        let expr = parse_expr("[1, 2 * 2, 3 + 3]");
        match expr.kind {
            ExprKind::ArrayLiteral(elements) => assert_eq!(elements.len(), 3),
            other => panic!("expected array literal, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_hash_literal() {
        let expr = parse_expr("{}");
        match expr.kind {
            ExprKind::HashLiteral(pairs) => assert!(pairs.is_empty()),
            other => panic!("expected hash literal, got {:?}", other),
        }
    }

    #[test]
    fn test_hash_literal_with_expressions() {
        let expr = parse_expr(r#"{"one": 0 + 1, "two": 10 - 8, "three": 15 / 5}"#);
        match expr.kind {
            ExprKind::HashLiteral(pairs) => {
                assert_eq!(pairs.len(), 3);
                assert_eq!(pairs[0].0.to_string(), "one");
                assert_eq!(pairs[0].1.to_string(), "(0 + 1)");
            }
            other => panic!("expected hash literal, got {:?}", other),
        }
    }

    #[test]
    fn test_no_prefix_rule_error() {
        let tokens = Scanner::new("let x = ;").scan_tokens().unwrap();
        let err = Parser::new(tokens).parse().unwrap_err();
        assert!(matches!(err, ParserError::NoPrefixRule(_, _)));
    }
}
