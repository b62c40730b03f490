//! Abstract syntax tree produced by the parser.

pub mod expr;
pub mod stmt;

pub use expr::{Expr, ExprKind};
pub use stmt::{BlockStatement, Program, Stmt, StmtKind};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    #[test]
    fn test_program_display() {
        let program = Program::new(vec![Stmt::new(
            StmtKind::Let {
                name: "myVar".to_string(),
                value: Expr::new(
                    ExprKind::Identifier("anotherVar".to_string()),
                    Span::default(),
                ),
            },
            Span::default(),
        )]);
        assert_eq!(program.to_string(), "let myVar = anotherVar;");
    }

    #[test]
    fn test_infix_display_parenthesizes() {
        let expr = Expr::new(
            ExprKind::Infix {
                operator: "+".to_string(),
                left: Box::new(Expr::new(ExprKind::IntegerLiteral(1), Span::default())),
                right: Box::new(Expr::new(
                    ExprKind::Infix {
                        operator: "*".to_string(),
                        left: Box::new(Expr::new(ExprKind::IntegerLiteral(2), Span::default())),
                        right: Box::new(Expr::new(ExprKind::IntegerLiteral(3), Span::default())),
                    },
                    Span::default(),
                )),
            },
            Span::default(),
        );
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");
    }
}
