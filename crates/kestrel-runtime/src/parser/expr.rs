//! Expression parsing (precedence climbing).

use crate::ast::*;
use crate::error::SyntaxError;
use crate::parser::{Parser, Precedence};
use crate::span::Span;
use crate::token::{Token, TokenKind};
use std::rc::Rc;

impl Parser {
    /// Parse an expression.
    pub(super) fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_assignment()
    }

    /// Assignment is right-associative and binds loosest.
    pub(super) fn parse_assignment(&mut self) -> Result<Expr, SyntaxError> {
        let target_token = self.peek().clone();
        let left = self.parse_precedence(Precedence::Lowest)?;

        let op = match self.peek().kind {
            TokenKind::Equal => AssignOp::Assign,
            TokenKind::PlusEqual => AssignOp::AddAssign,
            TokenKind::MinusEqual => AssignOp::SubAssign,
            _ => return Ok(left),
        };
        self.advance();

        let target = Self::assign_target(left)
            .ok_or_else(|| SyntaxError::new("Invalid assignment target", target_token.span.start))?;
        let value = self.parse_assignment()?;
        let span = Span::new(target_token.span.start, value.span().end);
        Ok(Expr::Assign {
            op,
            target,
            value: Box::new(value),
            span,
        })
    }

    fn assign_target(expr: Expr) -> Option<AssignTarget> {
        match expr {
            Expr::Identifier(name, _) => Some(AssignTarget::Identifier(name)),
            Expr::Member {
                object, property, ..
            } => Some(AssignTarget::Member { object, property }),
            _ => None,
        }
    }

    /// Parse binary operators binding tighter than `precedence`.
    pub(super) fn parse_precedence(&mut self, precedence: Precedence) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;

        loop {
            let next = Self::token_precedence(self.peek());
            if next <= precedence {
                break;
            }
            let operator = self.advance();
            let right = self.parse_precedence(next)?;
            let span = left.span().merge(right.span());
            left = match operator.kind {
                TokenKind::AmpAmp => Expr::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                },
                TokenKind::PipePipe => Expr::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                },
                kind => Expr::Binary {
                    op: Self::binary_op(kind),
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                },
            };
        }

        Ok(left)
    }

    fn token_precedence(token: &Token) -> Precedence {
        match token.kind {
            TokenKind::PipePipe => Precedence::Or,
            TokenKind::AmpAmp => Precedence::And,
            TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::EqualEqualEqual
            | TokenKind::BangEqualEqual => Precedence::Equality,
            TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => Precedence::Comparison,
            TokenKind::Plus | TokenKind::Minus => Precedence::Term,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Factor,
            _ => Precedence::Lowest,
        }
    }

    fn binary_op(kind: TokenKind) -> BinaryOp {
        match kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::EqualEqual => BinaryOp::Eq,
            TokenKind::BangEqual => BinaryOp::NotEq,
            TokenKind::EqualEqualEqual => BinaryOp::StrictEq,
            TokenKind::BangEqualEqual => BinaryOp::StrictNotEq,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEq,
            TokenKind::Greater => BinaryOp::Greater,
            _ => BinaryOp::GreaterEq,
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let token = self.advance();
                let operand = self.parse_unary()?;
                let span = token.span.merge(operand.span());
                let target = Self::assign_target(operand).ok_or_else(|| {
                    SyntaxError::new("Invalid increment/decrement operand", token.span.start)
                })?;
                return Ok(Expr::Update {
                    op: if token.kind == TokenKind::PlusPlus {
                        UpdateOp::Increment
                    } else {
                        UpdateOp::Decrement
                    },
                    prefix: true,
                    target,
                    span,
                });
            }
            _ => None,
        };

        match op {
            Some(op) => {
                let token = self.advance();
                let operand = self.parse_unary()?;
                let span = token.span.merge(operand.span());
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                    span,
                })
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.parse_call()?;
        let next = self.peek();
        if matches!(next.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) && !next.newline_before
        {
            let token = self.advance();
            let span = expr.span().merge(token.span);
            let start = expr.span().start;
            let target = Self::assign_target(expr).ok_or_else(|| {
                SyntaxError::new("Invalid increment/decrement operand", start)
            })?;
            return Ok(Expr::Update {
                op: if token.kind == TokenKind::PlusPlus {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                },
                prefix: false,
                target,
                span,
            });
        }
        Ok(expr)
    }

    /// Calls and member accesses.
    fn parse_call(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(TokenKind::LeftParen) {
                let paren = self.advance().span.start;
                let mut args = Vec::new();
                if !self.check(TokenKind::RightParen) {
                    loop {
                        args.push(self.parse_assignment()?);
                        if !self.match_token(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let close = self.consume(TokenKind::RightParen, "Expected ')' after arguments")?;
                let span = expr.span().merge(close.span);
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    paren,
                    span,
                };
            } else if self.match_token(TokenKind::Dot) {
                let property = self.advance();
                if property.kind != TokenKind::Identifier
                    && TokenKind::keyword(&property.lexeme).is_none()
                {
                    return Err(SyntaxError::new(
                        "Expected property name after '.'",
                        property.span.start,
                    ));
                }
                let span = expr.span().merge(property.span);
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: Rc::from(property.lexeme.as_str()),
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek().kind {
            TokenKind::Number => {
                let token = self.advance();
                let value: f64 = token
                    .lexeme
                    .parse()
                    .map_err(|_| SyntaxError::new("Invalid number literal", token.span.start))?;
                Ok(Expr::Number(value, token.span))
            }
            TokenKind::String => {
                let token = self.advance();
                Ok(Expr::String(Rc::from(token.lexeme.as_str()), token.span))
            }
            TokenKind::True | TokenKind::False => {
                let token = self.advance();
                Ok(Expr::Bool(token.kind == TokenKind::True, token.span))
            }
            TokenKind::Null => Ok(Expr::Null(self.advance().span)),
            TokenKind::Undefined => Ok(Expr::Undefined(self.advance().span)),
            TokenKind::Identifier => {
                let token = self.advance();
                Ok(Expr::Identifier(Rc::from(token.lexeme.as_str()), token.span))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RightParen, "Expected ')' after expression")?;
                Ok(inner)
            }
            TokenKind::LeftBrace => self.parse_object_literal(),
            TokenKind::Function => {
                let (literal, index) = self.parse_function_literal(true)?;
                Ok(Expr::Function { literal, index })
            }
            _ => Err(self.error_at_current("Expected expression")),
        }
    }

    fn parse_object_literal(&mut self) -> Result<Expr, SyntaxError> {
        let open = self.advance().span;
        let mut properties = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            let key = self.advance();
            let name: Rc<str> = match key.kind {
                TokenKind::Identifier | TokenKind::String | TokenKind::Number => {
                    Rc::from(key.lexeme.as_str())
                }
                _ if TokenKind::keyword(&key.lexeme).is_some() => Rc::from(key.lexeme.as_str()),
                _ => return Err(SyntaxError::new("Expected property name", key.span.start)),
            };
            self.consume(TokenKind::Colon, "Expected ':' after property name")?;
            let value = self.parse_assignment()?;
            properties.push((name, value));
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        let close = self.consume(TokenKind::RightBrace, "Expected '}' after object literal")?;
        Ok(Expr::Object(properties, open.merge(close.span)))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::parser::parse_program;

    fn expr(source: &str) -> Expr {
        match parse_program(source).unwrap().body.remove(0) {
            Stmt::Expr(expr, _) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let Expr::Binary { op, right, .. } = expr("x % 2 == 0") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Eq);
        assert!(matches!(*right, Expr::Number(n, _) if n == 0.0));
    }

    #[test]
    fn test_nested_call_parens_are_distinct() {
        let Expr::Call { paren, args, .. } = expr("b(c(d()),d())") else {
            panic!("expected call");
        };
        assert_eq!(paren, 1);
        let Expr::Call { paren: inner, .. } = &args[0] else {
            panic!("expected inner call");
        };
        assert_eq!(*inner, 3);
    }

    #[test]
    fn test_member_assignment() {
        let Expr::Assign { target, .. } = expr("c.d = 5") else {
            panic!("expected assignment");
        };
        assert!(matches!(target, AssignTarget::Member { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse_program("f() = 1").is_err());
    }

    #[test]
    fn test_object_literal_in_expression_position() {
        assert!(matches!(expr("x = { a: 1, 'b': 2 }"), Expr::Assign { .. }));
    }
}
