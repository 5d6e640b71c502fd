//! Parsing (tokens to AST).
//!
//! Recursive descent for statements, precedence climbing for expressions.
//! Semicolons are inserted automatically before `}`, at end of input and
//! across line breaks.

mod expr;
mod stmt;

use crate::ast::*;
use crate::error::SyntaxError;
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{Token, TokenKind};
use std::rc::Rc;

/// Parser state for building AST from tokens.
pub struct Parser {
    pub(super) tokens: Vec<Token>,
    pub(super) current: usize,
    /// Function literal counters, one per function being parsed.
    literal_counters: Vec<usize>,
}

/// Operator precedence levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Precedence {
    Lowest,
    Or,         // ||
    And,        // &&
    Equality,   // == != === !==
    Comparison, // < <= > >=
    Term,       // + -
    Factor,     // * / %
}

/// Parse a complete script.
pub fn parse_program(source: &str) -> Result<Program, SyntaxError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let body = parser.parse_statements_until_eof()?;
    Ok(Program {
        body,
        end: source.chars().count() as u32,
    })
}

impl Parser {
    /// Create a new parser for the given tokens.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            literal_counters: vec![0],
        }
    }

    fn parse_statements_until_eof(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut body = Vec::new();
        while !self.is_at_end() {
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    /// Parse `function [name](params) { body }`, returning the literal and
    /// its slot in the enclosing function.
    pub(super) fn parse_function_literal(
        &mut self,
        is_expression: bool,
    ) -> Result<(Rc<FunctionLiteral>, usize), SyntaxError> {
        let start = self
            .consume(TokenKind::Function, "Expected 'function'")?
            .span
            .start;

        let name = if self.check(TokenKind::Identifier) {
            Some(Rc::from(self.advance().lexeme.as_str()))
        } else if is_expression {
            None
        } else {
            return Err(self.error_at_current("Expected function name"));
        };

        self.consume(TokenKind::LeftParen, "Expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                let param = self.consume(TokenKind::Identifier, "Expected parameter name")?;
                params.push(Rc::from(param.lexeme.as_str()));
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' after parameters")?;
        self.consume(TokenKind::LeftBrace, "Expected '{' before function body")?;

        let index = self.next_literal_index();
        self.literal_counters.push(0);
        let body = self.parse_block_body();
        self.literal_counters.pop();
        let body = body?;

        let close = self.consume(TokenKind::RightBrace, "Expected '}' after function body")?;
        let body_end = close.span.start;

        let literal = FunctionLiteral {
            name,
            params,
            body,
            span: Span::new(start, close.span.end),
            body_end,
            is_expression,
        };
        Ok((Rc::new(literal), index))
    }

    fn next_literal_index(&mut self) -> usize {
        match self.literal_counters.last_mut() {
            Some(counter) => {
                let index = *counter;
                *counter += 1;
                index
            }
            None => 0,
        }
    }

    /// Statements up to (not including) the closing brace.
    pub(super) fn parse_block_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    // === Token helpers ===

    pub(super) fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    pub(super) fn peek_next(&self) -> &Token {
        &self.tokens[(self.current + 1).min(self.tokens.len() - 1)]
    }

    pub(super) fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    pub(super) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(super) fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub(super) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    pub(super) fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(super) fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, SyntaxError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    /// Consume a statement terminator, inserting one where permitted.
    pub(super) fn consume_semicolon(&mut self) -> Result<(), SyntaxError> {
        if self.match_token(TokenKind::Semicolon) {
            return Ok(());
        }
        let next = self.peek();
        if next.kind == TokenKind::RightBrace || next.kind == TokenKind::Eof || next.newline_before
        {
            return Ok(());
        }
        Err(self.error_at_current("Expected ';'"))
    }

    pub(super) fn error_at_current(&self, message: &str) -> SyntaxError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            SyntaxError::new("Unexpected end of input", token.span.start)
        } else {
            SyntaxError::new(
                format!("{}, found '{}'", message, token.lexeme),
                token.span.start,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_function_literal_span_and_index() {
        let program = parse_program("function a(){} function b(x, y){ return x; }").unwrap();
        match &program.body[1] {
            Stmt::FunctionDecl { literal, index } => {
                assert_eq!(*index, 1);
                assert_eq!(literal.name.as_deref(), Some("b"));
                assert_eq!(literal.params.len(), 2);
                assert_eq!(literal.span.start, 15);
                assert_eq!(literal.body_end, 43);
                assert_eq!(literal.span.end, 44);
            }
            other => panic!("expected function declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_literal_indices_are_per_function() {
        let program =
            parse_program("function f(){ function g(){} var h = function(){}; } function k(){}")
                .unwrap();
        let Stmt::FunctionDecl { literal, index } = &program.body[0] else {
            panic!("expected declaration");
        };
        assert_eq!(*index, 0);
        assert!(matches!(literal.body[0], Stmt::FunctionDecl { index: 0, .. }));
        let Stmt::Var(decls, _) = &literal.body[1] else {
            panic!("expected var");
        };
        assert!(matches!(decls[0].init, Some(Expr::Function { index: 1, .. })));
        assert!(matches!(program.body[1], Stmt::FunctionDecl { index: 1, .. }));
    }

    #[test]
    fn test_semicolon_insertion() {
        let program = parse_program("a = 0 // line 0\nb = 1\n{ c = 2 }").unwrap();
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn test_missing_semicolon_on_same_line_is_error() {
        let err = parse_program("x x").unwrap_err();
        assert_eq!(err.position, 2);
    }

    #[test]
    fn test_incomplete_expression_is_error() {
        assert!(parse_program("+++").is_err());
    }

    #[test]
    fn test_program_end_counts_characters() {
        let program = parse_program("x = 'é';").unwrap();
        assert_eq!(program.end, 8);
    }
}
