//! Statement parsing.

use crate::ast::*;
use crate::error::SyntaxError;
use crate::parser::Parser;
use crate::span::Span;
use crate::token::TokenKind;
use std::rc::Rc;

impl Parser {
    /// Parse a statement.
    pub(super) fn parse_statement(&mut self) -> Result<Stmt, SyntaxError> {
        match self.peek().kind {
            TokenKind::LeftBrace => self.parse_block(),
            TokenKind::Var => self.parse_var_statement(),
            TokenKind::Function => {
                let (literal, index) = self.parse_function_literal(false)?;
                Ok(Stmt::FunctionDecl { literal, index })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Throw => self.parse_throw(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Break | TokenKind::Continue => self.parse_jump(),
            TokenKind::Debugger => {
                let span = self.advance().span;
                self.consume_semicolon()?;
                Ok(Stmt::Debugger(span))
            }
            TokenKind::Semicolon => {
                let span = self.advance().span;
                Ok(Stmt::Empty(span))
            }
            TokenKind::Identifier if self.peek_next().kind == TokenKind::Colon => {
                self.parse_labeled()
            }
            _ => {
                let expr = self.parse_expression()?;
                let span = expr.span();
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr, span))
            }
        }
    }

    fn parse_block(&mut self) -> Result<Stmt, SyntaxError> {
        let open = self.consume(TokenKind::LeftBrace, "Expected '{'")?.span;
        let stmts = self.parse_block_body()?;
        let close = self.consume(TokenKind::RightBrace, "Expected '}'")?.span;
        Ok(Stmt::Block(stmts, open.merge(close)))
    }

    /// Parse a braced block, returning its statements only.
    fn parse_braced(&mut self, context: &str) -> Result<Vec<Stmt>, SyntaxError> {
        self.consume(TokenKind::LeftBrace, context)?;
        let stmts = self.parse_block_body()?;
        self.consume(TokenKind::RightBrace, "Expected '}'")?;
        Ok(stmts)
    }

    fn parse_var_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let (decls, span) = self.parse_var_declarations()?;
        self.consume_semicolon()?;
        Ok(Stmt::Var(decls, span))
    }

    /// `var a = 1, b` without the terminator.
    fn parse_var_declarations(&mut self) -> Result<(Vec<VarDeclarator>, Span), SyntaxError> {
        let start = self.consume(TokenKind::Var, "Expected 'var'")?.span;
        let mut decls = Vec::new();
        let mut span = start;
        loop {
            let name_token = self.consume(TokenKind::Identifier, "Expected variable name")?;
            let mut decl_span = name_token.span;
            let init = if self.match_token(TokenKind::Equal) {
                let value = self.parse_assignment()?;
                decl_span = decl_span.merge(value.span());
                Some(value)
            } else {
                None
            };
            span = span.merge(decl_span);
            decls.push(VarDeclarator {
                name: Rc::from(name_token.lexeme.as_str()),
                init,
                span: decl_span,
            });
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        Ok((decls, span))
    }

    fn parse_if(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'if'")?;
        let cond = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')' after condition")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.match_token(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        let end = self.previous().span;
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
            span: start.merge(end),
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'while'")?;
        let cond = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')' after condition")?;
        let body = Box::new(self.parse_statement()?);
        let end = self.previous().span;
        Ok(Stmt::While {
            cond,
            body,
            span: start.merge(end),
        })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        let body = Box::new(self.parse_statement()?);
        self.consume(TokenKind::While, "Expected 'while' after do body")?;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'while'")?;
        let cond = self.parse_expression()?;
        let end = self
            .consume(TokenKind::RightParen, "Expected ')' after condition")?
            .span;
        self.match_token(TokenKind::Semicolon);
        Ok(Stmt::DoWhile {
            body,
            cond,
            span: start.merge(end),
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'for'")?;

        let init = if self.check(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::Var) {
            let (decls, span) = self.parse_var_declarations()?;
            Some(ForInit::Var(decls, span))
        } else {
            Some(ForInit::Expr(self.parse_expression()?))
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for initializer")?;

        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for condition")?;

        let update = if self.check(TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RightParen, "Expected ')' after for clauses")?;

        let body = Box::new(self.parse_statement()?);
        let end = self.previous().span;
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
            span: start.merge(end),
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        let next = self.peek();
        let value = if matches!(
            next.kind,
            TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
        ) || next.newline_before
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let span = value.as_ref().map_or(start, |v| start.merge(v.span()));
        self.consume_semicolon()?;
        Ok(Stmt::Return(value, span))
    }

    fn parse_throw(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        let value = self.parse_expression()?;
        let span = start.merge(value.span());
        self.consume_semicolon()?;
        Ok(Stmt::Throw(value, span))
    }

    fn parse_try(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        let block = self.parse_braced("Expected '{' after 'try'")?;

        let handler = if self.match_token(TokenKind::Catch) {
            self.consume(TokenKind::LeftParen, "Expected '(' after 'catch'")?;
            let param = self.consume(TokenKind::Identifier, "Expected catch parameter")?;
            self.consume(TokenKind::RightParen, "Expected ')' after catch parameter")?;
            let body = self.parse_braced("Expected '{' after catch clause")?;
            Some(CatchClause {
                param: Rc::from(param.lexeme.as_str()),
                body,
            })
        } else {
            None
        };

        let finalizer = if self.match_token(TokenKind::Finally) {
            Some(self.parse_braced("Expected '{' after 'finally'")?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_at_current("Expected 'catch' or 'finally' after try block"));
        }

        let end = self.previous().span;
        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
            span: start.merge(end),
        })
    }

    /// `break [label]` / `continue [label]`.
    fn parse_jump(&mut self) -> Result<Stmt, SyntaxError> {
        let keyword = self.advance();
        let label = if self.check(TokenKind::Identifier) && !self.peek().newline_before {
            Some(Rc::from(self.advance().lexeme.as_str()))
        } else {
            None
        };
        let span = keyword.span.merge(self.previous().span);
        self.consume_semicolon()?;
        if keyword.kind == TokenKind::Break {
            Ok(Stmt::Break(label, span))
        } else {
            Ok(Stmt::Continue(label, span))
        }
    }

    fn parse_labeled(&mut self) -> Result<Stmt, SyntaxError> {
        let label_token = self.advance();
        self.advance(); // ':'
        let body = Box::new(self.parse_statement()?);
        let end = self.previous().span;
        Ok(Stmt::Labeled {
            label: Rc::from(label_token.lexeme.as_str()),
            body,
            span: label_token.span.merge(end),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::parser::parse_program;

    #[test]
    fn test_labeled_try_finally() {
        let program = parse_program("L: try { f(); } finally { break L; }").unwrap();
        let Stmt::Labeled { label, body, .. } = &program.body[0] else {
            panic!("expected labeled statement");
        };
        assert_eq!(&**label, "L");
        let Stmt::Try {
            handler, finalizer, ..
        } = &**body
        else {
            panic!("expected try");
        };
        assert!(handler.is_none());
        assert!(matches!(
            finalizer.as_deref(),
            Some([Stmt::Break(Some(_), _)])
        ));
    }

    #[test]
    fn test_for_clauses() {
        let program = parse_program("for (var i = 0; i < 10; i++) f(i);").unwrap();
        let Stmt::For {
            init, cond, update, ..
        } = &program.body[0]
        else {
            panic!("expected for");
        };
        assert!(matches!(init, Some(ForInit::Var(decls, _)) if decls.len() == 1));
        assert!(cond.is_some());
        assert!(matches!(update, Some(Expr::Update { prefix: false, .. })));
    }

    #[test]
    fn test_return_without_value_before_newline() {
        let program = parse_program("function f() { return\n 1 }").unwrap();
        let Stmt::FunctionDecl { literal, .. } = &program.body[0] else {
            panic!("expected function");
        };
        assert!(matches!(literal.body[0], Stmt::Return(None, _)));
        assert_eq!(literal.body.len(), 2);
    }

    #[test]
    fn test_try_requires_handler() {
        assert!(parse_program("try { }").is_err());
    }

    #[test]
    fn test_var_list() {
        let program = parse_program("var a, b = 2, c").unwrap();
        let Stmt::Var(decls, _) = &program.body[0] else {
            panic!("expected var");
        };
        assert_eq!(decls.len(), 3);
        assert!(decls[0].init.is_none());
        assert!(decls[1].init.is_some());
    }
}
