//! Statement execution.

use crate::ast::*;
use crate::interpreter::scope::{self, Scope, ScopeRef};
use crate::interpreter::{Completion, Exec, Unwind};
use crate::isolate::Isolate;
use crate::value::Value;
use std::rc::Rc;

impl Isolate {
    /// Execute statements in order, stopping at the first abrupt completion.
    pub(super) fn exec_statements(&mut self, stmts: &[Stmt]) -> Exec<Completion> {
        for stmt in stmts {
            let completion = self.exec_statement(stmt)?;
            if completion != Completion::Normal {
                return Ok(completion);
            }
        }
        Ok(Completion::Normal)
    }

    /// Execute a statement.
    pub(super) fn exec_statement(&mut self, stmt: &Stmt) -> Exec<Completion> {
        match stmt {
            Stmt::Expr(expr, span) => {
                self.debug_location(span.start)?;
                let value = self.eval_expr(expr)?;
                if let Some(frame) = self.frames.last_mut() {
                    frame.completion = value;
                }
                Ok(Completion::Normal)
            }
            Stmt::Var(decls, span) => {
                if decls.iter().any(|decl| decl.init.is_some()) {
                    self.debug_location(span.start)?;
                }
                self.exec_var_declarators(decls)?;
                Ok(Completion::Normal)
            }
            // Hoisted when the enclosing function was entered
            Stmt::FunctionDecl { .. } => Ok(Completion::Normal),
            Stmt::Return(value, span) => {
                self.debug_location(span.start)?;
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                span,
            } => {
                self.debug_location(span.start)?;
                if self.eval_expr(cond)?.is_truthy() {
                    self.exec_statement(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_statement(else_branch)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::While { .. } | Stmt::DoWhile { .. } | Stmt::For { .. } => {
                self.exec_loop(stmt, &[])
            }
            Stmt::Block(stmts, _) => self.exec_statements(stmts),
            Stmt::Try {
                block,
                handler,
                finalizer,
                ..
            } => self.exec_try(block, handler.as_ref(), finalizer.as_deref()),
            Stmt::Throw(value, span) => {
                self.debug_location(span.start)?;
                let value = self.eval_expr(value)?;
                Err(self.throw_value(value))
            }
            Stmt::Break(label, span) => {
                self.debug_location(span.start)?;
                Ok(Completion::Break(label.clone()))
            }
            Stmt::Continue(label, span) => {
                self.debug_location(span.start)?;
                Ok(Completion::Continue(label.clone()))
            }
            Stmt::Labeled { .. } => self.exec_labeled(stmt),
            Stmt::Debugger(span) => {
                self.debug_location(span.start)?;
                Ok(Completion::Normal)
            }
            Stmt::Empty(_) => Ok(Completion::Normal),
        }
    }

    fn exec_var_declarators(&mut self, decls: &[VarDeclarator]) -> Exec<()> {
        for decl in decls {
            if let Some(init) = &decl.init {
                let value = self.eval_expr(init)?;
                scope::assign(&self.current_scope(), &decl.name, value);
            }
        }
        Ok(())
    }

    /// `a: b: stmt`; labels on loops also apply to `continue`.
    fn exec_labeled(&mut self, stmt: &Stmt) -> Exec<Completion> {
        let mut labels = Vec::new();
        let mut body = stmt;
        while let Stmt::Labeled {
            label, body: inner, ..
        } = body
        {
            labels.push(Rc::clone(label));
            body = inner;
        }

        let completion = match body {
            Stmt::While { .. } | Stmt::DoWhile { .. } | Stmt::For { .. } => {
                self.exec_loop(body, &labels)?
            }
            other => self.exec_statement(other)?,
        };
        match completion {
            Completion::Break(Some(label)) if labels.contains(&label) => Ok(Completion::Normal),
            other => Ok(other),
        }
    }

    fn exec_loop(&mut self, stmt: &Stmt, labels: &[Name]) -> Exec<Completion> {
        match stmt {
            Stmt::While { cond, body, span } => loop {
                self.debug_location(span.start)?;
                if !self.eval_expr(cond)?.is_truthy() {
                    return Ok(Completion::Normal);
                }
                if let Some(exit) = Self::loop_exit(self.exec_statement(body)?, labels) {
                    return Ok(exit);
                }
                self.debug_poll_interrupts()?;
            },
            Stmt::DoWhile { body, cond, .. } => loop {
                if let Some(exit) = Self::loop_exit(self.exec_statement(body)?, labels) {
                    return Ok(exit);
                }
                self.debug_location(cond.span().start)?;
                if !self.eval_expr(cond)?.is_truthy() {
                    return Ok(Completion::Normal);
                }
                self.debug_poll_interrupts()?;
            },
            Stmt::For {
                init,
                cond,
                update,
                body,
                ..
            } => {
                match init {
                    Some(ForInit::Var(decls, span)) => {
                        if decls.iter().any(|decl| decl.init.is_some()) {
                            self.debug_location(span.start)?;
                        }
                        self.exec_var_declarators(decls)?;
                    }
                    Some(ForInit::Expr(expr)) => {
                        self.debug_location(expr.span().start)?;
                        self.eval_expr(expr)?;
                    }
                    None => {}
                }
                loop {
                    if let Some(cond) = cond {
                        self.debug_location(cond.span().start)?;
                        if !self.eval_expr(cond)?.is_truthy() {
                            return Ok(Completion::Normal);
                        }
                    }
                    if let Some(exit) = Self::loop_exit(self.exec_statement(body)?, labels) {
                        return Ok(exit);
                    }
                    if let Some(update) = update {
                        self.debug_location(update.span().start)?;
                        self.eval_expr(update)?;
                    }
                    self.debug_poll_interrupts()?;
                }
            }
            other => self.exec_statement(other),
        }
    }

    /// Decide whether a loop body's completion leaves the loop.
    fn loop_exit(completion: Completion, labels: &[Name]) -> Option<Completion> {
        match completion {
            Completion::Normal | Completion::Continue(None) => None,
            Completion::Continue(Some(label)) if labels.contains(&label) => None,
            Completion::Break(None) => Some(Completion::Normal),
            Completion::Break(Some(label)) if labels.contains(&label) => Some(Completion::Normal),
            other => Some(other),
        }
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Stmt]>,
    ) -> Exec<Completion> {
        if handler.is_some() {
            self.catch_depth += 1;
        }
        let result = self.exec_statements(block);
        if handler.is_some() {
            self.catch_depth -= 1;
        }

        let result = match (result, handler) {
            (Err(Unwind::Throw(exception)), Some(handler)) => {
                self.exec_catch(handler, exception)
            }
            (result, _) => result,
        };

        let Some(finalizer) = finalizer else {
            return result;
        };
        if matches!(result, Err(Unwind::Terminate)) {
            return result;
        }
        match self.exec_statements(finalizer)? {
            Completion::Normal => result,
            // break/continue/return inside finally discards the pending completion
            abrupt => Ok(abrupt),
        }
    }

    fn exec_catch(&mut self, handler: &CatchClause, exception: Value) -> Exec<Completion> {
        let outer = self.current_scope();
        let catch_scope = Scope::child(&outer);
        catch_scope
            .borrow_mut()
            .declare(Rc::clone(&handler.param), exception);

        self.set_frame_scope(catch_scope);
        let result = self.exec_statements(&handler.body);
        self.set_frame_scope(outer);
        result
    }

    fn set_frame_scope(&mut self, new_scope: ScopeRef) {
        if let Some(frame) = self.frames.last_mut() {
            frame.scope = new_scope;
        }
    }
}
