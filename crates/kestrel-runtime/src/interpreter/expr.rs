//! Expression evaluation.

use crate::ast::*;
use crate::interpreter::scope;
use crate::interpreter::Exec;
use crate::isolate::Isolate;
use crate::value::{Closure, Object, Value};
use std::cell::RefCell;
use std::rc::Rc;

impl Isolate {
    /// Evaluate an expression.
    pub(super) fn eval_expr(&mut self, expr: &Expr) -> Exec<Value> {
        match expr {
            Expr::Number(n, _) => Ok(Value::Number(*n)),
            Expr::String(s, _) => Ok(Value::String(Rc::clone(s))),
            Expr::Bool(b, _) => Ok(Value::Bool(*b)),
            Expr::Null(_) => Ok(Value::Null),
            Expr::Undefined(_) => Ok(Value::Undefined),
            Expr::Identifier(name, _) => self.read_variable(name),
            Expr::Unary { op, operand, .. } => {
                let value = self.eval_expr(operand)?;
                Ok(match op {
                    UnaryOp::Negate => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                })
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                Ok(Self::binary(*op, &left, &right))
            }
            Expr::Logical {
                op, left, right, ..
            } => {
                let left = self.eval_expr(left)?;
                match (op, left.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval_expr(right),
                }
            }
            Expr::Assign {
                op, target, value, ..
            } => self.eval_assign(*op, target, value),
            Expr::Update {
                op, prefix, target, ..
            } => {
                let old = self.read_target(target)?.to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_target(target, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Call {
                callee,
                args,
                paren,
                ..
            } => {
                let function = self.eval_expr(callee)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg)?);
                }
                self.debug_location(*paren)?;
                self.call_value(&function, values)
            }
            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval_expr(object)?;
                self.get_property(&object, property)
            }
            Expr::Object(properties, _) => {
                let mut object = Object::default();
                for (key, value) in properties {
                    let value = self.eval_expr(value)?;
                    object.set(Rc::clone(key), value);
                }
                Ok(Value::Object(Rc::new(RefCell::new(object))))
            }
            Expr::Function { index, .. } => self.create_closure(*index),
        }
    }

    fn read_variable(&mut self, name: &Name) -> Exec<Value> {
        match scope::lookup(&self.current_scope(), name) {
            Some(value) => Ok(value),
            None => {
                let message = format!("{} is not defined", name);
                Err(self.throw_error("ReferenceError", &message))
            }
        }
    }

    fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
        match op {
            BinaryOp::Add => match (left, right) {
                (Value::String(_), _) | (_, Value::String(_)) => Value::string(format!(
                    "{}{}",
                    left.to_display_string(),
                    right.to_display_string()
                )),
                _ => Value::Number(left.to_number() + right.to_number()),
            },
            BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
            BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
            BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
            BinaryOp::Mod => Value::Number(left.to_number() % right.to_number()),
            BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
            BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
            BinaryOp::Less | BinaryOp::LessEq | BinaryOp::Greater | BinaryOp::GreaterEq => {
                let ordering = match (left, right) {
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => left.to_number().partial_cmp(&right.to_number()),
                };
                let Some(ordering) = ordering else {
                    return Value::Bool(false);
                };
                Value::Bool(match op {
                    BinaryOp::Less => ordering.is_lt(),
                    BinaryOp::LessEq => ordering.is_le(),
                    BinaryOp::Greater => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
        }
    }

    fn eval_assign(&mut self, op: AssignOp, target: &AssignTarget, value: &Expr) -> Exec<Value> {
        let value = match op {
            AssignOp::Assign => self.eval_expr(value)?,
            AssignOp::AddAssign | AssignOp::SubAssign => {
                let current = self.read_target(target)?;
                let operand = self.eval_expr(value)?;
                let op = if op == AssignOp::AddAssign {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                Self::binary(op, &current, &operand)
            }
        };
        self.write_target(target, value.clone())?;
        Ok(value)
    }

    fn read_target(&mut self, target: &AssignTarget) -> Exec<Value> {
        match target {
            AssignTarget::Identifier(name) => self.read_variable(name),
            AssignTarget::Member { object, property } => {
                let object = self.eval_expr(object)?;
                self.get_property(&object, property)
            }
        }
    }

    fn write_target(&mut self, target: &AssignTarget, value: Value) -> Exec<()> {
        match target {
            AssignTarget::Identifier(name) => {
                scope::assign(&self.current_scope(), name, value);
                Ok(())
            }
            AssignTarget::Member { object, property } => {
                match self.eval_expr(object)? {
                    Value::Object(object) => {
                        object.borrow_mut().set(Rc::clone(property), value);
                        Ok(())
                    }
                    other => {
                        let message = format!(
                            "Cannot set property '{}' of {}",
                            property,
                            other.to_display_string()
                        );
                        Err(self.throw_error("TypeError", &message))
                    }
                }
            }
        }
    }

    fn get_property(&mut self, object: &Value, property: &str) -> Exec<Value> {
        match object {
            Value::Object(object) => Ok(object
                .borrow()
                .get(property)
                .cloned()
                .unwrap_or(Value::Undefined)),
            Value::String(s) if property == "length" => {
                Ok(Value::Number(s.chars().count() as f64))
            }
            Value::Undefined | Value::Null => {
                let message = format!(
                    "Cannot read property '{}' of {}",
                    property,
                    object.to_display_string()
                );
                Err(self.throw_error("TypeError", &message))
            }
            _ => Ok(Value::Undefined),
        }
    }

    fn create_closure(&mut self, index: usize) -> Exec<Value> {
        let Some(frame) = self.frames.last() else {
            return Ok(Value::Undefined);
        };
        let Some(function) = frame.function.inner(index) else {
            return Ok(Value::Undefined);
        };
        Ok(Value::Function(Rc::new(Closure {
            function: Rc::clone(function),
            scope: Rc::clone(&frame.scope),
            context: frame.context,
        })))
    }
}
