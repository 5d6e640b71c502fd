//! Runtime value representation.
//!
//! Values are reference counted and single-threaded; everything reachable
//! from a value lives on the engine thread.

use crate::ast::Name;
use crate::error::ExecError;
use crate::interpreter::scope::ScopeRef;
use crate::isolate::{ContextId, Isolate};
use crate::script::SharedFunction;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable object.
pub type ObjectRef = Rc<RefCell<Object>>;

/// Host function callable from scripts. `Err(ExecError::Exception(v))`
/// throws `v` at the call site.
pub type NativeCallback = Rc<dyn Fn(&mut Isolate, &[Value]) -> Result<Value, ExecError>>;

/// Runtime value.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
}

/// Plain property bag; insertion ordered.
#[derive(Debug, Default)]
pub struct Object {
    properties: Vec<(Name, Value)>,
}

impl Object {
    /// Read a property.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(name, _)| &**name == key)
            .map(|(_, value)| value)
    }

    /// Create or overwrite a property.
    pub fn set(&mut self, key: Name, value: Value) {
        match self.properties.iter_mut().find(|(name, _)| *name == key) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((key, value)),
        }
    }

    /// Number of own properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the object has no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// A script function instance: compiled function plus captured scope.
pub struct Closure {
    pub function: Rc<SharedFunction>,
    pub scope: ScopeRef,
    pub context: ContextId,
}

/// A host function.
pub struct NativeFunction {
    pub name: Name,
    pub callback: NativeCallback,
}

impl Value {
    /// Create a string value.
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Create an empty object.
    pub fn new_object() -> Value {
        Value::Object(Rc::new(RefCell::new(Object::default())))
    }

    /// Create an error object with `name` and `message` properties.
    pub fn error(name: &str, message: impl AsRef<str>) -> Value {
        let mut object = Object::default();
        object.set(Rc::from("name"), Value::string(name));
        object.set(Rc::from("message"), Value::string(message));
        Value::Object(Rc::new(RefCell::new(object)))
    }

    /// Wrap a host closure as a callable value.
    pub fn native(
        name: &str,
        callback: impl Fn(&mut Isolate, &[Value]) -> Result<Value, ExecError> + 'static,
    ) -> Value {
        Value::Native(Rc::new(NativeFunction {
            name: Rc::from(name),
            callback: Rc::new(callback),
        }))
    }

    /// `typeof` result.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// Truthiness used by conditions and logical operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Function(_) | Value::Native(_) => true,
        }
    }

    /// Whether the value can be called.
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    /// Numeric conversion.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Object(_) | Value::Function(_) | Value::Native(_) => f64::NAN,
        }
    }

    /// The number if this is a number value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// String conversion.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Object(object) => {
                let object = object.borrow();
                match (object.get("name"), object.get("message")) {
                    (Some(name), Some(message)) => format!(
                        "{}: {}",
                        name.to_display_string(),
                        message.to_display_string()
                    ),
                    _ => "[object Object]".to_string(),
                }
            }
            Value::Function(closure) => format!(
                "function {}() {{ [script code] }}",
                closure.function.name()
            ),
            Value::Native(native) => format!("function {}() {{ [native code] }}", native.name),
        }
    }

    /// `===`.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                if matches!(self, Value::Object(_)) || matches!(other, Value::Object(_)) {
                    return false;
                }
                self.to_number() == other.to_number()
            }
            _ => self.strict_equals(other),
        }
    }
}

/// Format a number the way scripts print it: integral values without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(object) => write!(f, "Object({} properties)", object.borrow().len()),
            Value::Function(closure) => write!(f, "Function({})", closure.function.name()),
            Value::Native(native) => write!(f, "Native({})", native.name),
            other => write!(f, "{}", other.to_display_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Number(42.0), "42")]
    #[case(Value::Number(-0.5), "-0.5")]
    #[case(Value::Number(f64::NAN), "NaN")]
    #[case(Value::Bool(true), "true")]
    #[case(Value::Undefined, "undefined")]
    #[case(Value::string("foo"), "foo")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_display_string(), expected);
    }

    #[rstest]
    #[case(Value::Number(0.0), false)]
    #[case(Value::Number(2.0), true)]
    #[case(Value::string(""), false)]
    #[case(Value::Null, false)]
    #[case(Value::new_object(), true)]
    fn test_truthiness(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(value.is_truthy(), expected);
    }

    #[test]
    fn test_loose_equality_coerces() {
        assert!(Value::Number(1.0).loose_equals(&Value::string("1")));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
        assert!(!Value::Number(1.0).strict_equals(&Value::string("1")));
    }

    #[test]
    fn test_error_object_display() {
        let error = Value::error("ReferenceError", "n is not defined");
        assert_eq!(error.to_display_string(), "ReferenceError: n is not defined");
    }

    #[test]
    fn test_object_identity() {
        let a = Value::new_object();
        let b = Value::new_object();
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&b));
    }
}
