// File: src/value.rs
//
// Runtime value model for the loomscript VM: the tagged union every
// operand-stack slot, table value, and upvalue ultimately holds.

use std::fmt;
use std::rc::Rc;

use crate::closure::Closure;
use crate::native::NativeFunction;
use crate::table::TableRef;

/// A runtime value. Strings, tables, closures and native functions are
/// reference types backed by the data pool; everything else is inline.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Table(TableRef),
    Closure(Rc<Closure>),
    NativeFunction(Rc<NativeFunction>),
}

impl Value {
    /// Human-readable type name, used in error messages and `type_of`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Closure(_) => "function",
            Value::NativeFunction(_) => "function",
        }
    }

    /// Truthiness: only `nil` and `false` are falsy, matching the
    /// table-centric scripting languages this VM models.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Table(t) => write!(f, "table: {:p}", t.as_ptr()),
            Value::Closure(c) => write!(f, "function: {:p}", Rc::as_ptr(c)),
            Value::NativeFunction(n) => write!(f, "function: native:{}", n.name),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Table(_) => write!(f, "table: {:p}", self.table_ptr()),
            Value::Closure(c) => write!(f, "function: {:p}", Rc::as_ptr(c)),
            Value::NativeFunction(n) => write!(f, "function: native:{}", n.name),
        }
    }
}

impl Value {
    fn table_ptr(&self) -> *const () {
        match self {
            Value::Table(t) => t.as_ptr() as *const (),
            _ => std::ptr::null(),
        }
    }
}

impl PartialEq for Value {
    /// Primitives and strings compare by value; tables, closures and
    /// native functions compare by identity (reference equality).
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.as_ptr() == b.as_ptr(),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::NativeFunction(a), Value::NativeFunction(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::String(Rc::from("")).is_truthy());
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Nil.type_name(), "nil");
        assert_eq!(Value::Number(1.0).type_name(), "number");
        assert_eq!(Value::String(Rc::from("x")).type_name(), "string");
    }

    #[test]
    fn primitive_equality_by_value() {
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
        assert_ne!(Value::Number(1.0), Value::Number(2.0));
        assert_eq!(Value::String(Rc::from("a")), Value::String(Rc::from("a")));
    }
}
