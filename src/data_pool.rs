// File: src/data_pool.rs
//
// The allocator/interner for Values, Tables, Closures, and Strings (spec
// §4.4, §6). Backed by a reachable-from-roots allocator is assumed
// (spec's GC non-goal); here that's just Rust's ownership/Rc machinery —
// values are freed when their last reference drops.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::closure::{Closure, Function};
use crate::table::{new_table_ref, TableRef};
use crate::value::Value;

/// Interns strings so that repeated literals of the same text share one
/// heap allocation, mirroring the teacher's constant-pool deduplication
/// in `BytecodeChunk::add_constant`.
#[derive(Default)]
pub struct DataPool {
    interned: RefCell<HashMap<String, Rc<str>>>,
}

impl DataPool {
    pub fn new() -> Self {
        DataPool { interned: RefCell::new(HashMap::new()) }
    }

    pub fn get_nil(&self) -> Value {
        Value::Nil
    }

    pub fn get_bool(&self, b: bool) -> Value {
        Value::Bool(b)
    }

    pub fn get_number(&self, n: f64) -> Value {
        Value::Number(n)
    }

    pub fn get_string(&self, s: &str) -> Value {
        let mut interned = self.interned.borrow_mut();
        let rc = interned
            .entry(s.to_string())
            .or_insert_with(|| Rc::from(s))
            .clone();
        Value::String(rc)
    }

    pub fn get_table(&self) -> TableRef {
        new_table_ref()
    }

    /// Allocates a new closure from the given function. Upvalue capture
    /// itself happens in `GenerateClosure`; this just wires up an already-
    /// populated upvalue table (or none, if the function captures none).
    pub fn get_closure(&self, function: Rc<Function>, upvalues: Option<TableRef>) -> Value {
        Value::Closure(Rc::new(Closure::new(function, upvalues)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_one_allocation() {
        let pool = DataPool::new();
        let a = pool.get_string("hello");
        let b = pool.get_string("hello");
        match (a, b) {
            (Value::String(a), Value::String(b)) => assert!(Rc::ptr_eq(&a, &b)),
            _ => panic!("expected strings"),
        }
    }
}
