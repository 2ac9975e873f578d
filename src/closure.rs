// File: src/closure.rs
//
// Function: the immutable compiled unit produced by the (out-of-scope)
// compiler. Closure: a Function paired with the upvalue table captured at
// creation time.

use std::rc::Rc;

use crate::bytecode::Instruction;
use crate::table::TableRef;

/// Immutable compiled unit. Instructions are held behind an `Rc` so every
/// `Call` into a closure can cheaply swap the VM's active instruction
/// array without cloning the instruction stream itself.
#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub instructions: Rc<Vec<Instruction>>,
    /// Ordered set of upvalue names this function's closures must resolve
    /// at creation time. Order matters only for `GenerateClosure`'s
    /// deterministic resolution order; lookup itself is by name.
    pub upvalue_names: Vec<String>,
    pub param_names: Vec<String>,
}

impl Function {
    pub fn new(
        name: Option<String>,
        instructions: Vec<Instruction>,
        upvalue_names: Vec<String>,
        param_names: Vec<String>,
    ) -> Self {
        Function {
            name,
            instructions: Rc::new(instructions),
            upvalue_names,
            param_names,
        }
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn declares_upvalues(&self) -> bool {
        !self.upvalue_names.is_empty()
    }
}

/// A closure: a `Function` plus the upvalues it captured at creation time.
/// The upvalue table is only allocated when the function declares at least
/// one upvalue (spec §3, Closure).
pub struct Closure {
    pub function: Rc<Function>,
    pub upvalues: Option<TableRef>,
}

impl Closure {
    pub fn new(function: Rc<Function>, upvalues: Option<TableRef>) -> Self {
        debug_assert_eq!(
            function.declares_upvalues(),
            upvalues.is_some(),
            "upvalue table must exist iff the function declares upvalues"
        );
        Closure { function, upvalues }
    }
}

impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Closure")
            .field("function", &self.function.name)
            .field("has_upvalues", &self.upvalues.is_some())
            .finish()
    }
}
