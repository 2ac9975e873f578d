// File: src/callstack.rs
//
// The call stack: activation records for in-flight calls (spec §4.3).

use std::rc::Rc;

use crate::bytecode::Instruction;
use crate::value::Value;

/// One activation record. `callee_tables` is how many scope tables this
/// activation has pushed via `AddLocalTable`; `Ret` trims exactly that
/// many off the scope stack.
pub struct CallFrame {
    pub caller_base: Rc<Vec<Instruction>>,
    pub caller_count: usize,
    pub caller_offset: i64,
    /// `None` only for the sentinel record `AddGlobalTable` pushes.
    pub callee: Option<Value>,
    pub callee_tables: usize,
}

#[derive(Default)]
pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        CallStack { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: CallFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> CallFrame {
        self.frames.pop().expect("call stack underflow")
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current_callee_tables(&self) -> usize {
        self.frames.last().map(|f| f.callee_tables).unwrap_or(0)
    }

    pub fn increment_current_callee_tables(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.callee_tables += 1;
        }
    }

    pub fn decrement_current_callee_tables(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.callee_tables -= 1;
        }
    }

    /// The callee value of the currently executing frame, if any — the
    /// closure whose upvalue table `GetTable` and `GenerateClosure` fall
    /// back to.
    pub fn current_callee(&self) -> Option<Value> {
        self.frames.last().and_then(|f| f.callee.clone())
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }
}
