// File: src/stack.rs
//
// The operand stack: a growable sequence of slots, each either a Value or
// a Counter{current, total} annotating the contiguous values beneath it as
// a multi-value result (spec §4.1, §4.5).

use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Slot {
    Value(Value),
    Counter { current: usize, total: usize },
}

impl Slot {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Slot::Value(v) => Some(v),
            Slot::Counter { .. } => None,
        }
    }

    pub fn as_counter(&self) -> Option<(usize, usize)> {
        match self {
            Slot::Counter { current, total } => Some((*current, *total)),
            Slot::Value(_) => None,
        }
    }
}

/// Growable operand stack. Indexing is either absolute (`slot_at`, used
/// internally once a handler has located a slot by scanning) or relative
/// to the top with negative offsets (`get`/`get_mut`, −1 = top), matching
/// the `GetStackValue` contract of spec §4.1.
///
/// Handlers are trusted to present correctly shaped input (the compiler's
/// responsibility per spec §4.1); the `.expect(...)` panics below are the
/// `StackShapeError` contract of spec §7 — production-unreachable
/// assertions, not a recoverable error path.
#[derive(Debug, Default)]
pub struct OperandStack {
    slots: Vec<Slot>,
}

impl OperandStack {
    pub fn new() -> Self {
        OperandStack { slots: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        OperandStack { slots: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push_value(&mut self, value: Value) {
        self.slots.push(Slot::Value(value));
    }

    pub fn push_counter(&mut self, current: usize, total: usize) {
        self.slots.push(Slot::Counter { current, total });
    }

    pub fn pop(&mut self) -> Slot {
        self.slots.pop().expect("operand stack underflow")
    }

    /// Pops `n` slots without inspecting them (used by `CleanStack`).
    pub fn pop_n(&mut self, n: usize) {
        let new_len = self.slots.len().checked_sub(n).expect("operand stack underflow");
        self.slots.truncate(new_len);
    }

    pub fn top(&self) -> &Slot {
        self.slots.last().expect("operand stack is empty")
    }

    pub fn top_mut(&mut self) -> &mut Slot {
        self.slots.last_mut().expect("operand stack is empty")
    }

    /// Negative indexing from the top; −1 is the top slot (spec §4.1's
    /// `GetStackValue`).
    pub fn get(&self, offset: isize) -> &Slot {
        debug_assert!(offset < 0, "GetStackValue expects a negative offset from the top");
        let idx = (self.slots.len() as isize + offset) as usize;
        &self.slots[idx]
    }

    pub fn slot_at(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    pub fn set_at(&mut self, index: usize, slot: Slot) {
        self.slots[index] = slot;
    }

    pub fn remove_at(&mut self, index: usize) -> Slot {
        self.slots.remove(index)
    }

    /// Removes `remove_len` slots immediately below the top `run_len`
    /// slots, shifting the run down. Used by `Call` to drop the callee
    /// value+counter that sit beneath the argument run, and describes the
    /// same "shift the upper run down" move `MergeCounter` performs.
    pub fn remove_below_top_run(&mut self, run_len: usize, remove_len: usize) {
        let len = self.slots.len();
        let run_start = len - run_len;
        let remove_start = run_start - remove_len;
        self.slots.drain(remove_start..run_start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indexing_reads_from_top() {
        let mut s = OperandStack::new();
        s.push_value(Value::Number(1.0));
        s.push_value(Value::Number(2.0));
        assert_eq!(s.get(-1).as_value(), Some(&Value::Number(2.0)));
        assert_eq!(s.get(-2).as_value(), Some(&Value::Number(1.0)));
    }

    #[test]
    fn remove_below_top_run_preserves_run_order() {
        let mut s = OperandStack::new();
        s.push_value(Value::Bool(true)); // callee
        s.push_counter(0, 1); // callee counter
        s.push_value(Value::Number(1.0)); // arg0
        s.push_value(Value::Number(2.0)); // arg1
        s.push_counter(0, 2); // arg counter
        s.remove_below_top_run(3, 2);
        assert_eq!(s.len(), 3);
        assert_eq!(s.slot_at(0).as_value(), Some(&Value::Number(1.0)));
        assert_eq!(s.slot_at(1).as_value(), Some(&Value::Number(2.0)));
        assert_eq!(s.slot_at(2).as_counter(), Some((0, 2)));
    }
}
