// File: src/vm.rs
//
// The dispatch engine: fetches instructions from the current frame and
// applies one handler per opcode (spec §2 item 5, §4.6). This is the
// semantic heart of the system — everything else in this crate exists to
// give these handlers somewhere to read and write.

use std::rc::Rc;

use crate::bytecode::{Bootstrap, Instruction, OpCode, Param};
use crate::callstack::{CallFrame, CallStack};
use crate::closure::Function;
use crate::data_pool::DataPool;
use crate::errors::{RuntimeError, RuntimeErrorKind};
use crate::native::{install_stdlib, NativeFunction};
use crate::scope::ScopeStack;
use crate::stack::{OperandStack, Slot};
use crate::table::TableRef;
use crate::value::Value;

/// Tunable VM knobs. No file-based config format backs this — it's
/// constructed directly by the CLI from flags (see `main.rs`).
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Pre-allocated operand stack capacity.
    pub stack_capacity: usize,
    /// Maximum number of nested `Call`s before a `CallDepthExceeded` error
    /// is raised instead of growing the call stack further.
    pub max_call_depth: usize,
    /// Print each dispatched instruction to stderr before executing it.
    pub trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig { stack_capacity: 256, max_call_depth: 1024, trace: false }
    }
}

/// The virtual machine: one operand stack, one scope-table stack, one
/// call stack, one data pool. Never shared across VM instances (spec §5).
pub struct Vm {
    stack: OperandStack,
    scopes: ScopeStack,
    calls: CallStack,
    pool: DataPool,
    global_table: TableRef,

    ins_base: Rc<Vec<Instruction>>,
    ins_count: usize,
    /// Signed so `Call`'s "set to −1, let the loop's post-increment land
    /// on 0" trick (spec §4.6, `Call`) is a plain arithmetic op rather
    /// than a special-cased first iteration.
    ins_current: i64,

    config: VmConfig,
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        let pool = DataPool::new();
        let global_table = pool.get_table();
        install_stdlib(&global_table);
        Vm {
            stack: OperandStack::with_capacity(config.stack_capacity),
            scopes: ScopeStack::new(),
            calls: CallStack::new(),
            pool,
            global_table,
            ins_base: Rc::new(Vec::new()),
            ins_count: 0,
            ins_current: -1,
            config,
        }
    }

    pub fn pool(&self) -> &DataPool {
        &self.pool
    }

    pub fn global_table(&self) -> &TableRef {
        &self.global_table
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn call_depth(&self) -> usize {
        self.calls.len()
    }

    /// Installs `bootstrap` as the current frame and dispatches until the
    /// instruction pointer walks off the end (spec §2, "Data flow").
    pub fn run(&mut self, bootstrap: Bootstrap) -> Result<(), RuntimeError> {
        self.ins_base = Rc::new(bootstrap.instructions);
        self.ins_count = self.ins_base.len();
        self.ins_current = -1;

        loop {
            self.ins_current += 1;
            if self.ins_current as usize >= self.ins_count {
                break;
            }
            let instr = self.ins_base[self.ins_current as usize].clone();
            if self.config.trace {
                eprintln!("{:04} {:?}", self.ins_current, instr.op);
            }
            if let Err(err) = self.dispatch(&instr) {
                return Err(err.with_trace(self.synthesize_trace()));
            }
        }
        Ok(())
    }

    fn synthesize_trace(&self) -> Vec<String> {
        self.calls
            .frames()
            .iter()
            .rev()
            .map(|frame| match &frame.callee {
                Some(Value::Closure(c)) => {
                    format!("in {}", c.function.name.as_deref().unwrap_or("<anonymous>"))
                }
                Some(Value::NativeFunction(n)) => format!("in native:{}", n.name),
                _ => "in <global>".to_string(),
            })
            .collect()
    }

    fn dispatch(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        match instr.op {
            OpCode::Push => self.handle_push(instr.param.as_ref().expect("Push requires a parameter")),
            OpCode::CleanStack => self.handle_clean_stack(),
            OpCode::GetLocalTable => self.handle_get_local_table(),
            OpCode::GetTable => {
                let key = expect_name(&instr.param).clone();
                self.handle_get_table(&key);
            }
            OpCode::GetTableValue => {
                let ci = expect_counter_index(&instr.param);
                self.handle_get_table_value(ci)?;
            }
            OpCode::Assign => self.handle_assign()?,
            OpCode::GenerateClosure => {
                let function = expect_function(&instr.param).clone();
                self.handle_generate_closure(function);
            }
            OpCode::Call => self.handle_call()?,
            OpCode::Ret => self.handle_ret(),
            OpCode::GenerateArgTable => self.handle_generate_arg_table(),
            OpCode::MergeCounter => self.handle_merge_counter(),
            OpCode::ResetCounter => self.handle_reset_counter(),
            OpCode::DuplicateCounter => self.handle_duplicate_counter(),
            OpCode::AddLocalTable => self.handle_add_local_table(),
            OpCode::DelLocalTable => self.handle_del_local_table(),
            OpCode::AddGlobalTable => self.handle_add_global_table(),
            OpCode::DelGlobalTable => self.handle_del_global_table(),
        }
        Ok(())
    }

    // ---- §4.1 / §4.6 Push -------------------------------------------------

    fn handle_push(&mut self, param: &Param) {
        match param {
            Param::Value(v) | Param::Name(v) => {
                let value = match v {
                    Value::Nil => self.pool.get_nil(),
                    Value::Bool(b) => self.pool.get_bool(*b),
                    Value::Number(n) => self.pool.get_number(*n),
                    Value::String(s) => self.pool.get_string(s),
                    other => other.clone(),
                };
                self.stack.push_value(value);
            }
            Param::Counter(total) => self.stack.push_counter(0, *total),
            Param::CounterIndex(_) | Param::Function(_) => {
                unreachable!("Push never carries a CounterIndex or Function parameter")
            }
        }
    }

    fn handle_clean_stack(&mut self) {
        let counter = self.stack.pop();
        let (_, total) = counter.as_counter().expect("CleanStack: top must be a counter");
        self.stack.pop_n(total);
    }

    fn handle_get_local_table(&mut self) {
        let table = self.scopes.back().clone();
        self.stack.push_value(Value::Table(table));
        self.stack.push_counter(0, 1);
    }

    /// Resolves `key` by scanning the current frame's visible scope
    /// tables, innermost outward; falls back to the current closure's
    /// upvalue table, and — resolving spec's open question — falls back
    /// further to the global table rather than ever dereferencing a null
    /// closure.
    fn handle_get_table(&mut self, key: &Value) {
        let visible = self.calls.current_callee_tables();
        for table in self.scopes.innermost_n(visible) {
            if table.borrow().have_key(key) {
                self.stack.push_value(Value::Table(table.clone()));
                self.stack.push_counter(0, 1);
                return;
            }
        }
        if let Some(Value::Closure(c)) = self.calls.current_callee() {
            if let Some(uv) = &c.upvalues {
                self.stack.push_value(Value::Table(uv.clone()));
                self.stack.push_counter(0, 1);
                return;
            }
        }
        let global = self.scopes.outermost().clone();
        self.stack.push_value(Value::Table(global));
        self.stack.push_counter(0, 1);
    }

    /// `ci` selects which (table, counter{0,1}) pair beneath the key is
    /// the target, counting counter slots from the top after the key is
    /// popped — `ci = 0` is the nearest one, letting chained indexing
    /// (`a.b.c`) walk outward by incrementing `ci` past intervening pairs.
    fn handle_get_table_value(&mut self, ci: usize) -> Result<(), RuntimeError> {
        let key = self.stack.pop().as_value().cloned().expect("GetTableValue: key must be a value");

        let mut counters_seen = 0;
        let mut counter_idx = None;
        for idx in (0..self.stack.len()).rev() {
            if self.stack.slot_at(idx).as_counter().is_some() {
                if counters_seen == ci {
                    counter_idx = Some(idx);
                    break;
                }
                counters_seen += 1;
            }
        }
        let counter_idx = counter_idx.expect("GetTableValue: missing target counter");
        let table_idx = counter_idx - 1;
        let target = self
            .stack
            .slot_at(table_idx)
            .as_value()
            .cloned()
            .expect("GetTableValue: expected a value beneath the target counter");

        let result = match &target {
            Value::Table(t) => t.borrow().get_value(&key),
            other => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::TypeError,
                    format!("attempt to index value from {}", other.type_name()),
                ))
            }
        };
        self.stack.set_at(table_idx, Slot::Value(result));
        Ok(())
    }

    /// Consumes exactly one key+counter/table+counter/RHS-value group; the
    /// RHS counter is left on the stack (unchanged save for `current`) so
    /// a run of `Assign`s can each pull the next RHS value in turn.
    fn handle_assign(&mut self) -> Result<(), RuntimeError> {
        let key_counter = self.stack.pop();
        debug_assert!(matches!(key_counter.as_counter(), Some((_, 1))));
        let key = self.stack.pop().as_value().cloned().expect("Assign: expected key value");

        let table_counter = self.stack.pop();
        debug_assert!(matches!(table_counter.as_counter(), Some((_, 1))));
        let table_val = self.stack.pop().as_value().cloned().expect("Assign: expected table value");

        let value = self.consume_one_from_rhs_counter();

        match table_val {
            Value::Table(t) => t.borrow_mut().assign(key, value)?,
            other => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::TypeError,
                    format!("attempt to index value from {}", other.type_name()),
                ))
            }
        }
        Ok(())
    }

    fn consume_one_from_rhs_counter(&mut self) -> Value {
        let (current, total) = self
            .stack
            .top()
            .as_counter()
            .expect("Assign: expected the RHS multi-value counter on top");

        let value = if current < total {
            let counter_idx = self.stack.len() - 1;
            let value_idx = counter_idx - total + current;
            self.stack.slot_at(value_idx).as_value().cloned().expect("Assign: expected RHS value slot")
        } else {
            Value::Nil
        };

        if let Slot::Counter { current, .. } = self.stack.top_mut() {
            *current += 1;
        }
        value
    }

    /// Seeds upvalue values at closure-creation time, copying the
    /// *current* value of each declared upvalue name into a fresh
    /// upvalue table — capture is by value, never by reference.
    fn handle_generate_closure(&mut self, function: Rc<Function>) {
        let upvalues = if function.declares_upvalues() {
            let table = self.pool.get_table();
            for name in &function.upvalue_names {
                let owner = self.get_upvalue_key_owner_table(name);
                let key = self.pool.get_string(name);
                let value = owner.borrow().get_value(&key);
                table.borrow_mut().assign(key, value).expect("upvalue names are never nil");
            }
            Some(table)
        } else {
            None
        };
        let closure = self.pool.get_closure(function, upvalues);
        self.stack.push_value(closure);
        self.stack.push_counter(0, 1);
    }

    /// §4.7: scan current scopes, then the enclosing closure's upvalue
    /// table (required by construction to already hold the key), then —
    /// at the global frame — bind the name as Nil in the outermost scope.
    fn get_upvalue_key_owner_table(&mut self, name: &str) -> TableRef {
        let key = self.pool.get_string(name);
        let visible = self.calls.current_callee_tables();
        for table in self.scopes.innermost_n(visible) {
            if table.borrow().have_key(&key) {
                return table.clone();
            }
        }
        if let Some(Value::Closure(c)) = self.calls.current_callee() {
            if let Some(uv) = &c.upvalues {
                debug_assert!(uv.borrow().have_key(&key), "upvalue owner must already hold the key");
                return uv.clone();
            }
        }
        let outer = self.scopes.outermost().clone();
        outer.borrow_mut().assign(key, Value::Nil).expect("upvalue names are never nil");
        outer
    }

    /// Stack on entry (bottom to top): callee value, callee counter{0,1},
    /// `A` argument values, argument counter{0,A}.
    fn handle_call(&mut self) -> Result<(), RuntimeError> {
        let (_, arg_total) = self.stack.top().as_counter().expect("Call: expected argument counter on top");

        let len = self.stack.len();
        let callee_counter_idx = len - 1 - arg_total - 1;
        let callee_idx = callee_counter_idx - 1;
        let callee = self
            .stack
            .slot_at(callee_idx)
            .as_value()
            .cloned()
            .expect("Call: expected callee value beneath the callee counter");

        if self.calls.len() >= self.config.max_call_depth {
            return Err(RuntimeError::new(
                RuntimeErrorKind::CallDepthExceeded,
                format!("call depth exceeded the configured limit of {}", self.config.max_call_depth),
            ));
        }

        // Drop the callee value + its counter; the arg run becomes the new top.
        self.stack.remove_below_top_run(arg_total + 1, 2);

        match &callee {
            Value::Closure(c) => {
                self.calls.push(CallFrame {
                    caller_base: self.ins_base.clone(),
                    caller_count: self.ins_count,
                    caller_offset: self.ins_current,
                    callee: Some(callee.clone()),
                    callee_tables: 0,
                });
                self.ins_base = c.function.instructions.clone();
                self.ins_count = c.function.instruction_count();
                self.ins_current = -1;
                Ok(())
            }
            Value::NativeFunction(nf) => {
                self.calls.push(CallFrame {
                    caller_base: self.ins_base.clone(),
                    caller_count: self.ins_count,
                    caller_offset: self.ins_current,
                    callee: Some(callee.clone()),
                    callee_tables: 0,
                });
                let native: Rc<NativeFunction> = nf.clone();
                (native.func)(self)?;
                // Switch to a one-instruction bootstrap containing a
                // single Ret, so the next dispatch cycle runs the normal
                // return sequence instead of duplicating it here.
                self.ins_base = Rc::new(vec![Instruction::ret()]);
                self.ins_count = 1;
                self.ins_current = -1;
                Ok(())
            }
            other => Err(RuntimeError::new(
                RuntimeErrorKind::TypeError,
                format!("attempt to call {}", other.type_name()),
            )),
        }
    }

    fn handle_ret(&mut self) {
        let frame = self.calls.pop();
        self.ins_base = frame.caller_base;
        self.ins_count = frame.caller_count;
        self.ins_current = frame.caller_offset;
        self.scopes.pop_n(frame.callee_tables);
    }

    fn handle_generate_arg_table(&mut self) {
        let (current, total) = self.stack.top().as_counter().expect("GenerateArgTable: expected counter");
        let arg_table = self.pool.get_table();
        let counter_idx = self.stack.len() - 1;
        for i in current..total {
            let value_idx = counter_idx - total + i;
            let v = self.stack.slot_at(value_idx).as_value().cloned().expect("GenerateArgTable: expected value");
            arg_table
                .borrow_mut()
                .assign(Value::Number((i + 1) as f64), v)
                .expect("numeric index is never nil");
        }
        if let Slot::Counter { current, .. } = self.stack.top_mut() {
            *current = total;
        }
        let innermost = self.scopes.back().clone();
        let arg_key = self.pool.get_string("arg");
        innermost
            .borrow_mut()
            .assign(arg_key, Value::Table(arg_table))
            .expect("\"arg\" is never nil");
    }

    /// Merges two adjacent runs (the top run immediately above the
    /// second) into one contiguous run by deleting the intervening
    /// counter and pushing a merged counter.
    fn handle_merge_counter(&mut self) {
        let upper = self.stack.pop();
        let (_, total2) = upper.as_counter().expect("MergeCounter: expected the upper counter on top");

        let len = self.stack.len();
        let lower_counter_idx = len - total2 - 1;
        let (_, total1) = self
            .stack
            .slot_at(lower_counter_idx)
            .as_counter()
            .expect("MergeCounter: expected the lower counter beneath the upper run");
        self.stack.remove_at(lower_counter_idx);
        self.stack.push_counter(0, total1 + total2);
    }

    /// Coerces the top counter's total to exactly 1, then always
    /// normalizes it to {0,1} — applying this twice is therefore
    /// idempotent.
    fn handle_reset_counter(&mut self) {
        let (_, total) = self.stack.pop().as_counter().expect("ResetCounter: expected a counter on top");
        if total == 0 {
            self.stack.push_value(Value::Nil);
        } else if total > 1 {
            self.stack.pop_n(total - 1);
        }
        self.stack.push_counter(0, 1);
    }

    fn handle_duplicate_counter(&mut self) {
        let (_, total) = self.stack.top().as_counter().expect("DuplicateCounter: expected a counter on top");
        let len = self.stack.len();
        let run_start = len - 1 - total;
        let copies: Vec<Value> = (0..total)
            .map(|i| self.stack.slot_at(run_start + i).as_value().cloned().expect("DuplicateCounter: expected value"))
            .collect();
        for v in copies {
            self.stack.push_value(v);
        }
        self.stack.push_counter(0, total);
    }

    fn handle_add_local_table(&mut self) {
        let table = self.pool.get_table();
        self.scopes.push(table);
        self.calls.increment_current_callee_tables();
    }

    fn handle_del_local_table(&mut self) {
        self.scopes.pop();
        self.calls.decrement_current_callee_tables();
    }

    fn handle_add_global_table(&mut self) {
        self.scopes.push(self.global_table.clone());
        self.calls.push(CallFrame {
            caller_base: self.ins_base.clone(),
            caller_count: self.ins_count,
            caller_offset: self.ins_current,
            callee: None,
            callee_tables: 1,
        });
    }

    fn handle_del_global_table(&mut self) {
        self.scopes.pop();
        self.calls.pop();
    }

    // ---- native-function calling convention (spec §6) ---------------------

    /// Pops the argument counter and its values (pushed by `Call`, left
    /// untouched for native callees to consume themselves) and returns
    /// them in left-to-right order.
    pub fn take_args(&mut self) -> Vec<Value> {
        let (_, total) = self.stack.pop().as_counter().expect("native call: expected argument counter");
        let mut args = Vec::with_capacity(total);
        for _ in 0..total {
            args.push(self.stack.pop().as_value().cloned().expect("native call: expected argument value"));
        }
        args.reverse();
        args
    }

    /// Pushes a native function's results followed by the return counter.
    pub fn push_return(&mut self, values: Vec<Value>) {
        let total = values.len();
        for v in values {
            self.stack.push_value(v);
        }
        self.stack.push_counter(0, total);
    }

    /// Directly visible stack slot, for tests exercising scenarios that
    /// read back final values (mirrors `GetStackValue` from spec §4.1).
    pub fn peek(&self, offset: isize) -> &Slot {
        self.stack.get(offset)
    }
}

fn expect_name(param: &Option<Param>) -> &Value {
    match param {
        Some(Param::Name(v)) => v,
        _ => panic!("expected a Name parameter"),
    }
}

fn expect_counter_index(param: &Option<Param>) -> usize {
    match param {
        Some(Param::CounterIndex(ci)) => *ci,
        _ => panic!("expected a CounterIndex parameter"),
    }
}

fn expect_function(param: &Option<Param>) -> &Rc<Function> {
    match param {
        Some(Param::Function(f)) => f,
        _ => panic!("expected a Function parameter"),
    }
}
