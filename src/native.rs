// File: src/native.rs
//
// The native-function contract (spec §6, "to native functions") and a
// small standard library built on it, so the CLI and tests have
// something callable beyond hand-assembled closures.

use std::rc::Rc;

use crate::errors::RuntimeError;
use crate::table::TableRef;
use crate::value::Value;
use crate::vm::Vm;

/// A native function: a name (for error messages and `Value::Debug`) and
/// the body itself, which runs synchronously against the VM's stack.
///
/// The calling convention mirrors `Call`'s contract: on entry, the top of
/// the stack is the argument counter with the argument values beneath it
/// (`Vm::take_args` pops that run); on exit, the function must have
/// pushed its results followed by a return counter (`Vm::push_return`
/// does that).
pub struct NativeFunction {
    pub name: String,
    pub func: Box<dyn Fn(&mut Vm) -> Result<(), RuntimeError>>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Vm) -> Result<(), RuntimeError> + 'static,
    ) -> Self {
        NativeFunction { name: name.into(), func: Box::new(func) }
    }
}

fn native_print(vm: &mut Vm) -> Result<(), RuntimeError> {
    let args = vm.take_args();
    let rendered: Vec<String> = args.iter().map(|v| v.to_string()).collect();
    println!("{}", rendered.join("\t"));
    vm.push_return(vec![]);
    Ok(())
}

fn native_type_of(vm: &mut Vm) -> Result<(), RuntimeError> {
    let args = vm.take_args();
    let name = args.first().map(|v| v.type_name()).unwrap_or("nil");
    vm.push_return(vec![Value::String(Rc::from(name))]);
    Ok(())
}

fn native_len(vm: &mut Vm) -> Result<(), RuntimeError> {
    let args = vm.take_args();
    let len = match args.first() {
        Some(Value::String(s)) => s.chars().count() as f64,
        Some(Value::Table(t)) => t.borrow().len() as f64,
        _ => 0.0,
    };
    vm.push_return(vec![Value::Number(len)]);
    Ok(())
}

fn native_to_number(vm: &mut Vm) -> Result<(), RuntimeError> {
    let args = vm.take_args();
    let result = match args.first() {
        Some(Value::Number(n)) => Value::Number(*n),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Value::Number).unwrap_or(Value::Nil),
        _ => Value::Nil,
    };
    vm.push_return(vec![result]);
    Ok(())
}

fn native_to_string(vm: &mut Vm) -> Result<(), RuntimeError> {
    let args = vm.take_args();
    let rendered = args.first().map(|v| v.to_string()).unwrap_or_default();
    vm.push_return(vec![Value::String(Rc::from(rendered.as_str()))]);
    Ok(())
}

/// Installs the standard library into `globals`: `print`, `type_of`,
/// `len`, `to_number`, `to_string`.
pub fn install_stdlib(globals: &TableRef) {
    let entries: Vec<(&str, fn(&mut Vm) -> Result<(), RuntimeError>)> = vec![
        ("print", native_print),
        ("type_of", native_type_of),
        ("len", native_len),
        ("to_number", native_to_number),
        ("to_string", native_to_string),
    ];
    let mut table = globals.borrow_mut();
    for (name, func) in entries {
        let native = Rc::new(NativeFunction::new(name, func));
        table
            .assign(Value::String(Rc::from(name)), Value::NativeFunction(native))
            .expect("stdlib names are never nil");
    }
}
