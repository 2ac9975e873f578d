// Integration tests for the loomscript VM.
//
// Each test assembles a small `.lbc` program and runs it end to end,
// checking observable effects (global table bindings, final stack
// contents, raised errors) rather than VM internals.

use loomscript::assembler::assemble;
use loomscript::value::Value;
use loomscript::vm::{Vm, VmConfig};

fn run(source: &str) -> Vm {
    let bootstrap = assemble(source).expect("program should assemble");
    let mut vm = Vm::new(VmConfig::default());
    vm.run(bootstrap).expect("program should not raise");
    vm
}

#[test]
fn simple_assignment_binds_global() {
    let vm = run(
        r#"
            add_global_table
            push.num 42
            push.counter 1
            get_local_table
            push.name "x"
            push.counter 1
            assign
            clean_stack
            del_global_table
        "#,
    );
    let global = vm.global_table().clone();
    assert_eq!(global.borrow().get_value(&Value::String("x".into())), Value::Number(42.0));
}

#[test]
fn multiple_assignment_pads_missing_values_with_nil() {
    let vm = run(
        r#"
            add_global_table
            push.num 1
            push.num 2
            push.counter 2
            get_local_table
            push.name "a"
            push.counter 1
            assign
            get_local_table
            push.name "b"
            push.counter 1
            assign
            get_local_table
            push.name "c"
            push.counter 1
            assign
            clean_stack
            del_global_table
        "#,
    );
    let global = vm.global_table().clone();
    let g = global.borrow();
    assert_eq!(g.get_value(&Value::String("a".into())), Value::Number(1.0));
    assert_eq!(g.get_value(&Value::String("b".into())), Value::Number(2.0));
    assert_eq!(g.get_value(&Value::String("c".into())), Value::Nil);
}

#[test]
fn indexing_a_non_table_is_a_type_error() {
    let bootstrap = assemble(
        r#"
            add_global_table
            push.num 5
            push.counter 1
            push.name "y"
            get_table_value 0
        "#,
    )
    .unwrap();
    let mut vm = Vm::new(VmConfig::default());
    let err = vm.run(bootstrap).unwrap_err();
    assert!(err.message.contains("number"));
}

#[test]
fn nested_local_tables_shadow_globals() {
    let vm = run(
        r#"
            add_global_table
            push.num 1
            push.counter 1
            get_local_table
            push.name "x"
            push.counter 1
            assign
            clean_stack

            add_local_table
            push.num 2
            push.counter 1
            get_local_table
            push.name "x"
            push.counter 1
            assign
            clean_stack

            get_table "x"
            push.name "x"
            get_table_value 0
        "#,
    );
    assert_eq!(vm.peek(-2).as_value().cloned().unwrap(), Value::Number(2.0));
}

#[test]
fn calling_a_non_callable_value_is_a_type_error() {
    let bootstrap = assemble(
        r#"
            add_global_table
            push.num 7
            push.counter 1
            push.counter 0
            call
        "#,
    )
    .unwrap();
    let mut vm = Vm::new(VmConfig::default());
    let err = vm.run(bootstrap).unwrap_err();
    assert!(err.message.contains("call"));
}

#[test]
fn stdlib_type_of_round_trips_through_a_native_call() {
    let vm = run(
        r#"
            add_global_table
            get_local_table
            push.name "type_of"
            get_table_value 0
            push.str "hi"
            push.counter 1
            call
            reset_counter
        "#,
    );
    assert_eq!(vm.peek(-2).as_value().cloned().unwrap(), Value::String("string".into()));
}

#[test]
fn closure_captures_upvalue_by_value_at_creation_time() {
    let source = r#"
        func read_n upvalues n
            get_table "n"
            push.name "n"
            get_table_value 0
            ret
        end

        add_global_table
        add_local_table
        push.num 1
        push.counter 1
        get_local_table
        push.name "n"
        push.counter 1
        assign
        clean_stack

        closure read_n
        get_local_table
        push.name "f"
        push.counter 1
        assign
        clean_stack

        push.num 2
        push.counter 1
        get_local_table
        push.name "n"
        push.counter 1
        assign
        clean_stack

        get_local_table
        push.name "f"
        get_table_value 0
        push.counter 0
        call
    "#;
    let vm = run(source);
    assert_eq!(vm.peek(-2).as_value().cloned().unwrap(), Value::Number(1.0));
}
