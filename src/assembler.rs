// File: src/assembler.rs
//
// A minimal textual bootstrap format (".lbc"), one instruction per line,
// so fixtures and the `asm-dump`/`run` CLI subcommands don't require a
// binary encoder (spec §6, "External Interfaces").
//
// Grammar (blank lines and `#`-comments ignored):
//
//   func <name> [upvalues a,b,c] [params x,y]
//     <instruction>
//     ...
//   end
//
//   <instruction>
//
// A `func` block compiles to a `Function` that a later `closure <name>`
// instruction can reference; blocks must be declared before use.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::bytecode::{Bootstrap, Instruction};
use crate::closure::Function;
use crate::value::Value;

#[derive(Debug)]
pub struct AssembleError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for AssembleError {}

/// Parses a complete `.lbc` source into a `Bootstrap`, resolving
/// `closure <name>` references against `func` blocks defined earlier in
/// the same source.
pub fn assemble(source: &str) -> Result<Bootstrap, AssembleError> {
    let mut functions: HashMap<String, Rc<Function>> = HashMap::new();
    let mut top_level: Vec<Instruction> = Vec::new();

    let lines: Vec<&str> = source.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let (raw, lineno) = (lines[i], i + 1);
        let trimmed = raw.split('#').next().unwrap_or("").trim();
        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("func ") {
            let (name, upvalue_names, param_names) = parse_func_header(rest, lineno)?;
            let mut body = Vec::new();
            i += 1;
            loop {
                if i >= lines.len() {
                    return Err(AssembleError { line: lineno, message: "unterminated func block".into() });
                }
                let body_trimmed = lines[i].split('#').next().unwrap_or("").trim();
                if body_trimmed == "end" {
                    break;
                }
                if !body_trimmed.is_empty() {
                    body.push(parse_instruction(body_trimmed, i + 1, &functions)?);
                }
                i += 1;
            }
            let function = Rc::new(Function::new(Some(name.clone()), body, upvalue_names, param_names));
            functions.insert(name, function);
            i += 1;
            continue;
        }

        top_level.push(parse_instruction(trimmed, lineno, &functions)?);
        i += 1;
    }

    Ok(Bootstrap::new(top_level))
}

fn parse_func_header(
    rest: &str,
    lineno: usize,
) -> Result<(String, Vec<String>, Vec<String>), AssembleError> {
    let mut parts = rest.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| AssembleError { line: lineno, message: "func requires a name".into() })?
        .to_string();

    let mut upvalue_names = Vec::new();
    let mut param_names = Vec::new();
    let remainder: Vec<&str> = parts.collect();
    let mut j = 0;
    while j < remainder.len() {
        match remainder[j] {
            "upvalues" => {
                j += 1;
                if j < remainder.len() {
                    upvalue_names = split_names(remainder[j]);
                    j += 1;
                }
            }
            "params" => {
                j += 1;
                if j < remainder.len() {
                    param_names = split_names(remainder[j]);
                    j += 1;
                }
            }
            other => {
                return Err(AssembleError {
                    line: lineno,
                    message: format!("unexpected token in func header: {other}"),
                })
            }
        }
    }
    Ok((name, upvalue_names, param_names))
}

fn split_names(s: &str) -> Vec<String> {
    s.split(',').filter(|n| !n.is_empty()).map(|n| n.to_string()).collect()
}

fn parse_instruction(
    line: &str,
    lineno: usize,
    functions: &HashMap<String, Rc<Function>>,
) -> Result<Instruction, AssembleError> {
    let mut parts = line.splitn(2, char::is_whitespace);
    let op = parts.next().unwrap_or("");
    let arg = parts.next().map(str::trim).unwrap_or("");

    let err = |message: String| AssembleError { line: lineno, message };

    match op {
        "push.num" => {
            let n: f64 = arg.parse().map_err(|_| err(format!("invalid number literal: {arg}")))?;
            Ok(Instruction::push_value(Value::Number(n)))
        }
        "push.str" => Ok(Instruction::push_value(Value::String(Rc::from(unquote(arg))))),
        "push.bool" => {
            let b: bool = arg.parse().map_err(|_| err(format!("invalid bool literal: {arg}")))?;
            Ok(Instruction::push_value(Value::Bool(b)))
        }
        "push.nil" => Ok(Instruction::push_value(Value::Nil)),
        "push.name" => Ok(Instruction::push_name(Value::String(Rc::from(unquote(arg))))),
        "push.counter" => {
            let n: usize = arg.parse().map_err(|_| err(format!("invalid counter total: {arg}")))?;
            Ok(Instruction::push_counter(n))
        }
        "clean_stack" => Ok(Instruction::clean_stack()),
        "get_local_table" => Ok(Instruction::get_local_table()),
        "get_table" => Ok(Instruction::get_table(Value::String(Rc::from(unquote(arg))))),
        "get_table_value" => {
            let ci: usize = arg.parse().map_err(|_| err(format!("invalid counter index: {arg}")))?;
            Ok(Instruction::get_table_value(ci))
        }
        "assign" => Ok(Instruction::assign()),
        "closure" => {
            let function = functions
                .get(arg)
                .ok_or_else(|| err(format!("undefined func block: {arg}")))?
                .clone();
            Ok(Instruction::generate_closure(function))
        }
        "call" => Ok(Instruction::call()),
        "ret" => Ok(Instruction::ret()),
        "generate_arg_table" => Ok(Instruction::generate_arg_table()),
        "merge_counter" => Ok(Instruction::merge_counter()),
        "reset_counter" => Ok(Instruction::reset_counter()),
        "duplicate_counter" => Ok(Instruction::duplicate_counter()),
        "add_local_table" => Ok(Instruction::add_local_table()),
        "del_local_table" => Ok(Instruction::del_local_table()),
        "add_global_table" => Ok(Instruction::add_global_table()),
        "del_global_table" => Ok(Instruction::del_global_table()),
        other => Err(err(format!("unknown opcode: {other}"))),
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{Vm, VmConfig};

    #[test]
    fn assembles_and_runs_simple_assignment() {
        let source = r#"
            add_global_table
            push.num 1
            push.counter 1
            get_local_table
            push.name "x"
            push.counter 1
            assign
            clean_stack
            del_global_table
        "#;
        let bootstrap = assemble(source).expect("should assemble");
        let mut vm = Vm::new(VmConfig::default());
        vm.run(bootstrap).expect("should run");
        assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn unknown_opcode_reports_line_number() {
        let err = assemble("bogus_op").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn func_block_resolves_into_closure_instruction() {
        let source = r#"
            func identity params x
              get_table "x"
              push.name "x"
              get_table_value 0
              ret
            end

            closure identity
        "#;
        let bootstrap = assemble(source).expect("should assemble");
        assert_eq!(bootstrap.instructions.len(), 1);
    }
}
