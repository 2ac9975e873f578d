// File: src/errors.rs
//
// Runtime error taxonomy for the VM, reported with a structured type
// rather than a bare String, in the teacher's style of pairing an error
// kind with a message and (optionally) extra context.

use colored::Colorize;
use std::fmt;

/// Runtime error taxonomy (spec §7). `StackShapeError` is carried as a
/// variant for completeness but is never constructed by the VM itself —
/// violations of that kind are `.expect()` panics (see `stack.rs`,
/// `scope.rs`), since spec §7 treats them as internal/debug-only
/// assertions that must not be reachable from valid compiler output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    TypeError,
    KeyError,
    StackShapeError,
    CallDepthExceeded,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeErrorKind::TypeError => write!(f, "type error"),
            RuntimeErrorKind::KeyError => write!(f, "key error"),
            RuntimeErrorKind::StackShapeError => write!(f, "stack shape error"),
            RuntimeErrorKind::CallDepthExceeded => write!(f, "call depth exceeded"),
        }
    }
}

/// A raised runtime error: a taxonomy kind, a human-readable message, and
/// an optional stack trace synthesized from the call stack at the point
/// of failure (spec §7: "optionally, at the implementation's discretion").
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub trace: Option<Vec<String>>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: String) -> Self {
        RuntimeError { kind, message, trace: None }
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = Some(trace);
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.kind.to_string().red().bold(), self.message)?;
        if let Some(trace) = &self.trace {
            for (i, line) in trace.iter().enumerate() {
                writeln!(f, "  {} {}", format!("#{i}").dimmed(), line)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}
