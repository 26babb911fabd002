//! System functions and the console they write to.
//!
//! System functions are visible to every file without a declaration.
//! They never touch stdout directly; output goes through a [`Console`]
//! supplied by the embedder.

use std::io::Write;

use crate::ast::FunctionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemFunctionKind {
    /// Writes the rendered argument.
    Print,
    /// Writes the rendered argument followed by a newline.
    PrintLine,
}

/// Metadata about a single system function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemFunction {
    /// Name at the W level.
    pub name: &'static str,
    pub arity: usize,
    pub kind: SystemFunctionKind,
}

impl SystemFunction {
    pub fn key(&self) -> FunctionKey {
        FunctionKey::new(self.name, self.arity)
    }
}

/// The complete list of system functions known to the core.
pub const SYSTEM_FUNCTIONS: &[SystemFunction] = &[
    SystemFunction {
        name: "print",
        arity: 1,
        kind: SystemFunctionKind::Print,
    },
    SystemFunction {
        name: "println",
        arity: 1,
        kind: SystemFunctionKind::PrintLine,
    },
];

/// Look up a system function by name and exact arity.
pub fn find_system_function(name: &str, arity: usize) -> Option<&'static SystemFunction> {
    SYSTEM_FUNCTIONS
        .iter()
        .find(|function| function.name == name && function.arity == arity)
}

/// Sink for script output.
pub trait Console {
    fn write(&mut self, text: &str);
}

/// Captures output in memory.
impl Console for String {
    fn write(&mut self, text: &str) {
        self.push_str(text);
    }
}

/// Writes to the process stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn write(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
            tracing::warn!("failed to write script output: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_system_functions_by_exact_arity() {
        let println = find_system_function("println", 1).expect("println");
        assert_eq!(println.kind, SystemFunctionKind::PrintLine);
        assert_eq!(println.key(), FunctionKey::new("println", 1));
        assert!(find_system_function("println", 2).is_none());
        assert!(find_system_function("input", 0).is_none());
    }

    #[test]
    fn string_console_captures_output() {
        let mut out = String::new();
        Console::write(&mut out, "a");
        Console::write(&mut out, "b\n");
        assert_eq!(out, "ab\n");
    }
}
