use tracing::debug;

use crate::ast::FileDecl;
use crate::builtins::Console;
use crate::error::CoreError;
use crate::host::HostBridge;
use crate::interpreter::Interpreter;
use crate::lexer::tokenize;
use crate::parser::parse_file;
use crate::runtime::Program;
use crate::sources::SourceFile;
use crate::value::Value;
use crate::verifier::verify_program;

/// What to do once every file has been initialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// File holding the entry function; the first source when unset.
    pub entry_file: Option<String>,
    /// Zero-argument function to invoke after initialization.
    pub entry_function: Option<String>,
}

/// Lex and parse one file.
pub fn parse_source(name: &str, text: &str) -> Result<FileDecl, CoreError> {
    let tokens = tokenize(text).map_err(|source| CoreError::Lex {
        file: name.to_string(),
        source,
    })?;
    let file = parse_file(name, tokens).map_err(|source| CoreError::Structural {
        file: name.to_string(),
        source,
    })?;
    debug!(
        file = name,
        functions = file.functions.len(),
        classes = file.classes.len(),
        "parsed"
    );
    Ok(file)
}

/// Parse every source, verify them together and build the runtime.
pub fn compile(sources: &[SourceFile], host: &dyn HostBridge) -> Result<Program, CoreError> {
    let files = sources
        .iter()
        .map(|source| parse_source(&source.name, &source.contents))
        .collect::<Result<Vec<_>, _>>()?;
    verify_program(&files, host)?;
    Ok(Program::build(files))
}

/// Compile and execute. Returns the entry function's value when one was
/// requested.
pub fn run(
    sources: &[SourceFile],
    options: &RunOptions,
    host: &mut dyn HostBridge,
    console: &mut dyn Console,
) -> Result<Option<Value>, CoreError> {
    let entry_file = match &options.entry_file {
        Some(name) => sources
            .iter()
            .position(|source| source.is_named(name))
            .ok_or_else(|| CoreError::UnknownEntryFile(name.clone()))?,
        None => 0,
    };

    let program = compile(sources, &*host)?;
    let mut interpreter = Interpreter::new(&program, host, console);
    interpreter.initialize()?;

    match &options.entry_function {
        Some(name) => interpreter.call_entry(entry_file, name).map(Some),
        None => Ok(None),
    }
}
