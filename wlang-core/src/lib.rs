//! Core pipeline of the W scripting language.
//!
//! The pipeline is roughly:
//!
//!   source .w files
//!     -> lexer        (tokens)
//!     -> parser       (file declarations, statement trees, expression trees)
//!     -> verifier     (symbols, control placement; all files together)
//!     -> runtime      (program tables)
//!     -> interpreter  (file-scope initialization, optional entry function)
//!
//! Higher-level tools such as the CLI should depend on this crate rather
//! than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------

pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
mod stream;
pub mod ast;
pub mod expr;
mod block;
pub mod parser;

// ---------------------------------------------------------------------
// Semantic layer: symbols and verification
// ---------------------------------------------------------------------

mod symbols;
pub mod verifier;

// ---------------------------------------------------------------------
// Values, builtins and host integration
// ---------------------------------------------------------------------

pub mod types;
pub mod value;
pub mod builtins;
pub mod host;

// ---------------------------------------------------------------------
// Back-end: runtime tables, evaluation and orchestration
// ---------------------------------------------------------------------

pub mod runtime;
mod operators;
pub mod interpreter;
pub mod sources;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use builtins::{Console, StdoutConsole};
pub use compiler::{RunOptions, compile, parse_source, run};
pub use error::CoreError;
pub use host::{HostBridge, HostFault, HostReceiver, HostValue, NoHost, TypeHandle};
pub use interpreter::Interpreter;
pub use runtime::Program;
pub use sources::{SourceFile, load_sources};
pub use value::Value;
