use std::path::PathBuf;

use thiserror::Error;

/// Top-level failure of the W pipeline, tagged with the file it came from.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("no .w source files were found under {0}")]
    NoSources(PathBuf),
    #[error("{file}: lex error: {source}")]
    Lex {
        file: String,
        #[source]
        source: LexError,
    },
    #[error("{file}: parse error: {source}")]
    Structural {
        file: String,
        #[source]
        source: StructuralError,
    },
    #[error("{file}: semantic error: {source}")]
    Semantic {
        file: String,
        #[source]
        source: SemanticError,
    },
    #[error("{file}: runtime fault: {source}")]
    Runtime {
        file: String,
        #[source]
        source: RuntimeFault,
    },
    #[error("entry file '{0}' is not part of the program")]
    UnknownEntryFile(String),
    #[error("entry function '{name}' with no parameters was not found in {file}")]
    MissingEntry { file: String, name: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("line {line}: unknown operator '{operator}'")]
    UnknownOperator { operator: String, line: usize },
    #[error("line {line}: unexpected character '{character}'")]
    UnexpectedCharacter { character: char, line: usize },
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },
    #[error("line {line}: unterminated block comment")]
    UnterminatedComment { line: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("line {line}: misplaced token '{token}'")]
    MisplacedToken { token: String, line: usize },
    #[error("line {line}: expected {expected}")]
    MissingToken { expected: &'static str, line: usize },
    #[error("line {line}: unknown token '{token}'")]
    UnknownToken { token: String, line: usize },
    #[error("line {line}: unexpected end of expression")]
    UnexpectedEnd { line: usize },
    #[error("line {line}: dangling statement")]
    DanglingStatement { line: usize },
    #[error("line {line}: variable '{name}' is already declared")]
    DuplicateVariable { name: String, line: usize },
    #[error("line {line}: function '{name}' with {arity} parameter(s) is already declared")]
    DuplicateFunction {
        name: String,
        arity: usize,
        line: usize,
    },
    #[error("line {line}: class '{name}' is already declared")]
    DuplicateClass { name: String, line: usize },
    #[error("line {line}: class '{name}' collides with a function of the same name")]
    ClassFunctionCollision { name: String, line: usize },
    #[error("line {line}: left side of '=' is not assignable")]
    InvalidAssignmentTarget { line: usize },
    #[error("line {line}: expression is not callable")]
    NotCallable { line: usize },
    #[error("line {line}: empty condition")]
    EmptyCondition { line: usize },
    #[error("line {line}: {keyword} condition must be a negation, comparison or boolean combination")]
    InvalidLoopCondition { keyword: &'static str, line: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("line {line}: unresolved symbol '{name}'")]
    UnresolvedSymbol { name: String, line: usize },
    #[error("line {line}: no function '{name}' takes {arity} argument(s)")]
    UnresolvedFunction {
        name: String,
        arity: usize,
        line: usize,
    },
    #[error("line {line}: invalid else placement")]
    InvalidElse { line: usize },
    #[error("line {line}: '{keyword}' outside of a loop")]
    OutsideLoop { keyword: &'static str, line: usize },
    #[error("line {line}: catch without a preceding try")]
    CatchWithoutTry { line: usize },
    #[error("line {line}: try is not followed by a catch")]
    TryWithoutCatch { line: usize },
    #[error("line {line}: member access on a literal or constant")]
    MemberOnConstant { line: usize },
    #[error("line {line}: variable '{name}' is already declared in this scope")]
    DuplicateVariable { name: String, line: usize },
    #[error("line {line}: '{name}' is declared in more than one file")]
    DuplicateAcrossFiles { name: String, line: usize },
    #[error("line {line}: class '{name}' inherits from itself")]
    InheritanceCycle { name: String, line: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeFault {
    #[error("line {line}: operator '{operator}' cannot be applied to {left} and {right}")]
    TypeMismatch {
        operator: String,
        left: &'static str,
        right: &'static str,
        line: usize,
    },
    #[error("line {line}: operator '{operator}' cannot be applied to {operand}")]
    UnaryTypeMismatch {
        operator: String,
        operand: &'static str,
        line: usize,
    },
    #[error("line {line}: condition evaluated to {found}, expected bool")]
    ConditionNotBoolean { found: &'static str, line: usize },
    #[error("line {line}: undefined variable '{name}'")]
    UndefinedVariable { name: String, line: usize },
    #[error("line {line}: no function '{name}' takes {arity} argument(s)")]
    UndefinedFunction {
        name: String,
        arity: usize,
        line: usize,
    },
    #[error("line {line}: {type_name} has no member '{member}'")]
    MissingMember {
        type_name: String,
        member: String,
        line: usize,
    },
    #[error("line {line}: cannot access member '{member}' on {type_name}")]
    NotAnInstance {
        type_name: &'static str,
        member: String,
        line: usize,
    },
    #[error("line {line}: cannot assign to constant '{name}'")]
    AssignToConstant { name: String, line: usize },
    #[error("line {line}: variable '{name}' is already declared in this scope")]
    DuplicateVariable { name: String, line: usize },
    #[error("line {line}: division by zero")]
    DivisionByZero { line: usize },
    #[error("line {line}: integer overflow")]
    ArithmeticOverflow { line: usize },
    #[error("line {line}: invalid numeric literal '{literal}'")]
    InvalidNumber { literal: String, line: usize },
    #[error("line {line}: '{keyword}' escaped its function")]
    StrayControlFlow { keyword: &'static str, line: usize },
    #[error("line {line}: host type '{name}' could not be resolved")]
    UnresolvedHostType { name: String, line: usize },
    #[error("line {line}: host fault: {message}")]
    Host { message: String, line: usize },
    #[error("line {line}: uncaught {type_name}")]
    Uncaught { type_name: String, line: usize },
}
