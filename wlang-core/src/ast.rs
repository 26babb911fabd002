//! Syntax tree and per-file declaration tables.

use std::collections::HashMap;
use std::fmt;

use crate::lexer::{Token, TokenKind};

/// Expression tree. Every non-leaf node owns its children.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number, boolean or `null`.
    Constant(Token),
    /// String literal.
    Literal(Token),
    Identifier(Token),
    Unary {
        op: Token,
        operand: Box<Expr>,
    },
    Binary {
        op: Token,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `target.member`; `for_call` is set when a call follows.
    MemberAccess {
        target: Box<Expr>,
        member: Token,
        for_call: bool,
    },
    /// `callee(args)` where callee is an identifier or a member access
    /// whose member is `name`.
    Call {
        callee: Box<Expr>,
        name: Token,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn line(&self) -> usize {
        match self {
            Expr::Constant(token) | Expr::Literal(token) | Expr::Identifier(token) => token.line,
            Expr::Unary { op, .. } | Expr::Binary { op, .. } => op.line,
            Expr::MemberAccess { member, .. } => member.line,
            Expr::Call { name, .. } => name.line,
        }
    }

    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expr::Identifier(_) | Expr::MemberAccess { for_call: false, .. }
        )
    }

    /// Root is a negation, a comparison or a boolean combinator.
    pub fn is_condition_shaped(&self) -> bool {
        match self {
            Expr::Unary { op, .. } => op.is(TokenKind::Bang),
            Expr::Binary { op, .. } => op.kind.is_comparison() || op.kind.is_boolean_combinator(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Expression(Expr),
    VarDecl {
        name: Token,
        constant: bool,
        init: Option<Expr>,
        /// Function parameter bound positionally from call arguments.
        param: bool,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
    Block {
        kind: BlockKind,
        body: Vec<Statement>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    /// `if`, `else if` (`else_chain`) or a bare `else` (no condition).
    If {
        condition: Option<Expr>,
        else_chain: bool,
    },
    While {
        condition: Expr,
    },
    For {
        init: Option<Box<Statement>>,
        check: Option<Expr>,
        step: Option<Expr>,
    },
    Try,
    Catch {
        exception_names: Vec<String>,
        binding: Option<String>,
    },
    General,
}

impl Statement {
    pub fn new(kind: StatementKind, line: usize) -> Self {
        Statement { kind, line }
    }

    pub fn is_param(&self) -> bool {
        matches!(self.kind, StatementKind::VarDecl { param: true, .. })
    }
}

/// Overload key: functions are distinguished by name and arity only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionKey {
    pub name: String,
    pub arity: usize,
}

impl FunctionKey {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        FunctionKey {
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: Token,
    pub constant: bool,
    pub init: Option<Expr>,
    /// Source tokens of the whole declaration, terminator excluded.
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Token,
    pub arity: usize,
    /// Parameters first (`param = true`), then the body statements.
    pub body: Vec<Statement>,
    pub constructor: bool,
    pub tokens: Vec<Token>,
}

impl FunctionDecl {
    pub fn key(&self) -> FunctionKey {
        FunctionKey::new(self.name.content.clone(), self.arity)
    }

    pub fn params(&self) -> &[Statement] {
        &self.body[..self.arity]
    }

    pub fn statements(&self) -> &[Statement] {
        &self.body[self.arity..]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Token,
    pub parent: Option<Token>,
    pub variables: Vec<VariableDecl>,
    pub functions: HashMap<FunctionKey, FunctionDecl>,
    pub tokens: Vec<Token>,
}

impl ClassDecl {
    pub fn variable(&self, name: &str) -> Option<&VariableDecl> {
        self.variables.iter().find(|var| var.name.content == name)
    }

    pub fn constructors(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.functions.values().filter(|function| function.constructor)
    }

    pub fn methods(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.functions.values().filter(|function| !function.constructor)
    }

    pub fn has_method(&self, name: &str, arity: usize) -> bool {
        self.functions
            .get(&FunctionKey::new(name, arity))
            .is_some_and(|function| !function.constructor)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.variable(name).is_some() || self.methods().any(|method| method.name.content == name)
    }
}

/// `import a.b.C [as Alias];`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub path: Vec<String>,
    pub alias: Option<String>,
    pub line: usize,
}

impl ImportDecl {
    pub fn qualified_name(&self) -> String {
        self.path.join(".")
    }

    /// Name the import is visible under: the alias wins over the last segment.
    pub fn visible_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.path.last().map(String::as_str).unwrap_or_default(),
        }
    }
}

/// File-scope item in source order.
#[derive(Debug, Clone, PartialEq)]
pub enum TopLevel {
    /// Index into `FileDecl::variables`.
    Variable(usize),
    Statement(Statement),
}

/// Declaration table of one source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileDecl {
    pub name: String,
    pub variables: Vec<VariableDecl>,
    pub functions: HashMap<FunctionKey, FunctionDecl>,
    pub classes: Vec<ClassDecl>,
    pub imports: Vec<ImportDecl>,
    pub top_level: Vec<TopLevel>,
}

impl FileDecl {
    pub fn new(name: impl Into<String>) -> Self {
        FileDecl {
            name: name.into(),
            ..FileDecl::default()
        }
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDecl> {
        self.variables.iter().find(|var| var.name.content == name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|class| class.name.content == name)
    }

    pub fn has_function_named(&self, name: &str) -> bool {
        self.functions.keys().any(|key| key.name == name)
    }
}
