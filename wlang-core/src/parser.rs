//! File-level structural parser: builds the declaration table of one file.

use crate::ast::{ClassDecl, FileDecl, FunctionDecl, ImportDecl, Statement, StatementKind, TopLevel};
use crate::block::{parse_expression_statement, parse_statements, parse_variable};
use crate::error::StructuralError;
use crate::lexer::{Token, TokenKind};
use crate::stream::{TokenStream, split_top_level};

/// Parse a whole file's tokens into its declaration table.
pub fn parse_file(name: &str, tokens: Vec<Token>) -> Result<FileDecl, StructuralError> {
    let mut stream = TokenStream::new(tokens, 1);
    let mut file = FileDecl::new(name);

    while let Some(token) = stream.peek().cloned() {
        match token.kind {
            TokenKind::Let => {
                let decl = parse_variable(&mut stream)?;
                if file.variable(&decl.name.content).is_some() {
                    return Err(StructuralError::DuplicateVariable {
                        name: decl.name.content,
                        line: decl.name.line,
                    });
                }
                file.top_level.push(TopLevel::Variable(file.variables.len()));
                file.variables.push(decl);
            }
            TokenKind::Function => {
                let function = parse_function(&mut stream, false)?;
                let key = function.key();
                if file.functions.contains_key(&key) {
                    return Err(StructuralError::DuplicateFunction {
                        name: key.name,
                        arity: key.arity,
                        line: function.name.line,
                    });
                }
                if file.class(&key.name).is_some() {
                    return Err(StructuralError::ClassFunctionCollision {
                        name: key.name,
                        line: function.name.line,
                    });
                }
                file.functions.insert(key, function);
            }
            TokenKind::Class => {
                let class = parse_class(&mut stream)?;
                let class_name = &class.name;
                if file.class(&class_name.content).is_some() {
                    return Err(StructuralError::DuplicateClass {
                        name: class_name.content.clone(),
                        line: class_name.line,
                    });
                }
                if file.has_function_named(&class_name.content) {
                    return Err(StructuralError::ClassFunctionCollision {
                        name: class_name.content.clone(),
                        line: class_name.line,
                    });
                }
                file.classes.push(class);
            }
            TokenKind::Import => {
                let import = parse_import(&mut stream)?;
                if !file.imports.contains(&import) {
                    file.imports.push(import);
                }
            }
            TokenKind::Identifier => {
                let statement = parse_expression_statement(&mut stream)?;
                file.top_level.push(TopLevel::Statement(statement));
            }
            _ => {
                return Err(StructuralError::MisplacedToken {
                    token: token.to_source(),
                    line: token.line,
                });
            }
        }
    }

    Ok(file)
}

/// `function NAME(PARAMS) { BODY }`, or `NAME(PARAMS) { BODY }` for a constructor.
fn parse_function(
    stream: &mut TokenStream,
    constructor: bool,
) -> Result<FunctionDecl, StructuralError> {
    let start = stream.position();
    if !constructor {
        stream.expect(TokenKind::Function, "'function'")?;
    }
    let name = stream.expect(TokenKind::Identifier, "function name")?;
    let params = parse_params(stream.capture_parens()?, name.line)?;
    let arity = params.len();
    let body_tokens = stream.capture_braces()?;

    let mut body = params;
    body.extend(parse_statements(body_tokens, name.line)?);

    Ok(FunctionDecl {
        name,
        arity,
        body,
        constructor,
        tokens: stream.consumed_since(start),
    })
}

fn parse_params(tokens: Vec<Token>, line: usize) -> Result<Vec<Statement>, StructuralError> {
    let mut params: Vec<Statement> = Vec::new();
    for part in split_top_level(&tokens, TokenKind::Comma) {
        let (constant, rest) = match part.split_first() {
            Some((first, rest)) if first.is(TokenKind::Const) => (true, rest),
            _ => (false, part.as_slice()),
        };
        let name = match rest {
            [name] if name.is(TokenKind::Identifier) => name.clone(),
            [] => {
                return Err(StructuralError::MissingToken {
                    expected: "parameter name",
                    line,
                });
            }
            [other, ..] => {
                return Err(StructuralError::MisplacedToken {
                    token: other.to_source(),
                    line: other.line,
                });
            }
        };
        let duplicate = params.iter().any(|param| match &param.kind {
            StatementKind::VarDecl { name: existing, .. } => existing.content == name.content,
            _ => false,
        });
        if duplicate {
            return Err(StructuralError::DuplicateVariable {
                name: name.content,
                line: name.line,
            });
        }
        let param_line = name.line;
        params.push(Statement::new(
            StatementKind::VarDecl {
                name,
                constant,
                init: None,
                param: true,
            },
            param_line,
        ));
    }
    Ok(params)
}

/// `class NAME [implements PARENT] { MEMBERS }`
fn parse_class(stream: &mut TokenStream) -> Result<ClassDecl, StructuralError> {
    let start = stream.position();
    stream.expect(TokenKind::Class, "'class'")?;
    let name = stream.expect(TokenKind::Identifier, "class name")?;
    let parent = if stream.peek_is(TokenKind::Implements) {
        stream.next();
        Some(stream.expect(TokenKind::Identifier, "parent class name")?)
    } else {
        None
    };

    let mut members = TokenStream::new(stream.capture_braces()?, name.line);
    let mut class = ClassDecl {
        name,
        parent,
        variables: Vec::new(),
        functions: Default::default(),
        tokens: Vec::new(),
    };

    while let Some(token) = members.next() {
        match token.kind {
            TokenKind::Let => {
                members.push_back();
                let decl = parse_variable(&mut members)?;
                if class.variable(&decl.name.content).is_some() {
                    return Err(StructuralError::DuplicateVariable {
                        name: decl.name.content,
                        line: decl.name.line,
                    });
                }
                class.variables.push(decl);
            }
            TokenKind::Function | TokenKind::Identifier => {
                let constructor =
                    token.is(TokenKind::Identifier) && token.content == class.name.content;
                if token.is(TokenKind::Identifier) && !constructor {
                    return Err(StructuralError::MisplacedToken {
                        token: token.content,
                        line: token.line,
                    });
                }
                members.push_back();
                let function = parse_function(&mut members, constructor)?;
                let key = function.key();
                if class.functions.contains_key(&key) {
                    return Err(StructuralError::DuplicateFunction {
                        name: key.name,
                        arity: key.arity,
                        line: function.name.line,
                    });
                }
                class.functions.insert(key, function);
            }
            _ => {
                return Err(StructuralError::MisplacedToken {
                    token: token.to_source(),
                    line: token.line,
                });
            }
        }
    }

    class.tokens = stream.consumed_since(start);
    Ok(class)
}

/// `import a.b.C [as Alias];`
fn parse_import(stream: &mut TokenStream) -> Result<ImportDecl, StructuralError> {
    let keyword = stream.expect(TokenKind::Import, "'import'")?;
    let mut run = TokenStream::new(stream.capture_statement()?, keyword.line);

    let mut path = vec![run.expect(TokenKind::Identifier, "import path")?.content];
    while run.peek_is(TokenKind::Dot) {
        run.next();
        path.push(run.expect(TokenKind::Identifier, "name after '.'")?.content);
    }
    let alias = if run.peek_is(TokenKind::As) {
        run.next();
        Some(run.expect(TokenKind::Identifier, "alias after 'as'")?.content)
    } else {
        None
    };
    if let Some(extra) = run.next() {
        return Err(StructuralError::MisplacedToken {
            token: extra.to_source(),
            line: extra.line,
        });
    }

    Ok(ImportDecl {
        path,
        alias,
        line: keyword.line,
    })
}
