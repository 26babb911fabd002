//! Statement and block formatting inside function, class and block bodies.

use crate::ast::{BlockKind, Expr, Statement, StatementKind, VariableDecl};
use crate::error::StructuralError;
use crate::expr::parse_expression;
use crate::lexer::{Token, TokenKind};
use crate::stream::{TokenStream, split_top_level};

/// Split a body run into statements. `line` is used for errors at an empty end.
pub(crate) fn parse_statements(
    tokens: Vec<Token>,
    line: usize,
) -> Result<Vec<Statement>, StructuralError> {
    let mut stream = TokenStream::new(tokens, line);
    let mut statements = Vec::new();
    while let Some(token) = stream.peek().cloned() {
        let statement = match token.kind {
            TokenKind::Let => parse_variable_statement(&mut stream)?,
            TokenKind::Return => {
                let keyword = stream.next().ok_or(StructuralError::UnexpectedEnd { line })?;
                let run = stream.capture_statement()?;
                let value = if run.is_empty() {
                    None
                } else {
                    Some(parse_expression(&run, keyword.line)?)
                };
                Statement::new(StatementKind::Return(value), keyword.line)
            }
            TokenKind::Break | TokenKind::Continue => {
                let keyword = stream.next().ok_or(StructuralError::UnexpectedEnd { line })?;
                let run = stream.capture_statement()?;
                if !run.is_empty() {
                    return Err(StructuralError::DanglingStatement { line: keyword.line });
                }
                let kind = if keyword.is(TokenKind::Break) {
                    StatementKind::Break
                } else {
                    StatementKind::Continue
                };
                Statement::new(kind, keyword.line)
            }
            TokenKind::Throw => {
                let keyword = stream.next().ok_or(StructuralError::UnexpectedEnd { line })?;
                let run = stream.capture_statement()?;
                let value = parse_expression(&run, keyword.line)?;
                Statement::new(StatementKind::Throw(value), keyword.line)
            }
            TokenKind::If
            | TokenKind::Else
            | TokenKind::While
            | TokenKind::For
            | TokenKind::Try
            | TokenKind::Catch
            | TokenKind::LBrace => parse_block(&mut stream)?,
            TokenKind::Function | TokenKind::Class | TokenKind::Import => {
                return Err(StructuralError::MisplacedToken {
                    token: token.content,
                    line: token.line,
                });
            }
            _ => parse_expression_statement(&mut stream)?,
        };
        statements.push(statement);
    }
    Ok(statements)
}

/// `let [const] NAME [= EXPR];` starting at the `let` keyword.
pub(crate) fn parse_variable_statement(
    stream: &mut TokenStream,
) -> Result<Statement, StructuralError> {
    let decl = parse_variable(stream)?;
    let line = decl.name.line;
    Ok(Statement::new(
        StatementKind::VarDecl {
            name: decl.name,
            constant: decl.constant,
            init: decl.init,
            param: false,
        },
        line,
    ))
}

pub(crate) fn parse_variable(stream: &mut TokenStream) -> Result<VariableDecl, StructuralError> {
    let keyword = stream.expect(TokenKind::Let, "'let'")?;
    let run = stream.capture_statement()?;
    format_variable(keyword, run)
}

/// Build a declaration from the `let` keyword and the run that followed it.
pub(crate) fn format_variable(
    keyword: Token,
    run: Vec<Token>,
) -> Result<VariableDecl, StructuralError> {
    let mut tokens = Vec::with_capacity(run.len() + 1);
    tokens.push(keyword.clone());
    tokens.extend(run.iter().cloned());

    let mut rest = run.as_slice();
    let constant = rest.first().is_some_and(|token| token.is(TokenKind::Const));
    if constant {
        rest = &rest[1..];
    }
    let name = match rest.first() {
        Some(token) if token.is(TokenKind::Identifier) => token.clone(),
        Some(token) => {
            return Err(StructuralError::MisplacedToken {
                token: token.to_source(),
                line: token.line,
            });
        }
        None => {
            return Err(StructuralError::MissingToken {
                expected: "variable name",
                line: keyword.line,
            });
        }
    };
    rest = &rest[1..];

    let init = match rest.split_first() {
        None => None,
        Some((assign, value)) if assign.is(TokenKind::Assign) => {
            Some(parse_expression(value, assign.line)?)
        }
        Some((token, _)) => {
            return Err(StructuralError::MisplacedToken {
                token: token.to_source(),
                line: token.line,
            });
        }
    };

    Ok(VariableDecl {
        name,
        constant,
        init,
        tokens,
    })
}

pub(crate) fn parse_expression_statement(
    stream: &mut TokenStream,
) -> Result<Statement, StructuralError> {
    let line = stream.peek().map_or(stream.line(), |token| token.line);
    let run = stream.capture_statement()?;
    let expr = parse_expression(&run, line)?;
    Ok(Statement::new(StatementKind::Expression(expr), line))
}

fn parse_block(stream: &mut TokenStream) -> Result<Statement, StructuralError> {
    let Some(head) = stream.peek().cloned() else {
        return Err(StructuralError::UnexpectedEnd {
            line: stream.line(),
        });
    };
    match head.kind {
        TokenKind::If => parse_if(stream),
        TokenKind::Else => parse_else(stream),
        TokenKind::While => parse_while(stream),
        TokenKind::For => parse_for(stream),
        TokenKind::Try => {
            stream.next();
            let body = parse_body(stream, head.line)?;
            Ok(block(BlockKind::Try, body, head.line))
        }
        TokenKind::Catch => parse_catch(stream),
        _ => {
            let body = parse_body(stream, head.line)?;
            Ok(block(BlockKind::General, body, head.line))
        }
    }
}

fn block(kind: BlockKind, body: Vec<Statement>, line: usize) -> Statement {
    Statement::new(StatementKind::Block { kind, body }, line)
}

fn parse_body(stream: &mut TokenStream, line: usize) -> Result<Vec<Statement>, StructuralError> {
    let inner = stream.capture_braces()?;
    parse_statements(inner, line)
}

fn parse_condition(stream: &mut TokenStream, keyword: &Token) -> Result<Expr, StructuralError> {
    let run = stream.capture_parens()?;
    if run.is_empty() {
        return Err(StructuralError::EmptyCondition { line: keyword.line });
    }
    parse_expression(&run, keyword.line)
}

fn parse_if(stream: &mut TokenStream) -> Result<Statement, StructuralError> {
    let keyword = stream.expect(TokenKind::If, "'if'")?;
    let condition = parse_condition(stream, &keyword)?;
    let body = parse_body(stream, keyword.line)?;
    Ok(block(
        BlockKind::If {
            condition: Some(condition),
            else_chain: false,
        },
        body,
        keyword.line,
    ))
}

fn parse_else(stream: &mut TokenStream) -> Result<Statement, StructuralError> {
    let keyword = stream.expect(TokenKind::Else, "'else'")?;
    if stream.peek_is(TokenKind::If) {
        let mut chained = parse_if(stream)?;
        if let StatementKind::Block {
            kind: BlockKind::If { else_chain, .. },
            ..
        } = &mut chained.kind
        {
            *else_chain = true;
        }
        chained.line = keyword.line;
        return Ok(chained);
    }
    if !stream.peek_is(TokenKind::LBrace) {
        return Err(StructuralError::MissingToken {
            expected: "'{' or 'if' after 'else'",
            line: keyword.line,
        });
    }
    let body = parse_body(stream, keyword.line)?;
    Ok(block(
        BlockKind::If {
            condition: None,
            else_chain: true,
        },
        body,
        keyword.line,
    ))
}

fn parse_while(stream: &mut TokenStream) -> Result<Statement, StructuralError> {
    let keyword = stream.expect(TokenKind::While, "'while'")?;
    let condition = parse_condition(stream, &keyword)?;
    if !condition.is_condition_shaped() {
        return Err(StructuralError::InvalidLoopCondition {
            keyword: "while",
            line: keyword.line,
        });
    }
    let body = parse_body(stream, keyword.line)?;
    Ok(block(BlockKind::While { condition }, body, keyword.line))
}

fn parse_for(stream: &mut TokenStream) -> Result<Statement, StructuralError> {
    let keyword = stream.expect(TokenKind::For, "'for'")?;
    let header = stream.capture_parens()?;
    let mut clauses = split_top_level(&header, TokenKind::Semicolon).into_iter();
    let (Some(init), Some(check), Some(step), None) = (
        clauses.next(),
        clauses.next(),
        clauses.next(),
        clauses.next(),
    ) else {
        return Err(StructuralError::MissingToken {
            expected: "'init; check; step' in for header",
            line: keyword.line,
        });
    };

    let init = match init.first() {
        None => None,
        Some(first) if first.is(TokenKind::Let) => {
            let first = first.clone();
            let decl = format_variable(first, init[1..].to_vec())?;
            let line = decl.name.line;
            Some(Box::new(Statement::new(
                StatementKind::VarDecl {
                    name: decl.name,
                    constant: decl.constant,
                    init: decl.init,
                    param: false,
                },
                line,
            )))
        }
        Some(first) => {
            let line = first.line;
            let expr = parse_expression(&init, line)?;
            Some(Box::new(Statement::new(StatementKind::Expression(expr), line)))
        }
    };

    let check = if check.is_empty() {
        None
    } else {
        let condition = parse_expression(&check, keyword.line)?;
        if !condition.is_condition_shaped() {
            return Err(StructuralError::InvalidLoopCondition {
                keyword: "for",
                line: keyword.line,
            });
        }
        Some(condition)
    };

    let step = if step.is_empty() {
        None
    } else {
        Some(parse_expression(&step, keyword.line)?)
    };

    let body = parse_body(stream, keyword.line)?;
    Ok(block(BlockKind::For { init, check, step }, body, keyword.line))
}

/// `catch (a.b.First, Second name) { ... }`
fn parse_catch(stream: &mut TokenStream) -> Result<Statement, StructuralError> {
    let keyword = stream.expect(TokenKind::Catch, "'catch'")?;
    let header = stream.capture_parens()?;
    let parts = split_top_level(&header, TokenKind::Comma);
    if parts.is_empty() {
        return Err(StructuralError::MissingToken {
            expected: "exception type in catch",
            line: keyword.line,
        });
    }

    let last = parts.len() - 1;
    let mut exception_names = Vec::with_capacity(parts.len());
    let mut binding = None;
    for (index, part) in parts.iter().enumerate() {
        let mut names = TokenStream::new(part.clone(), keyword.line);
        let mut path = vec![names.expect(TokenKind::Identifier, "exception type name")?.content];
        while names.peek_is(TokenKind::Dot) {
            names.next();
            path.push(
                names
                    .expect(TokenKind::Identifier, "name after '.'")?
                    .content,
            );
        }
        exception_names.push(path.join("."));

        if index == last && names.peek_is(TokenKind::Identifier) {
            binding = names.next().map(|token| token.content);
        }
        if let Some(extra) = names.next() {
            return Err(StructuralError::MisplacedToken {
                token: extra.to_source(),
                line: extra.line,
            });
        }
    }

    let body = parse_body(stream, keyword.line)?;
    Ok(block(
        BlockKind::Catch {
            exception_names,
            binding,
        },
        body,
        keyword.line,
    ))
}
