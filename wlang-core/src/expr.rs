//! Recursive-descent expression parser over a flat token run.
//!
//! Precedence, lowest first: `=` (right-associative), `||`, `&&`,
//! `==`/`!=`, relational, additive, multiplicative, prefix `!`/`-`,
//! call/member chain, primary.

use crate::ast::Expr;
use crate::error::StructuralError;
use crate::lexer::{Token, TokenKind};

/// Parse one complete expression. `line` is reported when `tokens` is empty.
pub fn parse_expression(tokens: &[Token], line: usize) -> Result<Expr, StructuralError> {
    if tokens.is_empty() {
        return Err(StructuralError::UnexpectedEnd { line });
    }
    let mut cursor = 0;
    let expr = parse_assignment(tokens, &mut cursor)?;
    match tokens.get(cursor) {
        None => Ok(expr),
        Some(token) => Err(StructuralError::UnknownToken {
            token: token.to_source(),
            line: token.line,
        }),
    }
}

fn peek_kind(tokens: &[Token], cursor: usize) -> Option<TokenKind> {
    tokens.get(cursor).map(|token| token.kind)
}

fn previous_line(tokens: &[Token], cursor: usize) -> usize {
    cursor
        .checked_sub(1)
        .and_then(|index| tokens.get(index))
        .or_else(|| tokens.last())
        .map_or(0, |token| token.line)
}

fn parse_assignment(tokens: &[Token], cursor: &mut usize) -> Result<Expr, StructuralError> {
    let target = parse_binary_level(tokens, cursor, 0)?;
    if peek_kind(tokens, *cursor) != Some(TokenKind::Assign) {
        return Ok(target);
    }
    let op = tokens[*cursor].clone();
    *cursor += 1;
    if !target.is_assignable() {
        return Err(StructuralError::InvalidAssignmentTarget { line: op.line });
    }
    let value = parse_assignment(tokens, cursor)?;
    Ok(Expr::Binary {
        op,
        left: Box::new(target),
        right: Box::new(value),
    })
}

/// Binary levels from loosest to tightest binding.
const BINARY_LEVELS: &[&[TokenKind]] = &[
    &[TokenKind::OrOr],
    &[TokenKind::AndAnd],
    &[TokenKind::Equal, TokenKind::NotEqual],
    &[
        TokenKind::Less,
        TokenKind::LessEqual,
        TokenKind::Greater,
        TokenKind::GreaterEqual,
    ],
    &[TokenKind::Plus, TokenKind::Minus],
    &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
];

fn parse_binary_level(
    tokens: &[Token],
    cursor: &mut usize,
    level: usize,
) -> Result<Expr, StructuralError> {
    let Some(operators) = BINARY_LEVELS.get(level) else {
        return parse_unary(tokens, cursor);
    };

    let mut left = parse_binary_level(tokens, cursor, level + 1)?;
    while let Some(kind) = peek_kind(tokens, *cursor) {
        if !operators.contains(&kind) {
            break;
        }
        let op = tokens[*cursor].clone();
        *cursor += 1;
        let right = parse_binary_level(tokens, cursor, level + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_unary(tokens: &[Token], cursor: &mut usize) -> Result<Expr, StructuralError> {
    match peek_kind(tokens, *cursor) {
        Some(TokenKind::Bang) | Some(TokenKind::Minus) => {
            let op = tokens[*cursor].clone();
            *cursor += 1;
            let operand = parse_unary(tokens, cursor)?;
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            })
        }
        _ => parse_chain(tokens, cursor),
    }
}

fn parse_chain(tokens: &[Token], cursor: &mut usize) -> Result<Expr, StructuralError> {
    let mut expr = parse_primary(tokens, cursor)?;
    loop {
        match peek_kind(tokens, *cursor) {
            Some(TokenKind::LParen) => {
                let line = tokens[*cursor].line;
                let args = parse_arguments(tokens, cursor)?;
                expr = build_call(expr, args, line)?;
            }
            Some(TokenKind::Dot) => {
                *cursor += 1;
                let member = match tokens.get(*cursor) {
                    Some(token) if token.is(TokenKind::Identifier) => token.clone(),
                    _ => {
                        return Err(StructuralError::MissingToken {
                            expected: "member name after '.'",
                            line: previous_line(tokens, *cursor),
                        });
                    }
                };
                *cursor += 1;
                expr = Expr::MemberAccess {
                    target: Box::new(expr),
                    member,
                    for_call: false,
                };
            }
            Some(TokenKind::PlusPlus) | Some(TokenKind::MinusMinus) => {
                let op = tokens[*cursor].clone();
                *cursor += 1;
                return desugar_step(expr, op);
            }
            _ => return Ok(expr),
        }
    }
}

fn build_call(callee: Expr, args: Vec<Expr>, line: usize) -> Result<Expr, StructuralError> {
    match callee {
        Expr::Identifier(name) => Ok(Expr::Call {
            callee: Box::new(Expr::Identifier(name.clone())),
            name,
            args,
        }),
        Expr::MemberAccess { target, member, .. } => Ok(Expr::Call {
            callee: Box::new(Expr::MemberAccess {
                target,
                member: member.clone(),
                for_call: true,
            }),
            name: member,
            args,
        }),
        _ => Err(StructuralError::NotCallable { line }),
    }
}

/// `target++` becomes `target = target + 1`.
fn desugar_step(target: Expr, op: Token) -> Result<Expr, StructuralError> {
    if !target.is_assignable() {
        return Err(StructuralError::InvalidAssignmentTarget { line: op.line });
    }
    let (spelling, kind) = if op.is(TokenKind::PlusPlus) {
        ("+", TokenKind::Plus)
    } else {
        ("-", TokenKind::Minus)
    };
    let step = Expr::Binary {
        op: Token::new(spelling, kind, op.line),
        left: Box::new(target.clone()),
        right: Box::new(Expr::Constant(Token::new("1", TokenKind::Integer, op.line))),
    };
    Ok(Expr::Binary {
        op: Token::new("=", TokenKind::Assign, op.line),
        left: Box::new(target),
        right: Box::new(step),
    })
}

/// Parse `( arg, ... )` starting at the opening parenthesis.
fn parse_arguments(tokens: &[Token], cursor: &mut usize) -> Result<Vec<Expr>, StructuralError> {
    *cursor += 1;
    let mut args = Vec::new();
    if peek_kind(tokens, *cursor) == Some(TokenKind::RParen) {
        *cursor += 1;
        return Ok(args);
    }
    loop {
        args.push(parse_assignment(tokens, cursor)?);
        match peek_kind(tokens, *cursor) {
            Some(TokenKind::Comma) => *cursor += 1,
            Some(TokenKind::RParen) => {
                *cursor += 1;
                return Ok(args);
            }
            _ => {
                return Err(StructuralError::MissingToken {
                    expected: "')' after arguments",
                    line: previous_line(tokens, *cursor),
                });
            }
        }
    }
}

fn parse_primary(tokens: &[Token], cursor: &mut usize) -> Result<Expr, StructuralError> {
    let Some(token) = tokens.get(*cursor) else {
        return Err(StructuralError::UnexpectedEnd {
            line: previous_line(tokens, *cursor),
        });
    };
    let expr = match token.kind {
        TokenKind::True
        | TokenKind::False
        | TokenKind::Null
        | TokenKind::Integer
        | TokenKind::Double => Expr::Constant(token.clone()),
        TokenKind::StringLiteral => Expr::Literal(token.clone()),
        TokenKind::Identifier => Expr::Identifier(token.clone()),
        TokenKind::LParen => {
            *cursor += 1;
            let inner = parse_assignment(tokens, cursor)?;
            if peek_kind(tokens, *cursor) != Some(TokenKind::RParen) {
                return Err(StructuralError::MissingToken {
                    expected: "')'",
                    line: previous_line(tokens, *cursor),
                });
            }
            *cursor += 1;
            return Ok(inner);
        }
        _ => {
            return Err(StructuralError::UnknownToken {
                token: token.to_source(),
                line: previous_line(tokens, *cursor),
            });
        }
    };
    *cursor += 1;
    Ok(expr)
}
