//! Operator semantics over evaluated operands.
//!
//! Both operands of every binary operator are already evaluated when these
//! run; `&&` and `||` included.

use std::cmp::Ordering;

use crate::error::RuntimeFault;
use crate::lexer::{Token, TokenKind};
use crate::types::{ValueType, numeric_supertype};
use crate::value::Value;

fn mismatch(op: &Token, left: &Value, right: &Value) -> RuntimeFault {
    RuntimeFault::TypeMismatch {
        operator: op.content.clone(),
        left: left.type_name(),
        right: right.type_name(),
        line: op.line,
    }
}

/// Apply a non-assignment binary operator. `render` turns a value into its
/// display text for string concatenation.
pub(crate) fn apply_binary(
    op: &Token,
    left: Value,
    right: Value,
    render: impl Fn(&Value) -> String,
) -> Result<Value, RuntimeFault> {
    match op.kind {
        TokenKind::Plus => {
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                return Ok(Value::Str(render(&left) + &render(&right)));
            }
            arithmetic(op, left, right)
        }
        TokenKind::Minus | TokenKind::Star | TokenKind::Slash | TokenKind::Percent => {
            arithmetic(op, left, right)
        }
        TokenKind::Equal => Ok(Value::Bool(values_equal(&left, &right))),
        TokenKind::NotEqual => Ok(Value::Bool(!values_equal(&left, &right))),
        TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
            let ordering = compare_numbers(&left, &right).ok_or_else(|| mismatch(op, &left, &right))?;
            let result = match op.kind {
                TokenKind::Less => ordering == Ordering::Less,
                TokenKind::LessEqual => ordering != Ordering::Greater,
                TokenKind::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        TokenKind::AndAnd | TokenKind::OrOr => match (&left, &right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op.is(TokenKind::AndAnd) {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(mismatch(op, &left, &right)),
        },
        _ => Err(mismatch(op, &left, &right)),
    }
}

fn arithmetic(op: &Token, left: Value, right: Value) -> Result<Value, RuntimeFault> {
    match numeric_supertype(left.value_type(), right.value_type()) {
        Some(ValueType::Int) => {
            let (Value::Int(a), Value::Int(b)) = (&left, &right) else {
                return Err(mismatch(op, &left, &right));
            };
            integer_arithmetic(op, *a, *b).map(Value::Int)
        }
        Some(_) => {
            let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                return Err(mismatch(op, &left, &right));
            };
            let value = match op.kind {
                TokenKind::Plus => a + b,
                TokenKind::Minus => a - b,
                TokenKind::Star => a * b,
                TokenKind::Slash => a / b,
                _ => a % b,
            };
            Ok(Value::Double(value))
        }
        None => Err(mismatch(op, &left, &right)),
    }
}

fn integer_arithmetic(op: &Token, a: i64, b: i64) -> Result<i64, RuntimeFault> {
    let line = op.line;
    if matches!(op.kind, TokenKind::Slash | TokenKind::Percent) && b == 0 {
        return Err(RuntimeFault::DivisionByZero { line });
    }
    let result = match op.kind {
        TokenKind::Plus => a.checked_add(b),
        TokenKind::Minus => a.checked_sub(b),
        TokenKind::Star => a.checked_mul(b),
        TokenKind::Slash => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result.ok_or(RuntimeFault::ArithmeticOverflow { line })
}

fn compare_numbers(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

/// Value equality for primitives, widened equality for numbers and
/// identity for instances and host handles. Mixed kinds are unequal.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Void, Value::Void) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => a == b,
        (Value::Host(a), Value::Host(b)) => a == b,
        (Value::HostType(a), Value::HostType(b)) => a == b,
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

pub(crate) fn apply_unary(op: &Token, operand: Value) -> Result<Value, RuntimeFault> {
    match (op.kind, &operand) {
        (TokenKind::Bang, Value::Bool(value)) => Ok(Value::Bool(!value)),
        (TokenKind::Minus, Value::Int(value)) => value
            .checked_neg()
            .map(Value::Int)
            .ok_or(RuntimeFault::ArithmeticOverflow { line: op.line }),
        (TokenKind::Minus, Value::Double(value)) => Ok(Value::Double(-value)),
        _ => Err(RuntimeFault::UnaryTypeMismatch {
            operator: op.content.clone(),
            operand: operand.type_name(),
            line: op.line,
        }),
    }
}
