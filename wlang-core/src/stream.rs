//! Cursor over a token run with pushback and delimiter matching.
//!
//! `capture_braces`, `capture_parens` and `capture_statement` are the only
//! places that decide where a `{...}`, `(...)` or `...;` run ends.

use crate::error::StructuralError;
use crate::lexer::{Token, TokenKind};

#[derive(Debug)]
pub(crate) struct TokenStream {
    tokens: Vec<Token>,
    position: usize,
    /// Line reported when the run is exhausted.
    fallback_line: usize,
}

impl TokenStream {
    pub(crate) fn new(tokens: Vec<Token>, fallback_line: usize) -> Self {
        TokenStream {
            tokens,
            position: 0,
            fallback_line,
        }
    }

    pub(crate) fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Rewind by one token.
    pub(crate) fn push_back(&mut self) {
        self.position = self.position.saturating_sub(1);
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    pub(crate) fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|token| token.is(kind))
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    /// Tokens consumed between `start` and the current position.
    pub(crate) fn consumed_since(&self, start: usize) -> Vec<Token> {
        self.tokens[start..self.position].to_vec()
    }

    /// Line of the most recently consumed token.
    pub(crate) fn line(&self) -> usize {
        self.position
            .checked_sub(1)
            .and_then(|index| self.tokens.get(index))
            .or_else(|| self.tokens.first())
            .map_or(self.fallback_line, |token| token.line)
    }

    pub(crate) fn expect(
        &mut self,
        kind: TokenKind,
        expected: &'static str,
    ) -> Result<Token, StructuralError> {
        match self.next() {
            Some(token) if token.is(kind) => Ok(token),
            Some(token) => Err(StructuralError::MissingToken {
                expected,
                line: token.line,
            }),
            None => Err(StructuralError::MissingToken {
                expected,
                line: self.line(),
            }),
        }
    }

    /// Consume `{ ... }` and return the tokens between the braces.
    pub(crate) fn capture_braces(&mut self) -> Result<Vec<Token>, StructuralError> {
        self.capture_enclosed(TokenKind::LBrace, TokenKind::RBrace, "'{'", "'}'")
    }

    /// Consume `( ... )` and return the tokens between the parentheses.
    pub(crate) fn capture_parens(&mut self) -> Result<Vec<Token>, StructuralError> {
        self.capture_enclosed(TokenKind::LParen, TokenKind::RParen, "'('", "')'")
    }

    fn capture_enclosed(
        &mut self,
        open: TokenKind,
        close: TokenKind,
        open_name: &'static str,
        close_name: &'static str,
    ) -> Result<Vec<Token>, StructuralError> {
        self.expect(open, open_name)?;
        let mut depth = 1usize;
        let mut inner = Vec::new();
        while let Some(token) = self.next() {
            if token.is(open) {
                depth += 1;
            } else if token.is(close) {
                depth -= 1;
                if depth == 0 {
                    return Ok(inner);
                }
            }
            inner.push(token);
        }
        Err(StructuralError::MissingToken {
            expected: close_name,
            line: self.line(),
        })
    }

    /// Consume a statement up to its `;` (outside any nesting) and return it
    /// without the terminator.
    pub(crate) fn capture_statement(&mut self) -> Result<Vec<Token>, StructuralError> {
        let mut depth = 0usize;
        let mut run = Vec::new();
        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::LParen | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBrace => depth = depth.saturating_sub(1),
                TokenKind::Semicolon if depth == 0 => return Ok(run),
                _ => {}
            }
            run.push(token);
        }
        Err(StructuralError::DanglingStatement { line: self.line() })
    }
}

/// Split a run on `separator` outside any nesting. An empty run yields no parts.
pub(crate) fn split_top_level(tokens: &[Token], separator: TokenKind) -> Vec<Vec<Token>> {
    let mut parts = Vec::new();
    if tokens.is_empty() {
        return parts;
    }
    let mut depth = 0usize;
    let mut current = Vec::new();
    for token in tokens {
        match token.kind {
            TokenKind::LParen | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBrace => depth = depth.saturating_sub(1),
            kind if kind == separator && depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(token.clone());
    }
    parts.push(current);
    parts
}
