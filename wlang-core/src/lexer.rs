//! Lexer for W source text.

use crate::error::LexError;

/// Kind of a token produced by the lexer.
///
/// The lexer attaches no meaning beyond recognizing keywords, literals,
/// punctuation and the closed operator set. Everything else is decided by
/// the structural and expression parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Identifiers and literals
    Identifier,
    Integer,
    Double,
    StringLiteral,

    // Keywords
    Let,
    Function,
    If,
    For,
    While,
    Else,
    Const,
    Return,
    Break,
    Continue,
    Null,
    True,
    False,
    Import,
    As,
    Implements,
    Try,
    Catch,
    Class,
    Throw,

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    Semicolon, // ;
    Comma,     // ,
    Colon,     // :
    Dot,       // .

    // Operators
    Assign,       // =
    Equal,        // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    AndAnd,       // &&
    OrOr,         // ||
    Bang,         // !
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    PlusPlus,     // ++
    MinusMinus,   // --
}

impl TokenKind {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
        )
    }

    pub fn is_boolean_combinator(self) -> bool {
        matches!(self, TokenKind::AndAnd | TokenKind::OrOr)
    }
}

/// A single token: its text, kind and 1-based source line.
///
/// String literal tokens keep their raw contents without the quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub content: String,
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn new(content: impl Into<String>, kind: TokenKind, line: usize) -> Self {
        Token {
            content: content.into(),
            kind,
            line,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Text of the token as it appears in source.
    pub fn to_source(&self) -> String {
        match self.kind {
            TokenKind::StringLiteral => format!("\"{}\"", self.content),
            _ => self.content.clone(),
        }
    }
}

/// Re-serialize a token run, one space between tokens.
pub fn render_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(Token::to_source)
        .collect::<Vec<_>>()
        .join(" ")
}

const OPERATORS: &[(&str, TokenKind)] = &[
    ("=", TokenKind::Assign),
    ("==", TokenKind::Equal),
    ("!=", TokenKind::NotEqual),
    ("<", TokenKind::Less),
    ("<=", TokenKind::LessEqual),
    (">", TokenKind::Greater),
    (">=", TokenKind::GreaterEqual),
    ("&&", TokenKind::AndAnd),
    ("||", TokenKind::OrOr),
    ("!", TokenKind::Bang),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("++", TokenKind::PlusPlus),
    ("--", TokenKind::MinusMinus),
];

const LINE_COMMENT: &str = "//";
const BLOCK_COMMENT: &str = "/*";

fn keyword(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "let" => TokenKind::Let,
        "function" => TokenKind::Function,
        "if" => TokenKind::If,
        "for" => TokenKind::For,
        "while" => TokenKind::While,
        "else" => TokenKind::Else,
        "const" => TokenKind::Const,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "null" => TokenKind::Null,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "import" => TokenKind::Import,
        "as" => TokenKind::As,
        "implements" => TokenKind::Implements,
        "try" => TokenKind::Try,
        "catch" => TokenKind::Catch,
        "class" => TokenKind::Class,
        "throw" => TokenKind::Throw,
        _ => return None,
    };
    Some(kind)
}

fn operator(text: &str) -> Option<TokenKind> {
    OPERATORS
        .iter()
        .find(|(spelling, _)| *spelling == text)
        .map(|(_, kind)| *kind)
}

/// True while `text` can still grow into an operator or a comment marker.
fn is_operator_prefix(text: &str) -> bool {
    OPERATORS
        .iter()
        .map(|(spelling, _)| *spelling)
        .chain([LINE_COMMENT, BLOCK_COMMENT])
        .any(|candidate| candidate.starts_with(text))
}

fn is_operator_char(ch: char) -> bool {
    matches!(ch, '=' | '!' | '<' | '>' | '&' | '|' | '+' | '-' | '*' | '/' | '%')
}

fn punctuation(ch: char) -> Option<TokenKind> {
    let kind = match ch {
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '{' => TokenKind::LBrace,
        '}' => TokenKind::RBrace,
        ';' => TokenKind::Semicolon,
        ',' => TokenKind::Comma,
        ':' => TokenKind::Colon,
        '.' => TokenKind::Dot,
        _ => return None,
    };
    Some(kind)
}

/// Lex a source string into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        index: 0,
        line: 1,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn run(&mut self) -> Result<(), LexError> {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.consume_char();
                continue;
            }

            if let Some(kind) = punctuation(ch) {
                self.consume_char();
                self.push(ch.to_string(), kind);
            } else if ch.is_ascii_digit() {
                self.lex_number();
            } else if ch.is_alphabetic() || ch == '_' {
                self.lex_word();
            } else if ch == '"' {
                self.lex_string()?;
            } else if is_operator_char(ch) {
                self.lex_operator()?;
            } else {
                return Err(LexError::UnexpectedCharacter {
                    character: ch,
                    line: self.line,
                });
            }
        }
        Ok(())
    }

    fn push(&mut self, content: String, kind: TokenKind) {
        self.tokens.push(Token::new(content, kind, self.line));
    }

    fn lex_number(&mut self) {
        let mut text = String::new();
        let mut kind = TokenKind::Integer;
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.consume_char();
            } else if ch == '.' && kind == TokenKind::Integer {
                // A single decimal point merges into the number.
                kind = TokenKind::Double;
                text.push(ch);
                self.consume_char();
            } else {
                break;
            }
        }
        self.push(text, kind);
    }

    fn lex_word(&mut self) {
        let mut text = String::new();
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' {
                text.push(ch);
                self.consume_char();
            } else {
                break;
            }
        }
        let kind = keyword(&text).unwrap_or(TokenKind::Identifier);
        self.push(text, kind);
    }

    fn lex_string(&mut self) -> Result<(), LexError> {
        let start_line = self.line;
        self.consume_char(); // opening quote
        let mut text = String::new();
        while let Some(ch) = self.peek_char() {
            self.consume_char();
            if ch == '"' {
                self.tokens
                    .push(Token::new(text, TokenKind::StringLiteral, start_line));
                return Ok(());
            }
            text.push(ch);
        }
        Err(LexError::UnterminatedString { line: start_line })
    }

    fn lex_operator(&mut self) -> Result<(), LexError> {
        let line = self.line;
        let mut text = String::new();
        while let Some(ch) = self.peek_char() {
            if !is_operator_char(ch) {
                break;
            }
            let mut grown = text.clone();
            grown.push(ch);
            if !is_operator_prefix(&grown) {
                break;
            }
            text = grown;
            self.consume_char();
            if text == LINE_COMMENT || text == BLOCK_COMMENT {
                break;
            }
        }

        if text == LINE_COMMENT {
            self.skip_line_comment();
            return Ok(());
        }
        if text == BLOCK_COMMENT {
            return self.skip_block_comment(line);
        }

        match operator(&text) {
            Some(kind) => {
                self.tokens.push(Token::new(text, kind, line));
                Ok(())
            }
            None => Err(LexError::UnknownOperator {
                operator: text,
                line,
            }),
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.consume_char();
        }
    }

    fn skip_block_comment(&mut self, start_line: usize) -> Result<(), LexError> {
        let mut previous = '\0';
        while let Some(ch) = self.peek_char() {
            self.consume_char();
            if previous == '*' && ch == '/' {
                return Ok(());
            }
            previous = ch;
        }
        Err(LexError::UnterminatedComment { line: start_line })
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn consume_char(&mut self) {
        if let Some(ch) = self.peek_char() {
            if ch == '\n' {
                self.line += 1;
            }
            self.index += 1;
        }
    }
}
