//! Lexical analysis (tokenization).
//!
//! The lexer converts script source into a stream of tokens. Offsets are
//! character positions so that breakpoint columns line up with what a
//! client sees in the source text.

use crate::error::SyntaxError;
use crate::span::Span;
use crate::token::{Token, TokenKind};

mod literals;

/// Lexer state for tokenizing source code.
pub struct Lexer {
    /// Characters of source code.
    pub(super) chars: Vec<char>,
    /// Current position in chars.
    pub(super) current: usize,
    /// Start position of current token.
    pub(super) start_pos: usize,
    /// Whether a line terminator was skipped before the current token.
    newline_before: bool,
}

impl Lexer {
    /// Create a new lexer for the given source code.
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            start_pos: 0,
            newline_before: false,
        }
    }

    /// Tokenize the whole input, ending with an `Eof` token.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    /// Scan the next token.
    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.newline_before = false;
        self.skip_whitespace_and_comments()?;
        self.start_pos = self.current;

        if self.is_at_end() {
            return Ok(self.make_token(TokenKind::Eof, ""));
        }

        let c = self.advance();
        let token = match c {
            '(' => self.make_token(TokenKind::LeftParen, "("),
            ')' => self.make_token(TokenKind::RightParen, ")"),
            '{' => self.make_token(TokenKind::LeftBrace, "{"),
            '}' => self.make_token(TokenKind::RightBrace, "}"),
            ';' => self.make_token(TokenKind::Semicolon, ";"),
            ',' => self.make_token(TokenKind::Comma, ","),
            ':' => self.make_token(TokenKind::Colon, ":"),
            '.' if !self.peek().is_ascii_digit() => self.make_token(TokenKind::Dot, "."),
            '*' => self.make_token(TokenKind::Star, "*"),
            '/' => self.make_token(TokenKind::Slash, "/"),
            '%' => self.make_token(TokenKind::Percent, "%"),
            '+' => {
                if self.match_char('+') {
                    self.make_token(TokenKind::PlusPlus, "++")
                } else if self.match_char('=') {
                    self.make_token(TokenKind::PlusEqual, "+=")
                } else {
                    self.make_token(TokenKind::Plus, "+")
                }
            }
            '-' => {
                if self.match_char('-') {
                    self.make_token(TokenKind::MinusMinus, "--")
                } else if self.match_char('=') {
                    self.make_token(TokenKind::MinusEqual, "-=")
                } else {
                    self.make_token(TokenKind::Minus, "-")
                }
            }
            '=' => {
                if self.match_char('=') {
                    if self.match_char('=') {
                        self.make_token(TokenKind::EqualEqualEqual, "===")
                    } else {
                        self.make_token(TokenKind::EqualEqual, "==")
                    }
                } else {
                    self.make_token(TokenKind::Equal, "=")
                }
            }
            '!' => {
                if self.match_char('=') {
                    if self.match_char('=') {
                        self.make_token(TokenKind::BangEqualEqual, "!==")
                    } else {
                        self.make_token(TokenKind::BangEqual, "!=")
                    }
                } else {
                    self.make_token(TokenKind::Bang, "!")
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::LessEqual, "<=")
                } else {
                    self.make_token(TokenKind::Less, "<")
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::GreaterEqual, ">=")
                } else {
                    self.make_token(TokenKind::Greater, ">")
                }
            }
            '&' if self.match_char('&') => self.make_token(TokenKind::AmpAmp, "&&"),
            '|' if self.match_char('|') => self.make_token(TokenKind::PipePipe, "||"),
            '"' | '\'' => self.string(c)?,
            c if c.is_ascii_digit() || c == '.' => self.number()?,
            c if is_identifier_start(c) => self.identifier(),
            c => return Err(self.error(format!("Unexpected character '{}'", c))),
        };
        Ok(token)
    }

    /// Skip whitespace, line terminators and comments.
    fn skip_whitespace_and_comments(&mut self) -> Result<(), SyntaxError> {
        while !self.is_at_end() {
            match self.peek() {
                '\n' | '\r' | '\u{2028}' | '\u{2029}' => {
                    self.newline_before = true;
                    self.advance();
                }
                c if c.is_whitespace() => {
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                '/' if self.peek_next() == '*' => {
                    let start = self.current;
                    self.advance();
                    self.advance();
                    loop {
                        if self.is_at_end() {
                            self.start_pos = start;
                            return Err(self.error("Unterminated comment"));
                        }
                        if self.peek() == '*' && self.peek_next() == '/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        if self.advance() == '\n' {
                            self.newline_before = true;
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn identifier(&mut self) -> Token {
        while !self.is_at_end() && is_identifier_part(self.peek()) {
            self.advance();
        }
        let text: String = self.chars[self.start_pos..self.current].iter().collect();
        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Identifier);
        self.make_token(kind, text)
    }

    pub(super) fn make_token(&self, kind: TokenKind, lexeme: impl Into<String>) -> Token {
        Token::new(
            kind,
            lexeme,
            Span::new(self.start_pos as u32, self.current as u32),
            self.newline_before,
        )
    }

    pub(super) fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.start_pos as u32)
    }

    pub(super) fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    pub(super) fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        c
    }

    pub(super) fn peek(&self) -> char {
        self.chars.get(self.current).copied().unwrap_or('\0')
    }

    pub(super) fn peek_next(&self) -> char {
        self.chars.get(self.current + 1).copied().unwrap_or('\0')
    }

    pub(super) fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == expected && !self.is_at_end() {
            self.current += 1;
            true
        } else {
            false
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
