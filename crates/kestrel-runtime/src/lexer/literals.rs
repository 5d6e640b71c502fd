//! Number and string literal scanning.

use super::Lexer;
use crate::error::SyntaxError;
use crate::token::{Token, TokenKind};

impl Lexer {
    /// Scan a string literal; the opening quote has been consumed.
    pub(super) fn string(&mut self, quote: char) -> Result<Token, SyntaxError> {
        let mut value = String::new();

        loop {
            if self.is_at_end() || self.peek() == '\n' {
                return Err(self.error("Unterminated string literal"));
            }
            let c = self.advance();
            if c == quote {
                break;
            }
            if c == '\\' {
                if self.is_at_end() {
                    return Err(self.error("Unterminated string literal"));
                }
                let escaped = match self.advance() {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                };
                value.push(escaped);
            } else {
                value.push(c);
            }
        }

        Ok(self.make_token(TokenKind::String, value))
    }

    /// Scan a decimal number literal; the first character has been consumed.
    pub(super) fn number(&mut self) -> Result<Token, SyntaxError> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        if matches!(self.peek(), 'e' | 'E') {
            self.advance();
            if matches!(self.peek(), '+' | '-') {
                self.advance();
            }
            if !self.peek().is_ascii_digit() {
                return Err(self.error("Malformed exponent"));
            }
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text: String = self.chars[self.start_pos..self.current].iter().collect();
        if text == "." {
            return Err(self.error("Unexpected character '.'"));
        }
        Ok(self.make_token(TokenKind::Number, text))
    }
}

#[cfg(test)]
mod tests {
    use crate::lexer::Lexer;
    use crate::token::TokenKind;

    #[test]
    fn test_string_escapes() {
        let tokens = Lexer::new(r#""a\"b\n""#).tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "a\"b\n");
    }

    #[test]
    fn test_number_forms() {
        let tokens = Lexer::new("42 3.5 .5 1e3").tokenize().unwrap();
        let lexemes: Vec<_> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["42", "3.5", ".5", "1e3", ""]);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(Lexer::new("'abc").tokenize().is_err());
    }
}
