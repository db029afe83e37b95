//! Lexical analysis for assembly source.
//!
//! Produces a flat token stream: identifiers, label definitions
//! (`ident:`, consumed as one token), numbers (optional leading `-`,
//! optional decimal point), and newlines. Comments (`;` or `#` to end of
//! line) and other whitespace are skipped. Input is ASCII.

use super::AsmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Opcode mnemonic or label reference.
    Ident,
    /// Label definition; `text` holds the name without the colon.
    Label,
    /// Numeric literal, int or float.
    Number,
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 1-based source line.
    pub line: usize,
    /// 1-based column of the first character.
    pub column: usize,
}

pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Converts the whole source into tokens, ending with an EOF token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, AsmError> {
        let mut tokens = Vec::new();

        while self.pos < self.source.len() {
            let ch = self.source[self.pos];
            match ch {
                b' ' | b'\t' | b'\r' => self.advance(),
                b'\n' => {
                    tokens.push(self.token(TokenKind::Newline, "\n", self.column));
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                b';' | b'#' => self.skip_comment(),
                _ if ch.is_ascii_digit() || (ch == b'-' && self.next_is_digit()) => {
                    tokens.push(self.scan_number()?);
                }
                _ if ch.is_ascii_alphabetic() || ch == b'_' => {
                    tokens.push(self.scan_ident_or_label());
                }
                _ => {
                    return Err(AsmError::at(
                        self.line,
                        self.column,
                        format!("unexpected character '{}'", ch as char),
                    ));
                }
            }
        }

        tokens.push(self.token(TokenKind::Eof, "", self.column));
        Ok(tokens)
    }

    fn skip_comment(&mut self) {
        while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
            self.advance();
        }
    }

    fn scan_number(&mut self) -> Result<Token, AsmError> {
        let start = self.pos;
        let start_column = self.column;

        if self.source[self.pos] == b'-' {
            self.advance();
        }
        while self.pos < self.source.len()
            && (self.source[self.pos].is_ascii_digit() || self.source[self.pos] == b'.')
        {
            self.advance();
        }

        let text = std::str::from_utf8(&self.source[start..self.pos])
            .expect("ascii digits")
            .to_string();

        // Validate here so malformed literals are caught with a position.
        let valid = if text.contains('.') {
            text.parse::<f64>().is_ok()
        } else {
            text.parse::<i64>().is_ok()
        };
        if !valid {
            return Err(AsmError::at(
                self.line,
                start_column,
                format!("invalid number '{text}'"),
            ));
        }

        Ok(Token {
            kind: TokenKind::Number,
            text,
            line: self.line,
            column: start_column,
        })
    }

    fn scan_ident_or_label(&mut self) -> Token {
        let start = self.pos;
        let start_column = self.column;

        while self.pos < self.source.len() {
            let ch = self.source[self.pos];
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.advance();
            } else {
                break;
            }
        }

        let text = std::str::from_utf8(&self.source[start..self.pos])
            .expect("ascii identifier")
            .to_string();

        // A trailing colon makes this a label definition.
        if self.pos < self.source.len() && self.source[self.pos] == b':' {
            self.advance();
            Token {
                kind: TokenKind::Label,
                text,
                line: self.line,
                column: start_column,
            }
        } else {
            Token {
                kind: TokenKind::Ident,
                text,
                line: self.line,
                column: start_column,
            }
        }
    }

    fn next_is_digit(&self) -> bool {
        self.source
            .get(self.pos + 1)
            .is_some_and(u8::is_ascii_digit)
    }

    fn advance(&mut self) {
        self.pos += 1;
        self.column += 1;
    }

    fn token(&self, kind: TokenKind, text: &str, column: usize) -> Token {
        Token {
            kind,
            text: text.to_string(),
            line: self.line,
            column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_instruction_line() {
        let tokens = Lexer::new("PUSH 42\n").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].text, "PUSH");
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[1].text, "42");
        assert_eq!(tokens[2].kind, TokenKind::Newline);
        assert_eq!(tokens[3].kind, TokenKind::Eof);
    }

    #[test]
    fn label_definition_is_one_token() {
        let tokens = Lexer::new("loop_1:").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Label);
        assert_eq!(tokens[0].text, "loop_1");
    }

    #[test]
    fn negative_and_float_numbers() {
        let tokens = Lexer::new("-12 3.5 -0.25").tokenize().unwrap();
        assert_eq!(tokens[0].text, "-12");
        assert_eq!(tokens[1].text, "3.5");
        assert_eq!(tokens[2].text, "-0.25");
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("ADD ; pops two\n# whole-line comment\nHALT"),
            vec![
                TokenKind::Ident,
                TokenKind::Newline,
                TokenKind::Newline,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn malformed_number_is_rejected_with_position() {
        let err = Lexer::new("PUSH 1.2.3").tokenize().unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 6);
        assert!(err.message.contains("1.2.3"));
    }

    #[test]
    fn unexpected_character_is_rejected() {
        let err = Lexer::new("PUSH @5").tokenize().unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains('@'));
    }

    #[test]
    fn tracks_line_numbers() {
        let tokens = Lexer::new("NOP\nNOP\nNOP").tokenize().unwrap();
        let nops: Vec<usize> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| t.line)
            .collect();
        assert_eq!(nops, vec![1, 2, 3]);
    }
}
